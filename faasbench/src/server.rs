// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.


//! Serves one benchmark function over HTTP.
//!
//! * `POST /invoke` takes the JSON event and answers the JSON reply. A
//!   `traceparent` header makes the invocation span a child of the caller's.
//! * `GET /health` answers while the server is up.
//!
//! Errors are answered as `{"error": "..."}` with a status matching the error.

use crate::error::{FaasError, Result};
use crate::function::CloudFunction;
use crate::tracer::{self, Span, SpanKind};
use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use log::{error, info};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

/// The HTTP status answered for an error.
pub fn status_code(err: &FaasError) -> StatusCode {
    match err {
        FaasError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        FaasError::NotFound(_) => StatusCode::NOT_FOUND,
        FaasError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for FaasError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        if status.is_server_error() {
            error!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Clone)]
struct AppState {
    function: Arc<dyn CloudFunction>,
    permits:  Arc<Semaphore>,
}

/// Builds the routes of `function`, running at most `max_concurrency`
/// invocations at a time.
pub fn router(function: Arc<dyn CloudFunction>, max_concurrency: usize) -> Router {
    let state = AppState {
        function,
        permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
    };
    Router::new()
        .route("/invoke", post(invoke))
        .route("/health", get(health))
        .with_state(state)
}

async fn invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<Value>,
) -> std::result::Result<Json<Value>, FaasError> {
    let _permit = state
        .permits
        .acquire()
        .await
        .map_err(|e| FaasError::Internal(e.to_string()))?;

    let carrier: HashMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();
    let span = Span::start_with_kind(
        format!("{} invoke", state.function.name()),
        SpanKind::Server,
        &tracer::extract(&carrier),
    );

    let result = span.scope(state.function.invoke(event)).await;
    if let Err(e) = &result {
        span.set_attribute("error", e);
    }
    span.end();
    result.map(Json)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "function": state.function.name() }))
}

/// Serves `function` on `listener` until `shutdown` completes.
pub async fn serve_with_listener<F>(
    listener: TcpListener,
    function: Arc<dyn CloudFunction>,
    max_concurrency: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        "Serving {} on http://{}",
        function.name(),
        listener.local_addr()?
    );
    axum::serve(listener, router(function, max_concurrency))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Server shut down gracefully");
    Ok(())
}

/// Serves `function` on all interfaces at `port` until Ctrl-C.
pub async fn serve(function: Arc<dyn CloudFunction>, port: u16, max_concurrency: usize) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    serve_with_listener(listener, function, max_concurrency, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received, shutting down");
    })
    .await
}
