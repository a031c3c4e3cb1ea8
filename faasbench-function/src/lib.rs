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


#![warn(missing_docs, clippy::needless_borrow)]

//! `faasbench-function` runs one benchmark function, selected by
//! `FUNCTION_NAME`, either as an HTTP server or as an AWS Lambda handler.

use faasbench::prelude::*;
use faasbench::tracer::{self, SpanKind};
use std::collections::HashMap;
use lazy_static::lazy_static;
use log::{info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

lazy_static! {
    static ref FUNCTION: OnceCell<Arc<dyn CloudFunction>> = OnceCell::new();
}

/// The event field carrying the parent span of a Lambda invocation.
pub const TRACEPARENT_FIELD: &str = "traceparent";

/// How the function is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// An HTTP server on `PORT`.
    Http,
    /// An AWS Lambda handler.
    Lambda,
}

impl std::str::FromStr for Mode {
    type Err = FaasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Mode::Http),
            "lambda" => Ok(Mode::Lambda),
            _ => Err(FaasError::InvalidInput(format!("Unknown mode: {}", s))),
        }
    }
}

/// The configured function kind.
pub fn function_kind() -> Result<FunctionKind> {
    FAASBENCH_FUNCTION_NAME.parse()
}

/// Builds the configured function once and only once.
pub async fn function() -> Result<Arc<dyn CloudFunction>> {
    FUNCTION
        .get_or_try_init(|| async {
            let kind = function_kind()?;
            info!("Initializing {} function", kind);
            new_function(kind, FunctionEnv::from_env().await?)
        })
        .await
        .map(Arc::clone)
}

/// Installs the tracer when tracing is enabled, naming the service after the
/// function.
pub fn init_tracing(kind: FunctionKind) -> Result<()> {
    if tracer::is_tracing_enabled() {
        info!("{} has tracing enabled", kind);
        tracer::init_tracer(
            &kind.to_string(),
            &FAASBENCH_ZIPKIN_URL,
            log::log_enabled!(log::Level::Debug),
        )?;
    } else {
        info!("{} has tracing DISABLED", kind);
    }
    Ok(())
}

/// Runs one Lambda event through `function` inside a server span. A
/// `traceparent` field of the event is taken as the parent span.
pub async fn handle(function: &dyn CloudFunction, event: Value) -> Result<Value> {
    let carrier: HashMap<String, String> = event
        .get(TRACEPARENT_FIELD)
        .and_then(Value::as_str)
        .map(|v| HashMap::from([(TRACEPARENT_FIELD.to_string(), v.to_string())]))
        .unwrap_or_default();
    let span = Span::start_with_kind(
        format!("{} invoke", function.name()),
        SpanKind::Server,
        &tracer::extract(&carrier),
    );

    let reply = span.scope(function.invoke(event)).await;
    span.end();
    // A frozen sandbox holds buffered spans until the next event.
    keep_reply(reply, tracer::force_flush().await)
}

/// Spans are best effort: a failed export is logged and never replaces the
/// reply of the function.
pub fn keep_reply(reply: Result<Value>, flushed: Result<()>) -> Result<Value> {
    if let Err(e) = flushed {
        warn!("Failed to export spans: {}", e);
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use faasbench::function::{Chameleon, HelloWorld};
    use serde_json::json;

    #[test]
    fn modes() -> Result<()> {
        assert_eq!(Mode::Http, "HTTP".parse()?);
        assert_eq!(Mode::Lambda, "lambda".parse()?);
        assert!("grpc".parse::<Mode>().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn lambda_events_reach_the_function() -> Result<()> {
        let reply = handle(&HelloWorld::default(), json!({"name": "lambda"})).await?;
        assert_eq!(json!({"message": "Hello, lambda!"}), reply);

        let reply = handle(
            &Chameleon::default(),
            json!({
                "name": "replay",
                "traceparent": "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            }),
        )
        .await?;
        assert_eq!("Hello, replay_response!", reply["message"]);
        Ok(())
    }

    #[test]
    fn failed_span_export_keeps_the_reply() -> Result<()> {
        let reply = keep_reply(
            Ok(json!({"message": "Hello, world!"})),
            Err(FaasError::Tracing("collector unreachable".to_string())),
        )?;
        assert_eq!("Hello, world!", reply["message"]);

        let err = keep_reply(
            Err(FaasError::Execution("boom".to_string())),
            Err(FaasError::Tracing("collector unreachable".to_string())),
        )
        .unwrap_err();
        assert!(matches!(err, FaasError::Execution(_)));
        Ok(())
    }
}
