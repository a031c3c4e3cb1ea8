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


//! Invokers call another function with a JSON event and wait for its JSON
//! reply. The driver and the producer use them to reach their downstream
//! functions, and the load generator uses them to reach the benchmarked ones.

use crate::aws::lambda;
use crate::configs::*;
use crate::error::{FaasError, Result};
use crate::function::CloudFunction;
use crate::tracer::{self, Context, Span, SpanKind};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// The invoker trait defines how a function reaches another function.
#[async_trait]
pub trait Invoker: Debug + Send + Sync {
    /// The type of the invoker.
    fn name(&self) -> &str;
    /// Sends `event` to `target` and returns its reply.
    async fn invoke(&self, target: &str, event: Value) -> Result<Value>;
}

/// Creates the invoker named `kind`: `http`, `lambda` or `local`.
pub fn new_invoker(kind: &str) -> Result<Arc<dyn Invoker>> {
    match kind.to_ascii_lowercase().as_str() {
        "http" => Ok(Arc::new(HttpInvoker::try_new(Duration::from_secs(
            *FAASBENCH_INVOKE_TIMEOUT,
        ))?)),
        "lambda" => Ok(Arc::new(LambdaInvoker::default())),
        "local" => Ok(Arc::new(LocalInvoker::new())),
        _ => Err(FaasError::InvalidInput(format!("Unknown invoker: {}", kind))),
    }
}

/// Returns the URL of the invoke route of `target`, which is either a
/// `host:port` address or a base URL.
pub fn invoke_url(target: &str) -> String {
    let base = target.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{}/invoke", base)
    } else {
        format!("http://{}/invoke", base)
    }
}

/// Posts events to the `/invoke` route of a function server.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    client: reqwest::Client,
}

impl HttpInvoker {
    /// Creates an invoker whose requests time out after `timeout`.
    pub fn try_new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    fn name(&self) -> &str {
        "HttpInvoker"
    }

    async fn invoke(&self, target: &str, event: Value) -> Result<Value> {
        let span = Span::start_with_kind(
            format!("Invoke {}", target),
            SpanKind::Client,
            &Context::current(),
        );
        let headers = tracer::inject(span.context());
        debug!("POST {} {:?}", invoke_url(target), headers);

        let mut request = self.client.post(invoke_url(target));
        for (key, value) in headers {
            request = request.header(key, value);
        }
        let resp = request.json(&event).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            span.set_attribute("http.status_code", status.as_u16());
            return Err(FaasError::Invocation(format!(
                "{} answered {}: {}",
                target, status, body
            )));
        }
        Ok(resp.json::<Value>().await?)
    }
}

/// Invokes AWS Lambda functions synchronously.
#[derive(Debug, Clone, Default)]
pub struct LambdaInvoker {}

#[async_trait]
impl Invoker for LambdaInvoker {
    fn name(&self) -> &str {
        "LambdaInvoker"
    }

    async fn invoke(&self, target: &str, event: Value) -> Result<Value> {
        lambda::invoke_sync(target, &event).await
    }
}

/// Calls functions registered in the same process.
#[derive(Debug, Default)]
pub struct LocalInvoker {
    functions: RwLock<HashMap<String, Arc<dyn CloudFunction>>>,
}

impl LocalInvoker {
    /// Creates an invoker without functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `function` reachable as `target`.
    pub fn register(&self, target: impl Into<String>, function: Arc<dyn CloudFunction>) -> Result<()> {
        self.functions
            .write()
            .map_err(|e| FaasError::Internal(e.to_string()))?
            .insert(target.into(), function);
        Ok(())
    }
}

#[async_trait]
impl Invoker for LocalInvoker {
    fn name(&self) -> &str {
        "LocalInvoker"
    }

    async fn invoke(&self, target: &str, event: Value) -> Result<Value> {
        let function = self
            .functions
            .read()
            .map_err(|e| FaasError::Internal(e.to_string()))?
            .get(target)
            .cloned()
            .ok_or_else(|| FaasError::Invocation(format!("No function registered as {}", target)))?;

        let span = Span::start(format!("{} invoke", function.name()));
        span.scope(function.invoke(event)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::HelloWorld;
    use serde_json::json;

    #[test]
    fn urls_get_invoke_route() {
        assert_eq!("http://mapper:80/invoke", invoke_url("mapper:80"));
        assert_eq!("https://f.example.com/invoke", invoke_url("https://f.example.com/"));
    }

    #[test]
    fn invoker_kinds() -> Result<()> {
        assert_eq!("HttpInvoker", new_invoker("http")?.name());
        assert_eq!("LambdaInvoker", new_invoker("Lambda")?.name());
        assert_eq!("LocalInvoker", new_invoker("local")?.name());
        assert!(new_invoker("grpc").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn local_invoker_dispatches_by_target() -> Result<()> {
        let invoker = LocalInvoker::new();
        invoker.register("hello:80", Arc::new(HelloWorld::default()))?;

        let reply = invoker.invoke("hello:80", json!({"name": "local"})).await?;
        assert_eq!(json!({"message": "Hello, local!"}), reply);

        assert!(matches!(
            invoker.invoke("missing:80", json!({})).await,
            Err(FaasError::Invocation(_))
        ));
        Ok(())
    }
}
