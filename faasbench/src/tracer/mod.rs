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


//! A thin span helper over the OpenTelemetry SDK.
//!
//! Spans form a hierarchy: a span started while another span is active becomes
//! its child, and the active span is carried across function boundaries in the
//! W3C `traceparent` header. Finished spans are batched to a Zipkin collector
//! so that a whole fan-out/fan-in request can be inspected in one trace.
//!
//! ```no_run
//! use faasbench::tracer::{self, in_span, Span};
//!
//! # async fn run() -> faasbench::error::Result<()> {
//! if tracer::is_tracing_enabled() {
//!     tracer::init_tracer("mapper", "http://localhost:9411/api/v2/spans", false)?;
//! }
//!
//! let total = in_span("Fetch and process keys", async {
//!     let _child = Span::start("parse");
//!     42
//! })
//! .await;
//!
//! tracer::shutdown_tracer().await?;
//! # Ok(())
//! # }
//! ```

use crate::configs::*;
use crate::error::{FaasError, Result};
use lazy_static::lazy_static;
use log::info;
use opentelemetry::global;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{FutureExt, TraceContextExt, TraceResult, Tracer};
use opentelemetry::KeyValue;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{BatchSpanProcessor, Config, Sampler, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

pub use opentelemetry::trace::{SpanContext, SpanKind};
pub use opentelemetry::Context;

/// The header (and event field) carrying the caller's span.
pub const TRACEPARENT_HEADER: &str = "traceparent";

const INSTRUMENTATION_NAME: &str = "faasbench";

lazy_static! {
    static ref PROVIDER: RwLock<Option<TracerProvider>> = RwLock::new(None);
}

/// Whether an `ENABLE_TRACING` value turns tracing on.
pub fn tracing_enabled(value: &str) -> bool {
    !value.trim().eq_ignore_ascii_case("false")
}

/// Returns true unless tracing is disabled, which is the default.
pub fn is_tracing_enabled() -> bool {
    let value = setting("ENABLE_TRACING", "tracing", "enabled");
    info!("ENABLE_TRACING: {}", value);
    tracing_enabled(&value)
}

/// Writes the W3C headers of the span in `cx`. Nothing is written without a
/// valid span.
pub fn inject(cx: &Context) -> HashMap<String, String> {
    let mut carrier = HashMap::new();
    TraceContextPropagator::new().inject_context(cx, &mut carrier);
    carrier
}

/// Reads the remote parent from W3C headers.
pub fn extract(carrier: &HashMap<String, String>) -> Context {
    TraceContextPropagator::new().extract(carrier)
}

/// Reads the remote parent from a bare `traceparent` value.
pub fn extract_traceparent(traceparent: &str) -> Context {
    extract(&HashMap::from([(
        TRACEPARENT_HEADER.to_string(),
        traceparent.to_string(),
    )]))
}

/// The `traceparent` value of the span in `cx`.
pub fn traceparent(cx: &Context) -> Option<String> {
    inject(cx).remove(TRACEPARENT_HEADER)
}

/// A named unit of work. The span ends when [`Span::end`] is called or when it
/// is dropped. Without an installed tracer the span records nothing but still
/// carries its parent's identity, so propagation keeps working.
#[derive(Debug)]
pub struct Span {
    cx: Context,
}

impl Span {
    /// Starts an internal span whose parent is the active span.
    pub fn start(name: impl Into<String>) -> Span {
        Span::start_with_kind(name, SpanKind::Internal, &Context::current())
    }

    /// Starts a span of `kind` under `parent`, e.g. a context extracted from
    /// an incoming request.
    pub fn start_with_kind(name: impl Into<String>, kind: SpanKind, parent: &Context) -> Span {
        let name: String = name.into();
        let tracer = global::tracer(INSTRUMENTATION_NAME);
        let span = tracer
            .span_builder(name)
            .with_kind(kind)
            .start_with_context(&tracer, parent);
        Span {
            cx: parent.with_span(span),
        }
    }

    /// The context holding this span, for propagation.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// The identity of this span.
    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }

    /// Whether the span will be exported.
    pub fn is_recording(&self) -> bool {
        self.cx.span().is_recording()
    }

    /// Attaches a string tag.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl ToString) {
        self.cx
            .span()
            .set_attribute(KeyValue::new(key.into(), value.to_string()));
    }

    /// Runs `fut` with this span as the active span, so that spans started
    /// inside become its children.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        fut.with_context(self.cx.clone()).await
    }

    /// Marks the span as finished now.
    pub fn end(self) {}
}

impl Drop for Span {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

/// Runs `fut` inside a new child span of the active span.
pub async fn in_span<F: Future>(name: impl Into<String>, fut: F) -> F::Output {
    let span = Span::start(name);
    let output = span.scope(fut).await;
    span.end();
    output
}

/// The parent-based ratio sampler; a rate of one or more samples everything.
pub fn sampler(rate: f64) -> Sampler {
    if rate >= 1.0 {
        Sampler::AlwaysOn
    } else {
        let rate = if rate.is_nan() { 0.0 } else { rate.max(0.0) };
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(rate)))
    }
}

/// What a tracer reports itself as and how it samples.
#[derive(Debug, Clone)]
pub struct TracerSettings {
    /// The Zipkin service name.
    pub service_name: String,
    /// Sampler of root spans.
    pub sampler:      Sampler,
    /// Resource attributes attached to every span.
    pub resource:     Vec<KeyValue>,
    /// Also print finished spans to stdout.
    pub debug:        bool,
}

impl TracerSettings {
    /// A function reporting under its own name.
    pub fn function(name: &str, trace_rate: f64, debug: bool) -> Self {
        Self {
            service_name: name.to_string(),
            sampler: sampler(trace_rate),
            resource: vec![],
            debug,
        }
    }

    /// A client named after `service_name` and the host (the pod or
    /// container name), with a `-FU` suffix marking it as a function rather
    /// than a queue proxy.
    pub fn basic(service_name: &str, hostname: &str) -> Self {
        Self {
            service_name: format!("{}@{}-FU", service_name, hostname),
            sampler: Sampler::AlwaysOn,
            resource: vec![KeyValue::new("ID", "1")],
            debug: false,
        }
    }

    /// Samples `trace_rate` of the traces. The service name is taken from the
    /// `service.name` attribute, falling back to the process name.
    pub fn custom(trace_rate: f64, attributes: BTreeMap<String, String>) -> Self {
        let service_name = match attributes.get("service.name") {
            Some(name) => name.clone(),
            None => std::env::current_exe()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| INSTRUMENTATION_NAME.to_string()),
        };
        Self {
            service_name,
            sampler: sampler(trace_rate),
            resource: attributes
                .into_iter()
                .map(|(k, v)| KeyValue::new(k, v))
                .collect(),
            debug: false,
        }
    }
}

/// Makes `provider` the process-wide tracer provider.
pub fn install_provider(provider: TracerProvider) -> Result<()> {
    global::set_tracer_provider(provider.clone());
    *PROVIDER
        .write()
        .map_err(|e| FaasError::Internal(e.to_string()))? = Some(provider);
    Ok(())
}

/// Installs a tracer batching spans to the Zipkin collector at `url`.
pub fn install(url: &str, settings: TracerSettings) -> Result<()> {
    info!(
        "Exporting spans of {} to {}",
        settings.service_name, url
    );
    let exporter = opentelemetry_zipkin::new_pipeline()
        .with_service_name(settings.service_name)
        .with_collector_endpoint(url)
        .with_http_client(reqwest::Client::new())
        .init_exporter()?;

    let batch = BatchSpanProcessor::builder(exporter, runtime::Tokio)
        .with_max_export_batch_size(*FAASBENCH_MAX_EXPORT_BATCH)
        .with_scheduled_delay(Duration::from_millis(*FAASBENCH_EXPORT_DELAY))
        .build();
    let mut builder = TracerProvider::builder()
        .with_span_processor(batch)
        .with_config(
            Config::default()
                .with_sampler(settings.sampler)
                .with_resource(Resource::new(settings.resource)),
        );
    if settings.debug {
        builder = builder.with_simple_exporter(opentelemetry_stdout::SpanExporter::default());
    }
    install_provider(builder.build())
}

/// Installs the tracer of a function named `name`, sampling at
/// `TRACE_SAMPLE_RATE`. With `debug`, spans are also printed to stdout.
pub fn init_tracer(name: &str, url: &str, debug: bool) -> Result<()> {
    install(
        url,
        TracerSettings::function(name, *FAASBENCH_TRACE_SAMPLE_RATE, debug),
    )
}

/// Installs a tracer sampling every trace, see [`TracerSettings::basic`].
pub fn init_basic_tracer(url: &str, service_name: &str) -> Result<()> {
    let hostname = std::env::var("HOSTNAME").unwrap_or_default();
    install(url, TracerSettings::basic(service_name, &hostname))
}

/// Installs a tracer sampling `trace_rate` of the traces, see
/// [`TracerSettings::custom`].
pub fn init_custom_tracer(
    url: &str,
    trace_rate: f64,
    attributes: BTreeMap<String, String>,
) -> Result<()> {
    install(url, TracerSettings::custom(trace_rate, attributes))
}

fn installed_provider() -> Option<TracerProvider> {
    PROVIDER.read().ok().and_then(|p| p.clone())
}

fn first_error(results: Vec<TraceResult<()>>) -> Result<()> {
    results.into_iter().collect::<TraceResult<Vec<_>>>()?;
    Ok(())
}

/// Waits until the ended spans are exported.
pub async fn force_flush() -> Result<()> {
    match installed_provider() {
        Some(provider) => first_error(tokio::task::spawn_blocking(move || provider.force_flush()).await?),
        None => Ok(()),
    }
}

/// Flushes and uninstalls the process-wide tracer.
pub async fn shutdown_tracer() -> Result<()> {
    let provider = PROVIDER
        .write()
        .map_err(|e| FaasError::Internal(e.to_string()))?
        .take();
    if let Some(provider) = provider {
        let results = tokio::task::spawn_blocking(move || {
            let results = provider.force_flush();
            drop(provider);
            global::shutdown_tracer_provider();
            results
        })
        .await?;
        first_error(results)?;
    }
    Ok(())
}
