use std::collections::HashMap;
use std::sync::mpsc;
use std::time::Duration;

use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, SdkTracerProvider, Tracer};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::{TurnNaming, TurnSpan, TurnTracer, turn_attributes};
use crate::error::{ChatError, CoreResult};

const HEADER_API_KEY: &str = "x-api-key";
const HEADER_PROJECT: &str = "Langsmith-Project";

/// Where and how turn spans are shipped.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub service_name: String,
    /// Full OTLP/HTTP traces URL.
    pub endpoint: String,
    pub api_key: SecretString,
    pub project_name: String,
    pub batch_timeout: Duration,
}

impl ExportSettings {
    fn headers(&self) -> HashMap<String, String> {
        HashMap::from([
            (
                HEADER_API_KEY.to_string(),
                self.api_key.expose_secret().to_string(),
            ),
            (HEADER_PROJECT.to_string(), self.project_name.clone()),
        ])
    }
}

/// `TurnTracer` backed by an OpenTelemetry SDK provider.
///
/// The provider is owned here and handed around explicitly; it is never installed
/// as the global tracer provider.
#[derive(Debug)]
pub struct OtelTurnTracer {
    provider: SdkTracerProvider,
    tracer: Tracer,
    naming: TurnNaming,
}

impl OtelTurnTracer {
    /// Build an OTLP/HTTP (protobuf) exporter behind a batch processor.
    pub fn install(settings: &ExportSettings, naming: TurnNaming) -> CoreResult<Self> {
        debug!(endpoint = %settings.endpoint, project = %settings.project_name, "using OTLP http exporter");

        let exporter = SpanExporter::builder()
            .with_http()
            .with_endpoint(settings.endpoint.clone())
            .with_protocol(Protocol::HttpBinary)
            .with_headers(settings.headers())
            .build()
            .map_err(|e| ChatError::Telemetry(format!("creating exporter: {e}")))?;

        let processor = BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_scheduled_delay(settings.batch_timeout)
                    .build(),
            )
            .build();

        let provider = SdkTracerProvider::builder()
            .with_resource(resource(&settings.service_name))
            .with_span_processor(processor)
            .build();

        Ok(Self::from_provider(provider, naming))
    }

    /// Wrap an already configured provider (tests use an in-memory exporter).
    pub fn from_provider(provider: SdkTracerProvider, naming: TurnNaming) -> Self {
        let tracer = provider.tracer(naming.instrumentation);
        Self {
            provider,
            tracer,
            naming,
        }
    }

    /// Tracer for nested instrumentation, e.g. the model client's own spans.
    pub fn tracer(&self) -> Tracer {
        self.tracer.clone()
    }
}

fn resource(service_name: &str) -> Resource {
    Resource::builder()
        .with_service_name(service_name.to_string())
        .build()
}

impl TurnTracer for OtelTurnTracer {
    fn begin_turn(&self, session_id: &str, prompt: &str, extra: Vec<KeyValue>) -> TurnSpan {
        let attrs = turn_attributes(self.naming.trace_name, session_id, prompt, extra);
        // Turns are roots; grouping is by session_id, not by parentage.
        let root = Context::new();
        let span = self
            .tracer
            .span_builder(self.naming.span_name)
            .with_kind(SpanKind::Internal)
            .with_attributes(attrs)
            .start_with_context(&self.tracer, &root);
        TurnSpan::new(root.with_span(span))
    }

    fn flush_all(&self, timeout: Duration) -> bool {
        let provider = self.provider.clone();
        let (tx, rx) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("threadtrace-flush".into())
            .spawn(move || {
                let _ = tx.send(provider.force_flush());
            });
        if let Err(e) = spawned {
            warn!(error = %e, "could not start trace flush");
            return false;
        }

        match rx.recv_timeout(timeout) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "error flushing traces");
                false
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "trace flush timed out");
                false
            }
        }
    }

    fn shutdown(&self, timeout: Duration) -> CoreResult<()> {
        self.provider
            .shutdown_with_timeout(timeout)
            .map_err(|e| ChatError::Telemetry(format!("shutting down tracer: {e}")))
    }
}
