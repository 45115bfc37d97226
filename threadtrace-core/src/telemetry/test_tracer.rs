#![cfg(test)]

use std::sync::Mutex;
use std::time::Duration;

use opentelemetry::trace::{TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};

use super::{TurnSpan, TurnTracer, completion_attributes, turn_attributes};
use crate::error::CoreResult;
use crate::model::Usage;

/// One call observed by `RecordingTracer`, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TracerCall {
    Begin {
        session_id: String,
        prompt: String,
        extra: Vec<KeyValue>,
    },
    Complete {
        response_text: String,
        usage: Usage,
        extra: Vec<KeyValue>,
    },
    End,
    Flush(Duration),
    Shutdown(Duration),
}

/// Test double that records every tracer call and still produces real spans
/// (in-memory export) so attribute assertions work end to end.
pub struct RecordingTracer {
    pub calls: Mutex<Vec<TracerCall>>,
    pub exporter: InMemorySpanExporter,
    pub(crate) provider: SdkTracerProvider,
    /// Value returned from `flush_all`.
    pub flush_result: bool,
    /// How long `flush_all` blocks before returning.
    pub flush_delay: Duration,
}

impl Default for RecordingTracer {
    fn default() -> Self {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        Self {
            calls: Mutex::new(Vec::new()),
            exporter,
            provider,
            flush_result: true,
            flush_delay: Duration::ZERO,
        }
    }
}

impl RecordingTracer {
    pub fn calls(&self) -> Vec<TracerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&TracerCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().unwrap()
    }
}

impl TurnTracer for RecordingTracer {
    fn begin_turn(&self, session_id: &str, prompt: &str, extra: Vec<KeyValue>) -> TurnSpan {
        self.calls.lock().unwrap().push(TracerCall::Begin {
            session_id: session_id.to_string(),
            prompt: prompt.to_string(),
            extra: extra.clone(),
        });
        let tracer = self.provider.tracer("recording");
        let root = Context::new();
        let span = tracer
            .span_builder("test_turn")
            .with_attributes(turn_attributes("test", session_id, prompt, extra))
            .start_with_context(&tracer, &root);
        TurnSpan::new(root.with_span(span))
    }

    fn complete_turn(&self, span: &TurnSpan, response_text: &str, usage: Usage, extra: Vec<KeyValue>) {
        self.calls.lock().unwrap().push(TracerCall::Complete {
            response_text: response_text.to_string(),
            usage,
            extra: extra.clone(),
        });
        span.set_attributes(completion_attributes(response_text, usage, extra));
    }

    fn end_turn(&self, span: TurnSpan) {
        self.calls.lock().unwrap().push(TracerCall::End);
        span.end();
    }

    fn flush_all(&self, timeout: Duration) -> bool {
        self.calls.lock().unwrap().push(TracerCall::Flush(timeout));
        std::thread::sleep(self.flush_delay);
        self.flush_result
    }

    fn shutdown(&self, timeout: Duration) -> CoreResult<()> {
        self.calls.lock().unwrap().push(TracerCall::Shutdown(timeout));
        Ok(())
    }
}
