//! Turn-scoped trace correlation.
//!
//! Every conversation turn becomes one span. Turns of the same session share a
//! `langsmith.metadata.session_id` attribute and nothing else: there is no thread
//! object and no parent linking turns together, the backend groups them at query time.

pub mod keys;
pub mod otel;
#[cfg(test)]
pub mod test_tracer;
pub mod types;

pub use keys::*;
pub use otel::{ExportSettings, OtelTurnTracer};
pub use types::*;

use std::time::Duration;

use opentelemetry::KeyValue;

use crate::error::CoreResult;
use crate::model::Usage;

/// Span and trace names a tracer stamps on every turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnNaming {
    /// Span name, e.g. "chat_turn".
    pub span_name: &'static str,
    /// Logical flow name shown as the trace name.
    pub trace_name: &'static str,
    /// Instrumentation scope name for the tracer.
    pub instrumentation: &'static str,
}

/// Opens, decorates and closes turn spans, and flushes them on exit.
///
/// Requirements:
/// - Implementations must be thread-safe (`Send + Sync`).
/// - `end_turn` must be reached once per `begin_turn`; dropping the `TurnSpan`
///   counts as ending it.
/// - `complete_turn` is called at most once per span and never on the error path.
pub trait TurnTracer: Send + Sync {
    fn begin_turn(&self, session_id: &str, prompt: &str, extra: Vec<KeyValue>) -> TurnSpan;

    fn complete_turn(&self, span: &TurnSpan, response_text: &str, usage: Usage, extra: Vec<KeyValue>) {
        span.set_attributes(completion_attributes(response_text, usage, extra));
    }

    fn end_turn(&self, span: TurnSpan) {
        span.end();
    }

    /// Export everything buffered, blocking up to `timeout`. Returns `true` if the
    /// flush finished in time and without error.
    fn flush_all(&self, timeout: Duration) -> bool;

    /// Release exporter resources, waiting at most `timeout`. Call after the
    /// final flush.
    fn shutdown(&self, timeout: Duration) -> CoreResult<()>;
}

/// Attributes set when a turn span is created.
pub fn turn_attributes(
    trace_name: &str,
    session_id: &str,
    prompt: &str,
    extra: Vec<KeyValue>,
) -> Vec<KeyValue> {
    let mut attrs = vec![
        KeyValue::new(KEY_TRACE_NAME, trace_name.to_string()),
        KeyValue::new(KEY_SESSION_ID, session_id.to_string()),
        KeyValue::new(KEY_SPAN_KIND, SPAN_KIND_CHAIN),
        KeyValue::new(KEY_PROMPT, prompt.to_string()),
    ];
    attrs.extend(extra);
    attrs
}

/// Attributes set once the model answered.
pub fn completion_attributes(response_text: &str, usage: Usage, extra: Vec<KeyValue>) -> Vec<KeyValue> {
    let mut attrs = vec![
        KeyValue::new(KEY_COMPLETION, response_text.to_string()),
        KeyValue::new(KEY_INPUT_TOKENS, i64::from(usage.input_tokens)),
        KeyValue::new(KEY_OUTPUT_TOKENS, i64::from(usage.output_tokens)),
    ];
    attrs.extend(extra);
    attrs
}
