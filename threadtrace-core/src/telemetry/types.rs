use std::collections::HashMap;

use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;

/// Explicit tracing scope handed to anything that may create nested spans.
///
/// Nothing in this crate reads the ambient `Context::current()`; callers pass the
/// scope of the span their work should nest under.
#[derive(Debug, Clone, Default)]
pub struct TraceScope {
    cx: Context,
}

impl TraceScope {
    /// A scope with no active span; work started under it is top-level.
    pub fn detached() -> Self {
        Self { cx: Context::new() }
    }

    pub fn from_context(cx: Context) -> Self {
        Self { cx }
    }

    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn has_active_span(&self) -> bool {
        self.cx.has_active_span()
    }

    /// W3C trace-context headers (`traceparent`, optionally `tracestate`) for the
    /// active span. Empty when the scope is detached.
    pub fn trace_headers(&self) -> Vec<(String, String)> {
        let mut carrier: HashMap<String, String> = HashMap::new();
        TraceContextPropagator::new().inject_context(&self.cx, &mut carrier);
        let mut headers: Vec<(String, String)> = carrier.into_iter().collect();
        headers.sort();
        headers
    }
}

/// Handle for one open turn span.
///
/// The span closes when the handle is ended or dropped, whichever comes first, so
/// every exit path of a turn releases it exactly once.
#[derive(Debug)]
pub struct TurnSpan {
    scope: TraceScope,
}

impl TurnSpan {
    pub fn new(cx: Context) -> Self {
        Self {
            scope: TraceScope::from_context(cx),
        }
    }

    /// Scope that parents spans created while the turn is open.
    pub fn scope(&self) -> &TraceScope {
        &self.scope
    }

    pub fn set_attributes(&self, attributes: Vec<KeyValue>) {
        self.scope.cx.span().set_attributes(attributes);
    }

    pub fn end(self) {
        drop(self);
    }
}

impl Drop for TurnSpan {
    fn drop(&mut self) {
        // Ending an already-ended SDK span is a no-op.
        self.scope.cx.span().end();
    }
}
