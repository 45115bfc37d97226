use async_trait::async_trait;

use crate::error::CoreResult;
use crate::model::{ChatRequest, ChatResponse, Usage};
use crate::telemetry::TraceScope;

/// A language-model backend.
///
/// `scope` is the tracing scope of the caller's turn; implementations that create
/// spans or propagate trace headers must parent them under it.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn chat(&self, req: ChatRequest, scope: &TraceScope) -> CoreResult<ChatResponse>;
}

/// A dummy provider that echoes the last user message back.
/// Useful for tests or for running the loop without network access.
pub struct NullProvider;

#[async_trait]
impl ChatProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    async fn chat(&self, req: ChatRequest, _scope: &TraceScope) -> CoreResult<ChatResponse> {
        let last = req
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatResponse {
            model: req.model,
            segments: vec![format!("[null provider] {last}")],
            usage: Usage {
                input_tokens: req.messages.iter().map(|m| m.content.len() as u32).sum(),
                output_tokens: 0,
            },
            provider: "null".into(),
            stop_reason: None,
            provider_request_id: None,
            latency_ms: 0,
        })
    }
}
