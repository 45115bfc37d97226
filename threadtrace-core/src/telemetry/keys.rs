/// Span attribute keys for turn and model-call spans.
/// Keep these stable; the LangSmith thread view joins on them.
pub const KEY_TRACE_NAME: &str = "langsmith.trace.name";
pub const KEY_SESSION_ID: &str = "langsmith.metadata.session_id";
pub const KEY_SPAN_KIND: &str = "langsmith.span.kind";

pub const KEY_PROMPT: &str = "gen_ai.prompt";
pub const KEY_COMPLETION: &str = "gen_ai.completion";
pub const KEY_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
pub const KEY_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

/// Model-call (child span) request/response metadata.
pub const KEY_SYSTEM: &str = "gen_ai.system";
pub const KEY_REQUEST_MODEL: &str = "gen_ai.request.model";
pub const KEY_REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";
pub const KEY_RESPONSE_ID: &str = "gen_ai.response.id";
pub const KEY_FINISH_REASON: &str = "gen_ai.response.finish_reason";

/// ITSM profile extras
pub const KEY_ITSM_CATEGORY: &str = "itsm.category";
pub const KEY_ITSM_TICKET_DRAFT: &str = "itsm.ticket_draft_json";

/// Error-related (if applicable)
pub const KEY_ERROR_KIND: &str = "error.kind";
pub const KEY_ERROR_MESSAGE: &str = "error.message";

/// LangSmith run type for a conversation turn.
pub const SPAN_KIND_CHAIN: &str = "chain";
