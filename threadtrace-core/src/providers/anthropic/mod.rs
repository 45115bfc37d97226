use async_trait::async_trait;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::Tracer;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::CoreResult,
    http_client::{HttpClient, RequestCtx},
    model::{ChatRequest, ChatResponse, Role, StopReason, Usage},
    provider::ChatProvider,
    telemetry::{
        KEY_ERROR_KIND, KEY_ERROR_MESSAGE, KEY_FINISH_REASON, KEY_INPUT_TOKENS, KEY_OUTPUT_TOKENS,
        KEY_REQUEST_MAX_TOKENS, KEY_REQUEST_MODEL, KEY_RESPONSE_ID, KEY_SYSTEM, TraceScope,
    },
};

/// Default Anthropic API version header required by the Messages API.
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const CALL_SPAN_NAME: &str = "anthropic.messages";

#[derive(Debug, Clone)]
pub struct Anthropic {
    http: HttpClient,
    api_key: SecretString,
    base: String,
    name: String,
    /// When set, each call opens a client span under the caller's scope.
    tracer: Option<Tracer>,
}

impl Anthropic {
    pub fn new(http: HttpClient, api_key: SecretString, base: String) -> Self {
        Self {
            http,
            api_key,
            base: base.trim_end_matches('/').to_string(),
            name: "anthropic".into(),
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            (
                "x-api-key".to_string(),
                self.api_key.expose_secret().to_string(),
            ),
            (
                "anthropic-version".to_string(),
                ANTHROPIC_API_VERSION.to_string(),
            ),
        ]
    }

    fn map_stop(reason: Option<&str>) -> Option<StopReason> {
        match reason {
            Some("end_turn") => Some(StopReason::EndTurn),
            Some("max_tokens") => Some(StopReason::Length),
            Some("tool_use") => Some(StopReason::ToolUse),
            Some("stop_sequence") => Some(StopReason::Stop),
            Some(_) => Some(StopReason::Other),
            None => None,
        }
    }

    /// Open the per-call client span, or reuse the caller's scope untouched.
    fn call_scope(&self, req: &ChatRequest, max_tokens: u32, parent: &TraceScope) -> TraceScope {
        let Some(tracer) = &self.tracer else {
            return parent.clone();
        };
        let span = tracer
            .span_builder(CALL_SPAN_NAME)
            .with_kind(SpanKind::Client)
            .with_attributes(vec![
                KeyValue::new(KEY_SYSTEM, "anthropic"),
                KeyValue::new(KEY_REQUEST_MODEL, req.model.clone()),
                KeyValue::new(KEY_REQUEST_MAX_TOKENS, i64::from(max_tokens)),
            ])
            .start_with_context(tracer, parent.context());
        TraceScope::from_context(parent.context().with_span(span))
    }
}

// ===== Anthropic wire types (Messages API) =====

#[derive(Serialize)]
struct AMsgReq<'a> {
    model: &'a str,
    messages: Vec<AMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct AMessage<'a> {
    role: &'a str,
    content: Vec<AContent<'a>>, // Anthropic requires an array of content blocks
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AContent<'a> {
    Text { text: &'a str },
}

#[derive(Deserialize)]
struct AMsgResp {
    id: String,
    #[serde(default)]
    model: Option<String>,
    content: Vec<ARespContent>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AUsage>,
}

#[derive(Deserialize)]
struct ARespContent {
    r#type: String,
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct AUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[async_trait]
impl ChatProvider for Anthropic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, req: ChatRequest, scope: &TraceScope) -> CoreResult<ChatResponse> {
        let msgs: Vec<AMessage> = req
            .messages
            .iter()
            .map(|m| AMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: vec![AContent::Text { text: &m.content }],
            })
            .collect();

        let max_tokens = req.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS).max(1);

        let payload = AMsgReq {
            model: &req.model,
            messages: msgs,
            system: req.system.as_deref(),
            max_tokens,
        };

        let call = self.call_scope(&req, max_tokens, scope);
        let trace_headers = call.trace_headers();
        let ctx = RequestCtx {
            provider: Some(&self.name),
            trace_headers: &trace_headers,
        };

        let url = format!("{}/v1/messages", self.base);
        let headers = self.headers();
        let header_pairs: Vec<(&str, &str)> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let result = self
            .http
            .post_json::<_, AMsgResp>(&url, &payload, &header_pairs, &ctx)
            .await;

        let owns_span = self.tracer.is_some();
        let (resp, provider_request_id, latency_ms) = match result {
            Ok(ok) => ok,
            Err(err) => {
                if owns_span {
                    let span = call.context().span();
                    span.set_attributes(vec![
                        KeyValue::new(KEY_ERROR_KIND, err.kind()),
                        KeyValue::new(KEY_ERROR_MESSAGE, err.to_string()),
                    ]);
                    span.set_status(Status::error(err.to_string()));
                    span.end();
                }
                return Err(err);
            }
        };

        let segments: Vec<String> = resp
            .content
            .into_iter()
            .filter(|c| c.r#type == "text")
            .filter_map(|c| c.text)
            .collect();

        let usage = resp.usage.unwrap_or_default();
        let usage = Usage {
            input_tokens: usage.input_tokens.unwrap_or(0),
            output_tokens: usage.output_tokens.unwrap_or(0),
        };

        if owns_span {
            let span = call.context().span();
            let mut attrs = vec![
                KeyValue::new(KEY_RESPONSE_ID, resp.id.clone()),
                KeyValue::new(KEY_INPUT_TOKENS, i64::from(usage.input_tokens)),
                KeyValue::new(KEY_OUTPUT_TOKENS, i64::from(usage.output_tokens)),
            ];
            if let Some(reason) = &resp.stop_reason {
                attrs.push(KeyValue::new(KEY_FINISH_REASON, reason.clone()));
            }
            span.set_attributes(attrs);
            span.end();
        }

        debug!(
            provider = %self.name,
            response_id = %resp.id,
            latency_ms,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "messages call completed"
        );

        Ok(ChatResponse {
            model: resp.model.unwrap_or(req.model),
            segments,
            usage,
            provider: self.name.clone(),
            stop_reason: Anthropic::map_stop(resp.stop_reason.as_deref()),
            provider_request_id,
            latency_ms,
        })
    }
}
