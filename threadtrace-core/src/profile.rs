use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::telemetry::{KEY_ITSM_CATEGORY, KEY_ITSM_TICKET_DRAFT, TurnNaming};
use crate::ticket::infer_access_request;

const ITSM_SYSTEM_PROMPT: &str = r#"You are an ITSM assistant. Your job is to help users create ACCESS REQUEST tickets.
Be concise, practical, and enterprise-friendly.

When user asks for access, respond in this format:

1) Quick classification: "Request Type: Access Request"
2) Ask at most 2 clarifying questions if needed (duration, justification, access level, resource)
3) When enough info exists, produce:
- "Ticket Draft" with short structured fields
- "Approvals" required
- "Next Steps"
Keep it friendly and efficient."#;

/// Which assistant the session runs as. Both share one turn loop and differ only
/// in naming, prompt and the extra span attributes they attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Chat,
    Itsm,
}

impl Profile {
    pub fn naming(self) -> TurnNaming {
        match self {
            Profile::Chat => TurnNaming {
                span_name: "chat_turn",
                trace_name: "go-bot",
                instrumentation: "go-chat-demo",
            },
            Profile::Itsm => TurnNaming {
                span_name: "itsm_turn",
                trace_name: "go-bot-itsm",
                instrumentation: "go-bot-itsm",
            },
        }
    }

    /// `service.name` resource attribute.
    pub fn service_name(self) -> &'static str {
        self.naming().instrumentation
    }

    /// Project used when `LANGSMITH_PROJECT` is unset.
    pub fn default_project(self) -> &'static str {
        match self {
            Profile::Chat => "go-bot-chat",
            Profile::Itsm => "go-bot-itsm",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Profile::Chat => "Chat with Claude",
            Profile::Itsm => "go-bot-itsm",
        }
    }

    /// Prefix for printed replies.
    pub fn reply_label(self) -> &'static str {
        match self {
            Profile::Chat => "Claude",
            Profile::Itsm => "ITSM Assistant",
        }
    }

    pub fn system_prompt(self) -> Option<&'static str> {
        match self {
            Profile::Chat => None,
            Profile::Itsm => Some(ITSM_SYSTEM_PROMPT),
        }
    }

    /// Extra attributes set when the turn span opens.
    pub fn begin_attributes(self) -> Vec<KeyValue> {
        match self {
            Profile::Chat => vec![],
            Profile::Itsm => vec![KeyValue::new(KEY_ITSM_CATEGORY, "access_request_demo")],
        }
    }

    /// Extra attributes set alongside the completion, derived from the user's message.
    pub fn completion_attributes(self, prompt: &str) -> Vec<KeyValue> {
        match self {
            Profile::Chat => vec![],
            Profile::Itsm => match infer_access_request(prompt).to_pretty_json() {
                Ok(json) => vec![KeyValue::new(KEY_ITSM_TICKET_DRAFT, json)],
                Err(e) => {
                    warn!(error = %e, "could not serialize ticket draft");
                    vec![]
                }
            },
        }
    }
}
