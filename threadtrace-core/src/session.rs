//! Session manager: one interactive conversation, its transcript and thread identity.
//!
//! A session drives one turn span per user message through the injected
//! [`TurnTracer`] and hands the span's scope to the [`ChatProvider`] so nested
//! spans and outgoing trace headers hang off the turn.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ChatError, CoreResult};
use crate::model::{ChatMessage, ChatRequest, StopReason, Usage};
use crate::profile::Profile;
use crate::provider::ChatProvider;
use crate::telemetry::{KEY_FINISH_REASON, TurnTracer};

/// Consecutive input errors after which the loop gives up and shuts down.
const MAX_READ_ERRORS: u32 = 5;

/// Ordered, append-only conversation history.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<ChatMessage>,
}

impl Transcript {
    pub fn push(&mut self, msg: ChatMessage) {
        self.entries.push(msg);
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of a successful turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnResult {
    pub response_text: String,
    pub usage: Usage,
}

/// Per-session call parameters.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub profile: Profile,
    pub project_name: String,
    pub model: String,
    pub max_tokens: u32,
    /// Upper bound for flush plus tracer shutdown on exit.
    pub flush_timeout: Duration,
}

pub struct Session {
    thread_id: String,
    settings: SessionSettings,
    transcript: Transcript,
    provider: Arc<dyn ChatProvider>,
    tracer: Arc<dyn TurnTracer>,
    shut_down: bool,
}

impl Session {
    /// Begin a session. A fresh UUID v4 thread id is generated when none is given.
    pub fn start(
        thread_id: Option<String>,
        settings: SessionSettings,
        provider: Arc<dyn ChatProvider>,
        tracer: Arc<dyn TurnTracer>,
    ) -> Self {
        let thread_id = thread_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(
            thread_id = %thread_id,
            project = %settings.project_name,
            provider = provider.name(),
            "session started"
        );
        Self {
            thread_id,
            settings,
            transcript: Transcript::default(),
            provider,
            tracer,
            shut_down: false,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Run one turn. The span is closed on every path; on a model error the
    /// transcript keeps the user entry only.
    pub async fn submit_turn(&mut self, text: &str) -> CoreResult<TurnResult> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(ChatError::Validation("message is empty".into()));
        }
        let profile = self.settings.profile;

        self.transcript.push(ChatMessage::user(prompt));
        let span = self
            .tracer
            .begin_turn(&self.thread_id, prompt, profile.begin_attributes());

        let req = ChatRequest {
            model: self.settings.model.clone(),
            messages: self.transcript.entries().to_vec(),
            system: profile.system_prompt().map(str::to_string),
            max_output_tokens: Some(self.settings.max_tokens),
        };

        let resp = match self.provider.chat(req, span.scope()).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    thread_id = %self.thread_id,
                    kind = e.kind(),
                    error = %e,
                    "model call failed"
                );
                self.tracer.end_turn(span);
                return Err(e);
            }
        };

        let response_text = resp.text();
        self.transcript.push(ChatMessage::assistant(response_text.clone()));

        let mut extra = profile.completion_attributes(prompt);
        if let Some(reason) = resp.stop_reason {
            extra.push(KeyValue::new(KEY_FINISH_REASON, reason.as_str()));
        }
        self.tracer.complete_turn(&span, &response_text, resp.usage, extra);
        self.tracer.end_turn(span);

        if resp.stop_reason == Some(StopReason::Length) {
            warn!(
                thread_id = %self.thread_id,
                max_tokens = self.settings.max_tokens,
                "reply cut off at the output token limit"
            );
        }
        debug!(
            thread_id = %self.thread_id,
            provider = %resp.provider,
            model = %resp.model,
            request_id = resp.provider_request_id.as_deref().unwrap_or("-"),
            latency_ms = resp.latency_ms,
            stop_reason = resp.stop_reason.map(StopReason::as_str).unwrap_or("-"),
            input_tokens = resp.usage.input_tokens,
            output_tokens = resp.usage.output_tokens,
            "turn completed"
        );

        Ok(TurnResult {
            response_text,
            usage: resp.usage,
        })
    }

    /// Flush buffered spans, then release the tracer, both within the one
    /// configured timeout. Only the first call does anything.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let budget = self.settings.flush_timeout;
        let started = Instant::now();
        if !self.tracer.flush_all(budget) {
            warn!(thread_id = %self.thread_id, "trace flush did not complete");
        }
        let remaining = budget.saturating_sub(started.elapsed());
        if let Err(e) = self.tracer.shutdown(remaining) {
            warn!(error = %e, "tracer shutdown failed");
        }
    }
}

/// Trimmed, case-insensitive match against `quit`.
pub fn is_quit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("quit")
}

/// Interactive loop over line-oriented input. Returns once the user quits, the
/// input ends or reading fails repeatedly; all three shut the session down.
pub async fn run<R, W>(session: &mut Session, mut input: R, mut out: W) -> CoreResult<()>
where
    R: BufRead,
    W: Write,
{
    let profile = session.settings.profile;
    writeln!(
        out,
        "{} (tracing to LangSmith project: {})",
        profile.title(),
        session.settings.project_name
    )?;
    writeln!(out, "Thread ID: {}", session.thread_id)?;
    writeln!(out, "Type 'quit' to exit.\n")?;

    let mut read_errors = 0;
    loop {
        write!(out, "You: ")?;
        out.flush()?;

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => {
                debug!("input closed");
                break;
            }
            Ok(_) => read_errors = 0,
            Err(e) => {
                read_errors += 1;
                warn!(error = %e, "error reading input");
                if read_errors >= MAX_READ_ERRORS {
                    error!(errors = read_errors, "giving up on unreadable input");
                    break;
                }
                continue;
            }
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if is_quit(text) {
            break;
        }

        match session.submit_turn(text).await {
            Ok(result) => {
                writeln!(out, "\n{}: {}\n", profile.reply_label(), result.response_text)?;
            }
            Err(e) => {
                // Already logged with context by submit_turn.
                debug!(kind = e.kind(), "turn skipped");
            }
        }
    }

    writeln!(out, "\nFlushing traces to LangSmith...")?;
    out.flush()?;
    session.shutdown();
    writeln!(out, "Goodbye!")?;
    out.flush()?;
    Ok(())
}
