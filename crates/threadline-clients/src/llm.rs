//! The external chat model consulted for disentanglement continuation
//! decisions and event-datetime extraction (spec §4.3, §4.5, §6). Both
//! calls are JSON-over-HTTP, temperature 0, schema-constrained. External
//! collaborator — this module only defines the contract and a `reqwest`
//! client for it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threadline_core::error::{Result, ThreadlineError};
use threadline_core::types::ClassifiedMessage;

/// Response schema for the continuation call (spec §6):
/// `{ "new_message": string, "option": integer, "reason": string }`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContinuationResponse {
    pub new_message: String,
    pub option: i64,
    pub reason: String,
}

/// Response schema for the datetime-extraction call (spec §6):
/// `{ "event_datetime": RFC3339, "datetime_exists": bool, "reason": string }`
#[derive(Debug, Clone, Deserialize)]
pub struct DatetimeResponse {
    pub event_datetime: Option<DateTime<Utc>>,
    pub datetime_exists: bool,
    #[allow(dead_code)]
    pub reason: String,
}

impl DatetimeResponse {
    /// `None` unless the model both claims the datetime exists and
    /// returned one. A model that sets `datetime_exists = true` but
    /// omits `event_datetime` is treated as "nothing found" rather than
    /// faulted — the lifecycle evaluator degrades gracefully either way.
    pub fn extracted(&self) -> Option<DateTime<Utc>> {
        if self.datetime_exists {
            self.event_datetime
        } else {
            None
        }
    }
}

/// Formats up to `WINDOW_SIZE` recent messages as enumerated options and
/// asks which (if any) the new message continues (spec §4.3 LLM strategy).
#[async_trait]
pub trait ContinuationLlm: Send + Sync {
    async fn classify_continuation(
        &self,
        window: &[ClassifiedMessage],
        msg: &ClassifiedMessage,
    ) -> Result<ContinuationResponse>;
}

/// Extracts an event datetime from a full (suspended) conversation.
#[async_trait]
pub trait DatetimeExtractor: Send + Sync {
    async fn extract_event_datetime(
        &self,
        conversation: &[ClassifiedMessage],
    ) -> Result<DatetimeResponse>;
}

fn format_options(window: &[ClassifiedMessage]) -> String {
    window
        .iter()
        .enumerate()
        .map(|(idx, m)| format!("Option {}: {}", idx + 1, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_conversation(lines: &[ClassifiedMessage]) -> String {
    lines
        .iter()
        .map(|m| format!("[{}] {}: {}", m.ts.to_rfc3339(), m.user, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shared HTTP chat-model client implementing both external-LLM contracts.
/// Connection-pooled (`reqwest::Client` clones its inner `Arc`) and safe
/// to call concurrently from multiple stages, per spec §5.
#[derive(Clone)]
pub struct HttpChatLlm {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpChatLlm {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }

    async fn chat_json<T: for<'de> Deserialize<'de>>(
        &self,
        prompt: String,
        schema: serde_json::Value,
    ) -> Result<T> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "format": schema,
            "options": { "temperature": 0, "num_ctx": 8192 },
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ThreadlineError::LlmProvider(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ThreadlineError::LlmProvider(format!(
                "chat model returned HTTP {}",
                resp.status()
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ThreadlineError::LlmProvider(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl ContinuationLlm for HttpChatLlm {
    async fn classify_continuation(
        &self,
        window: &[ClassifiedMessage],
        msg: &ClassifiedMessage,
    ) -> Result<ContinuationResponse> {
        let prompt = format!(
            "As one of the best and most reasonable data taggers,\n\n\
             You are provided with up to {} options that represent the last \
             messages that have come in and a new message. Reply with which \
             option is the parent of the new message, or -1 if neither is.\n\n\
             Here are your options:\n{}\n\n\
             The new message:\n{}\n\n\
             Provide your classification response with reasoning below,\nResponse:",
            window.len(),
            format_options(window),
            msg.text,
        );

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "new_message": { "type": "string" },
                "option": { "type": "integer" },
                "reason": { "type": "string" },
            },
            "required": ["new_message", "option", "reason"],
        });

        self.chat_json(prompt, schema).await
    }
}

#[async_trait]
impl DatetimeExtractor for HttpChatLlm {
    async fn extract_event_datetime(
        &self,
        conversation: &[ClassifiedMessage],
    ) -> Result<DatetimeResponse> {
        let prompt = format!(
            "Assume you are a data annotator tasked with extracting the event \
             datetime from a conversation.\n\n\
             Here is the conversation so far:\n{}\n\n\
             Provide the event datetime below,\nResponse:",
            format_conversation(conversation),
        );

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "event_datetime": { "type": "string", "format": "date-time" },
                "datetime_exists": { "type": "boolean" },
                "reason": { "type": "string" },
            },
            "required": ["datetime_exists", "reason"],
        });

        self.chat_json(prompt, schema).await
    }
}
