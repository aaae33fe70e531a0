//! The calendar-relatedness classifier is an external collaborator (spec
//! §1): a pretrained binary sequence classifier reachable over HTTP. This
//! module only defines the interface contract and a thin `reqwest` client
//! for it — the model itself is out of scope.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use threadline_core::error::{Result, ThreadlineError};
use threadline_core::types::{CalendarLabel, ClassifiedMessage, Message};

use crate::normalize::clean_text;

/// A pure function `Message -> ClassifiedMessage` (spec §4.2): normalises
/// the text, asks the external classifier, attaches label + score while
/// leaving the stored text untouched.
#[async_trait]
pub trait CalendarClassifier: Send + Sync {
    async fn classify(&self, msg: Message) -> Result<ClassifiedMessage>;
}

#[derive(Debug, Deserialize)]
struct ClassifierResponse {
    label: CalendarLabel,
    score: f64,
}

/// HTTP-backed classifier. POSTs `{"text": "..."}` to `endpoint` and
/// expects `{"label": "LABEL_0"|"LABEL_1", "score": f64}` back.
pub struct HttpCalendarClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCalendarClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl CalendarClassifier for HttpCalendarClassifier {
    async fn classify(&self, msg: Message) -> Result<ClassifiedMessage> {
        let cleaned = clean_text(&msg.text);

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": cleaned }))
            .send()
            .await
            .map_err(|e| ThreadlineError::Classifier(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ThreadlineError::Classifier(format!(
                "classifier returned HTTP {}",
                resp.status()
            )));
        }

        let parsed: ClassifierResponse = resp
            .json()
            .await
            .map_err(|e| ThreadlineError::Classifier(e.to_string()))?;

        Ok(ClassifiedMessage::from_message(
            msg,
            parsed.label,
            parsed.score,
        ))
    }
}
