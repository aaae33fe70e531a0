//! Deterministic stand-ins for the external collaborators (spec §1), so
//! the rest of the workspace can test the pipeline end-to-end without
//! ever reaching the network (spec §8's end-to-end scenarios E1–E6).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use threadline_core::error::{Result, ThreadlineError};
use threadline_core::types::{CalendarLabel, ClassifiedMessage, Message};

use crate::classifier::CalendarClassifier;
use crate::embedding::Embedder;
use crate::llm::{ContinuationLlm, ContinuationResponse, DatetimeExtractor, DatetimeResponse};

/// Always labels every message with a fixed `(label, score)` pair.
pub struct StubClassifier {
    pub label: CalendarLabel,
    pub score: f64,
}

impl StubClassifier {
    pub fn always_positive() -> Self {
        Self {
            label: CalendarLabel::Positive,
            score: 0.95,
        }
    }
}

#[async_trait]
impl CalendarClassifier for StubClassifier {
    async fn classify(&self, msg: Message) -> Result<ClassifiedMessage> {
        Ok(ClassifiedMessage::from_message(msg, self.label, self.score))
    }
}

/// Returns a fixed `option` for every continuation query. Optionally
/// fails its first `fail_times` calls, to exercise the Disentangler's
/// retry-then-fallback path (spec §4.3, scenario E4).
pub struct StubContinuationLlm {
    pub option: Mutex<i64>,
    pub fail_times: AtomicUsize,
}

impl StubContinuationLlm {
    pub fn always_option(option: i64) -> Self {
        Self {
            option: Mutex::new(option),
            fail_times: AtomicUsize::new(0),
        }
    }

    pub fn failing_then_option(fail_times: usize, option: i64) -> Self {
        Self {
            option: Mutex::new(option),
            fail_times: AtomicUsize::new(fail_times),
        }
    }
}

#[async_trait]
impl ContinuationLlm for StubContinuationLlm {
    async fn classify_continuation(
        &self,
        _window: &[ClassifiedMessage],
        msg: &ClassifiedMessage,
    ) -> Result<ContinuationResponse> {
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.fetch_sub(1, Ordering::SeqCst);
            return Err(ThreadlineError::LlmProvider(
                "stub configured to fail".to_string(),
            ));
        }
        let option = *self.option.lock().unwrap();
        Ok(ContinuationResponse {
            new_message: msg.text.clone(),
            option,
            reason: "stub".to_string(),
        })
    }
}

/// Returns a fixed datetime (or none) for every extraction query.
pub struct StubDatetimeExtractor {
    pub datetime: Option<DateTime<Utc>>,
}

impl StubDatetimeExtractor {
    pub fn none() -> Self {
        Self { datetime: None }
    }

    pub fn at(dt: DateTime<Utc>) -> Self {
        Self { datetime: Some(dt) }
    }
}

#[async_trait]
impl DatetimeExtractor for StubDatetimeExtractor {
    async fn extract_event_datetime(
        &self,
        _conversation: &[ClassifiedMessage],
    ) -> Result<DatetimeResponse> {
        Ok(DatetimeResponse {
            event_datetime: self.datetime,
            datetime_exists: self.datetime.is_some(),
            reason: "stub".to_string(),
        })
    }
}

/// Returns a fixed embedding regardless of input, or scores similarity by
/// exact substring overlap when `similar_to` is set — enough to exercise
/// the semantic-similarity rule deterministically in tests.
pub struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // A crude but deterministic bag-of-chars embedding: good enough to
        // make "similar" texts score high cosine similarity without
        // depending on network access or a real model.
        let mut vec = vec![0.0f32; 26];
        for c in text.to_lowercase().chars() {
            if c.is_ascii_lowercase() {
                vec[(c as u8 - b'a') as usize] += 1.0;
            }
        }
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vec.iter_mut() {
                *x /= norm;
            }
        }
        Ok(vec)
    }
}
