//! LLM continuation strategy (spec §4.3). Formats the window as
//! enumerated options, asks the external chat model which (if any) the
//! new message continues. Retries once on failure; a second failure
//! degrades to the rule-based strategy so the pipeline never stalls.

use std::sync::Arc;

use async_trait::async_trait;
use threadline_clients::llm::ContinuationLlm;
use threadline_core::types::ClassifiedMessage;
use tracing::warn;

use crate::window::WindowEntry;
use crate::ContinuationClassifier;

/// Attempts (1 initial + this many retries) before falling back.
const MAX_ATTEMPTS: u32 = 2;

pub struct LlmContinuationClassifier<F> {
    llm: Arc<dyn ContinuationLlm>,
    fallback: F,
}

impl<F> LlmContinuationClassifier<F>
where
    F: ContinuationClassifier,
{
    pub fn new(llm: Arc<dyn ContinuationLlm>, fallback: F) -> Self {
        Self { llm, fallback }
    }
}

#[async_trait]
impl<F> ContinuationClassifier for LlmContinuationClassifier<F>
where
    F: ContinuationClassifier,
{
    async fn continuation_of(&self, window: &[WindowEntry], msg: &ClassifiedMessage) -> i64 {
        let messages: Vec<ClassifiedMessage> = window.iter().map(|e| e.msg.clone()).collect();

        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.llm.classify_continuation(&messages, msg).await {
                Ok(resp) => {
                    return if resp.option >= 1 && (resp.option as usize) <= window.len() {
                        resp.option
                    } else {
                        -1
                    };
                }
                Err(e) => {
                    warn!(attempt, error = %e, "continuation LLM call failed");
                    last_err = Some(e);
                }
            }
        }

        warn!(
            error = ?last_err,
            "continuation LLM exhausted retries, falling back to rule-based strategy"
        );
        self.fallback.continuation_of(window, msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_based::RuleBasedClassifier;
    use crate::window::LocalConvId;
    use chrono::Utc;
    use threadline_clients::test_utils::{StubContinuationLlm, StubEmbedder};
    use threadline_core::types::CalendarLabel;

    fn entry(seqid: i64, user: &str, text: &str) -> WindowEntry {
        WindowEntry {
            msg: ClassifiedMessage {
                seqid,
                ts: Utc::now(),
                user: user.to_string(),
                text: text.to_string(),
                label: CalendarLabel::Positive,
                score: 0.9,
            },
            local_conv_id: LocalConvId(0),
        }
    }

    #[tokio::test]
    async fn returns_llm_option_directly_on_success() {
        let llm = Arc::new(StubContinuationLlm::always_option(1));
        let fallback = RuleBasedClassifier::new(Arc::new(StubEmbedder));
        let classifier = LlmContinuationClassifier::new(llm, fallback);

        let window = vec![entry(1, "alice", "call at 4pm?")];
        let msg = ClassifiedMessage {
            seqid: 2,
            ts: Utc::now(),
            user: "bob".to_string(),
            text: "@alice yes".to_string(),
            label: CalendarLabel::Positive,
            score: 0.9,
        };
        let k = classifier.continuation_of(&window, &msg).await;
        assert_eq!(k, 1);
    }

    #[tokio::test]
    async fn out_of_range_option_is_treated_as_create() {
        let llm = Arc::new(StubContinuationLlm::always_option(99));
        let fallback = RuleBasedClassifier::new(Arc::new(StubEmbedder));
        let classifier = LlmContinuationClassifier::new(llm, fallback);

        let window = vec![entry(1, "alice", "call at 4pm?")];
        let msg = ClassifiedMessage {
            seqid: 2,
            ts: Utc::now(),
            user: "carol".to_string(),
            text: "unrelated".to_string(),
            label: CalendarLabel::Positive,
            score: 0.9,
        };
        let k = classifier.continuation_of(&window, &msg).await;
        assert_eq!(k, -1);
    }

    #[tokio::test]
    async fn falls_back_to_rule_based_after_two_failures() {
        // Scenario E4: LLM times out twice, rule-based finds @alice mention.
        let llm = Arc::new(StubContinuationLlm::failing_then_option(2, 1));
        let fallback = RuleBasedClassifier::new(Arc::new(StubEmbedder));
        let classifier = LlmContinuationClassifier::new(llm, fallback);

        let window = vec![entry(1, "alice", "3pm standup ok?")];
        let msg = ClassifiedMessage {
            seqid: 2,
            ts: Utc::now(),
            user: "bob".to_string(),
            text: "@alice yes".to_string(),
            label: CalendarLabel::Positive,
            score: 0.9,
        };
        let k = classifier.continuation_of(&window, &msg).await;
        assert_eq!(k, 1);
    }
}
