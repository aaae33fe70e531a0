//! Lifecycle Evaluator (spec §4.5): a mostly-pure pass over the live
//! conversation set that suspends inactive conversations, optionally
//! extracts an event datetime from them, then completes and hands off
//! suspended conversations once the completion criteria are met.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use threadline_clients::llm::DatetimeExtractor;
use threadline_core::types::{Conversation, ConversationId};
use tracing::{debug, info};

/// Result of one evaluation pass: the ids completed this pass, to be
/// removed from live state and handed to the Archiver by the caller.
pub struct EvaluationOutcome {
    pub completed: Vec<ConversationId>,
}

/// Runs one evaluation pass over `conversations`, mutating them in place
/// (suspension flags, extracted datetimes) and returning which ids
/// crossed into `completed` this pass.
///
/// `datetime_extractor` is optional: spec §4.5 marks the extraction call
/// itself optional, and `extract_event_datetime` being `None` simply
/// means completion falls back entirely to the grace period.
pub async fn evaluate(
    now: DateTime<Utc>,
    conversations: &mut HashMap<ConversationId, Conversation>,
    suspend_after: chrono::Duration,
    completion_grace: chrono::Duration,
    datetime_extractor: Option<&Arc<dyn DatetimeExtractor>>,
) -> EvaluationOutcome {
    let mut completed = Vec::new();

    for (id, conv) in conversations.iter_mut() {
        if !conv.suspended && now - conv.last_updated > suspend_after {
            conv.suspended = true;
            debug!(conv_id = %id, "conversation suspended due to inactivity");

            if let Some(extractor) = datetime_extractor {
                match extractor.extract_event_datetime(&conv.lines).await {
                    Ok(resp) => {
                        if let Some(dt) = resp.extracted() {
                            debug!(conv_id = %id, event_datetime = %dt, "event datetime extracted");
                            conv.event_datetime = Some(dt);
                        }
                    }
                    Err(e) => {
                        debug!(conv_id = %id, error = %e, "datetime extraction failed, deferring to grace period");
                    }
                }
            }
        }

        if conv.suspended && !conv.completed {
            let datetime_passed = conv
                .event_datetime
                .is_some_and(|dt| dt <= now);
            let grace_elapsed = now - conv.last_updated > suspend_after + completion_grace;

            if datetime_passed || grace_elapsed {
                conv.completed = true;
                info!(conv_id = %id, datetime_passed, grace_elapsed, "conversation completed");
                completed.push(id.clone());
            }
        }
    }

    EvaluationOutcome { completed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_clients::test_utils::StubDatetimeExtractor;
    use threadline_core::types::{CalendarLabel, ClassifiedMessage};

    fn msg(seqid: i64, secs: i64) -> ClassifiedMessage {
        ClassifiedMessage {
            seqid,
            ts: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
            user: "alice".to_string(),
            text: "hi".to_string(),
            label: CalendarLabel::Positive,
            score: 0.9,
        }
    }

    #[tokio::test]
    async fn inactive_conversation_is_suspended() {
        let id = ConversationId::new();
        let conv = Conversation::new(id.clone(), msg(1, 0));
        let mut conversations = HashMap::from([(id.clone(), conv)]);
        let now = DateTime::<Utc>::from_timestamp(100, 0).unwrap();

        let extractor: Arc<dyn DatetimeExtractor> = Arc::new(StubDatetimeExtractor::none());
        let outcome = evaluate(
            now,
            &mut conversations,
            chrono::Duration::seconds(30),
            chrono::Duration::seconds(30),
            Some(&extractor),
        )
        .await;

        assert!(outcome.completed.is_empty());
        assert!(conversations[&id].suspended);
    }

    #[tokio::test]
    async fn suspended_conversation_completes_once_extracted_datetime_is_past() {
        let id = ConversationId::new();
        let mut conv = Conversation::new(id.clone(), msg(1, 0));
        conv.suspended = true;
        let mut conversations = HashMap::from([(id.clone(), conv)]);
        let now = DateTime::<Utc>::from_timestamp(200, 0).unwrap();

        let extractor: Arc<dyn DatetimeExtractor> = Arc::new(StubDatetimeExtractor::at(
            DateTime::<Utc>::from_timestamp(150, 0).unwrap(),
        ));
        let outcome = evaluate(
            now,
            &mut conversations,
            chrono::Duration::seconds(30),
            chrono::Duration::seconds(30),
            Some(&extractor),
        )
        .await;

        assert_eq!(outcome.completed, vec![id.clone()]);
        assert!(conversations[&id].completed);
    }

    #[tokio::test]
    async fn suspended_conversation_completes_via_grace_period_without_datetime() {
        let id = ConversationId::new();
        let mut conv = Conversation::new(id.clone(), msg(1, 0));
        conv.suspended = true;
        let mut conversations = HashMap::from([(id.clone(), conv)]);
        // last_updated = 0; suspend_after=30, grace=30 -> completes after t=60
        let now = DateTime::<Utc>::from_timestamp(61, 0).unwrap();

        let outcome = evaluate(
            now,
            &mut conversations,
            chrono::Duration::seconds(30),
            chrono::Duration::seconds(30),
            None,
        )
        .await;

        assert_eq!(outcome.completed, vec![id]);
    }

    #[tokio::test]
    async fn active_conversation_is_untouched() {
        let id = ConversationId::new();
        let conv = Conversation::new(id.clone(), msg(1, 90));
        let mut conversations = HashMap::from([(id.clone(), conv)]);
        let now = DateTime::<Utc>::from_timestamp(100, 0).unwrap();

        let outcome = evaluate(
            now,
            &mut conversations,
            chrono::Duration::seconds(30),
            chrono::Duration::seconds(30),
            None,
        )
        .await;

        assert!(outcome.completed.is_empty());
        assert!(!conversations[&id].suspended);
    }
}
