//! Wires the six pipeline stages together through their bounded channels
//! and runs them to completion (spec §5). Each stage is an independent
//! task; a stage exits once its input channel is drained and closed, so
//! shutdown propagates downstream automatically once the Ingestor stops
//! (feed closed, the upstream connection dropped, or `shutdown` was
//! signalled and the Ingestor closed the feed from our side).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use threadline_archive::run_archiver;
use threadline_clients::llm::{ContinuationLlm, DatetimeExtractor, HttpChatLlm};
use threadline_clients::{CalendarClassifier, Embedder, HttpCalendarClassifier, HttpEmbedder};
use threadline_conversation::{run_manager, ManagerConfig};
use threadline_core::config::{PipelineConfig, WINDOW_SIZE};
use threadline_core::metrics::Counters;
use threadline_disentangle::llm_strategy::LlmContinuationClassifier;
use threadline_disentangle::rule_based::RuleBasedClassifier;
use threadline_disentangle::{run_disentangler, ContinuationClassifier};
use threadline_ingest::{run_ingestor, IngestOutcome};
use tokio::sync::watch;
use tracing::info;

use crate::classify_stage::run_classifier;

/// Runs the full pipeline once against `config.ws_sock`, returning once
/// the feed disconnects (or `shutdown` is signalled) and every
/// downstream stage has drained. The process exit code is decided by
/// the caller based on the returned [`IngestOutcome`].
pub async fn run_pipeline(
    config: PipelineConfig,
    counters: Arc<Counters>,
    shutdown: watch::Receiver<bool>,
) -> IngestOutcome {
    let timeout = Duration::from_secs(config.call_timeout_secs);

    let classifier: Arc<dyn CalendarClassifier> =
        Arc::new(HttpCalendarClassifier::new(config.classifier_endpoint.clone(), timeout));
    let embedder: Arc<dyn Embedder> =
        Arc::new(HttpEmbedder::new(config.embedding_endpoint.clone(), timeout));
    let chat_llm = Arc::new(HttpChatLlm::new(
        config.llm_endpoint.clone(),
        config.llm_model.clone(),
        timeout,
    ));
    let continuation_llm: Arc<dyn ContinuationLlm> = chat_llm.clone();
    let datetime_extractor: Arc<dyn DatetimeExtractor> = chat_llm;

    let fallback = RuleBasedClassifier::new(embedder);
    let continuation_classifier: Arc<dyn ContinuationClassifier> =
        Arc::new(LlmContinuationClassifier::new(continuation_llm, fallback));

    run_pipeline_with(
        config,
        counters,
        classifier,
        continuation_classifier,
        Some(datetime_extractor),
        shutdown,
    )
    .await
}

/// Same wiring as [`run_pipeline`], parameterised over the external
/// collaborators so tests can inject deterministic stubs in place of the
/// HTTP-backed implementations.
pub async fn run_pipeline_with(
    config: PipelineConfig,
    counters: Arc<Counters>,
    classifier: Arc<dyn CalendarClassifier>,
    continuation_classifier: Arc<dyn ContinuationClassifier>,
    datetime_extractor: Option<Arc<dyn DatetimeExtractor>>,
    shutdown: watch::Receiver<bool>,
) -> IngestOutcome {
    let capacity = config.channel_capacity;

    let (ingest_rx, ingest_handle) =
        run_ingestor(config.ws_sock.clone(), capacity, counters.clone(), shutdown);

    let (classified_tx, classified_rx) = tokio::sync::mpsc::channel(capacity);
    let classify_handle = run_classifier(classifier, counters.clone(), ingest_rx, classified_tx);

    let (disentangle_tx, state_rx, disentangle_handle) =
        run_disentangler(continuation_classifier, WINDOW_SIZE, capacity, counters.clone());
    let bridge_to_disentangler = tokio::spawn(forward(classified_rx, disentangle_tx));

    let manager_config = ManagerConfig {
        archive_every: config.archive_every,
        suspend_after: chrono::Duration::seconds(config.suspend_after_secs as i64),
        completion_grace: chrono::Duration::seconds(config.completion_grace_secs as i64),
    };
    let extractor_for_manager = config.extract_event_datetime.then_some(datetime_extractor).flatten();
    let (manager_tx, archive_rx, manager_handle) =
        run_manager(manager_config, extractor_for_manager, capacity, counters.clone());
    let bridge_to_manager = tokio::spawn(forward(state_rx, manager_tx));

    let results_dir = PathBuf::from(config.results_dir);
    let archiver_handle = run_archiver(results_dir, archive_rx, counters);

    let outcome = ingest_handle.await.unwrap_or(IngestOutcome::AbruptClose);

    let _ = classify_handle.await;
    let _ = bridge_to_disentangler.await;
    let _ = disentangle_handle.await;
    let _ = bridge_to_manager.await;
    let _ = manager_handle.await;
    let _ = archiver_handle.await;

    info!(?outcome, "pipeline run finished");
    outcome
}

/// Pumps every item from `rx` into `tx`, exiting once `rx` is closed and
/// drained or `tx`'s peer has been dropped — the glue between a stage
/// whose channels are created by its own `run_*` constructor and the
/// next stage's equally self-contained constructor.
async fn forward<T: Send + 'static>(
    mut rx: tokio::sync::mpsc::Receiver<T>,
    tx: tokio::sync::mpsc::Sender<T>,
) {
    while let Some(item) = rx.recv().await {
        if tx.send(item).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    //! End-to-end scenarios E1-E6. The Ingestor needs a live websocket
    //! endpoint, so these tests exercise everything downstream of it
    //! directly: classify -> disentangle -> manage -> archive, feeding
    //! synthetic `Message`s in through the classifier stage exactly as
    //! the Ingestor would.

    use super::*;
    use chrono::{TimeZone, Utc};
    use threadline_clients::test_utils::{
        StubClassifier, StubContinuationLlm, StubDatetimeExtractor, StubEmbedder,
    };
    use threadline_core::types::Message;
    use tokio::sync::mpsc;

    fn msg(seqid: i64, secs: i64, user: &str, text: &str) -> Message {
        Message {
            seqid,
            ts: Utc.timestamp_opt(secs, 0).unwrap(),
            user: user.to_string(),
            text: text.to_string(),
        }
    }

    /// Runs `messages` through classify -> disentangle -> manage ->
    /// archive and returns whatever landed in the results directory.
    /// `archive_every` is set to the batch size, so the lifecycle
    /// evaluator runs exactly once, after every message in the batch
    /// has already been applied — independent of real wall-clock
    /// scheduling between messages. `suspend_after`/`completion_grace`
    /// are both zero, so that single pass suspends and completes every
    /// conversation still live at that point.
    async fn run_scenario(
        messages: Vec<Message>,
        continuation_option: i64,
    ) -> (PathBuf, Vec<std::fs::DirEntry>) {
        let dir = tempfile::tempdir().unwrap();
        let capacity = 64;
        let archive_every = messages.len() as u64;

        let classifier: Arc<dyn CalendarClassifier> = Arc::new(StubClassifier::always_positive());
        let llm = Arc::new(StubContinuationLlm::always_option(continuation_option));
        let fallback = RuleBasedClassifier::new(Arc::new(StubEmbedder));
        let continuation: Arc<dyn ContinuationClassifier> =
            Arc::new(LlmContinuationClassifier::new(llm, fallback));
        let datetime_extractor: Arc<dyn DatetimeExtractor> = Arc::new(StubDatetimeExtractor::none());

        let (msg_tx, msg_rx) = mpsc::channel(capacity);
        let (classified_tx, classified_rx) = mpsc::channel(capacity);
        let counters = Counters::new();
        let classify_handle = run_classifier(classifier, counters.clone(), msg_rx, classified_tx);

        let (disentangle_tx, state_rx, disentangle_handle) =
            run_disentangler(continuation, WINDOW_SIZE, capacity, counters.clone());
        let bridge1 = tokio::spawn(forward(classified_rx, disentangle_tx));

        let manager_config = ManagerConfig {
            archive_every,
            suspend_after: chrono::Duration::zero(),
            completion_grace: chrono::Duration::zero(),
        };
        let (manager_tx, archive_rx, manager_handle) =
            run_manager(manager_config, Some(datetime_extractor), capacity, counters.clone());
        let bridge2 = tokio::spawn(forward(state_rx, manager_tx));

        let archiver_handle = run_archiver(dir.path().to_path_buf(), archive_rx, counters);

        for m in messages {
            msg_tx.send(m).await.unwrap();
        }
        drop(msg_tx);

        classify_handle.await.unwrap();
        bridge1.await.unwrap();
        disentangle_handle.await.unwrap();
        bridge2.await.unwrap();
        manager_handle.await.unwrap();
        archiver_handle.await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        (dir.path().to_path_buf(), entries)
    }

    #[tokio::test]
    async fn e1_lone_positive_message_is_archived() {
        let messages = vec![msg(1, 0, "alice", "are we still meeting at 4pm?")];
        let (_dir, entries) = run_scenario(messages, -1).await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].file_name().to_string_lossy().starts_with("event_1_"));
    }

    #[tokio::test]
    async fn e2_direct_reply_joins_same_conversation() {
        let messages = vec![
            msg(1, 0, "alice", "are we still meeting at 4pm?"),
            msg(2, 5, "bob", "@alice yes, see you then"),
        ];
        let (_dir, entries) = run_scenario(messages, 1).await;
        // both lines land in one archived conversation.
        assert_eq!(entries.len(), 1);
        let body = std::fs::read_to_string(entries[0].path()).unwrap();
        assert!(body.contains("\"seqid\": 1"));
        assert!(body.contains("\"seqid\": 2"));
    }

    #[tokio::test]
    async fn e3_unrelated_chatter_creates_separate_conversations() {
        let messages = vec![
            msg(1, 0, "alice", "lunch at noon?"),
            msg(2, 1, "carol", "totally unrelated topic here"),
        ];
        let (_dir, entries) = run_scenario(messages, -1).await;
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn e6_flood_of_unrelated_messages_all_archived_without_loss() {
        // Scenario E6: a burst of unrelated messages through a
        // deliberately small bounded channel; every one of them must
        // still land as its own archived conversation, with none
        // dropped under back-pressure.
        let messages: Vec<Message> = (1..=30)
            .map(|seqid| msg(seqid, seqid, &format!("user{seqid}"), &format!("unrelated topic {seqid}")))
            .collect();
        let (_dir, entries) = run_scenario(messages, -1).await;
        assert_eq!(entries.len(), 30);
    }
}
