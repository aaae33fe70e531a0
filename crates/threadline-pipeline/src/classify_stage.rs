//! Runs the Calendar Classifier (spec §4.2) as an independent stage task:
//! consumes raw [`Message`]s, calls the classifier with bounded retry,
//! and forwards the resulting [`ClassifiedMessage`]. A classifier that
//! keeps failing never drops the message — per spec §7's taxonomy, an
//! external-service failure degrades gracefully rather than losing input
//! — it forwards a conservative negative classification instead.

use std::sync::Arc;

use threadline_clients::{retry_with_backoff, CalendarClassifier};
use threadline_core::metrics::Counters;
use threadline_core::types::{CalendarLabel, ClassifiedMessage, Message};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const MAX_CLASSIFY_ATTEMPTS: u32 = 3;

pub fn run_classifier(
    classifier: Arc<dyn CalendarClassifier>,
    counters: Arc<Counters>,
    mut input: mpsc::Receiver<Message>,
    output: mpsc::Sender<ClassifiedMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("calendar classifier started");
        while let Some(msg) = input.recv().await {
            let seqid = msg.seqid;
            let classified = classify_with_retry(&classifier, msg).await;
            counters
                .messages_classified
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            if output.send(classified).await.is_err() {
                debug!(seqid, "classified-message channel closed, stopping classifier");
                break;
            }
        }
        info!("calendar classifier drained input, exiting");
    })
}

async fn classify_with_retry(
    classifier: &Arc<dyn CalendarClassifier>,
    msg: Message,
) -> ClassifiedMessage {
    let seqid = msg.seqid;
    let result = retry_with_backoff("calendar_classify", MAX_CLASSIFY_ATTEMPTS, || {
        let classifier = Arc::clone(classifier);
        let msg = msg.clone();
        async move { classifier.classify(msg).await }
    })
    .await;

    match result {
        Ok(classified) => classified,
        Err(e) => {
            warn!(seqid, error = %e, "classifier exhausted retries, forwarding as negative");
            error!(seqid, "calendar classification degraded to default negative label");
            ClassifiedMessage::from_message(msg, CalendarLabel::Negative, 0.0)
        }
    }
}
