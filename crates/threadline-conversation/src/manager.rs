//! Conversation Manager (spec §4.4): the sole mutator of Conversation
//! state. Consumes [`StateEvent`]s serially from its input channel —
//! serial consumption is itself the linearisation point (spec §5), no
//! lock needed.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use threadline_clients::llm::DatetimeExtractor;
use threadline_core::metrics::Counters;
use threadline_core::types::{Conversation, ConversationId, StateEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::lifecycle::evaluate;
use crate::seq_index::SeqIndex;

/// Tunables the manager needs beyond the channels themselves.
pub struct ManagerConfig {
    pub archive_every: u64,
    pub suspend_after: chrono::Duration,
    pub completion_grace: chrono::Duration,
}

/// Spawn the Conversation Manager (+ embedded Lifecycle Evaluator) as an
/// independent task. Completed conversations are sent on `archive_tx`.
pub fn run_manager(
    config: ManagerConfig,
    datetime_extractor: Option<Arc<dyn DatetimeExtractor>>,
    channel_capacity: usize,
    counters: Arc<Counters>,
) -> (
    mpsc::Sender<StateEvent>,
    mpsc::Receiver<Conversation>,
    tokio::task::JoinHandle<()>,
) {
    let (in_tx, in_rx) = mpsc::channel(channel_capacity);
    let (archive_tx, archive_rx) = mpsc::channel(channel_capacity);

    let handle = tokio::spawn(manager_loop(config, datetime_extractor, in_rx, archive_tx, counters));

    (in_tx, archive_rx, handle)
}

async fn manager_loop(
    config: ManagerConfig,
    datetime_extractor: Option<Arc<dyn DatetimeExtractor>>,
    mut input: mpsc::Receiver<StateEvent>,
    archive_tx: mpsc::Sender<Conversation>,
    counters: Arc<Counters>,
) {
    info!("conversation manager started");
    let mut conversations: HashMap<ConversationId, Conversation> = HashMap::new();
    let mut seq_index = SeqIndex::new();
    let mut events_since_eval: u64 = 0;

    while let Some(event) = input.recv().await {
        apply_event(&mut conversations, &mut seq_index, event, &counters);
        events_since_eval += 1;

        if events_since_eval >= config.archive_every {
            events_since_eval = 0;
            run_lifecycle_pass(
                &config,
                datetime_extractor.as_ref(),
                &mut conversations,
                &mut seq_index,
                &archive_tx,
                &counters,
            )
            .await;
        }
    }

    // Drain: run a final pass so conversations aging out right at
    // shutdown still get a chance to flush, then close the archive
    // channel by dropping it (handled by the function returning).
    run_lifecycle_pass(
        &config,
        datetime_extractor.as_ref(),
        &mut conversations,
        &mut seq_index,
        &archive_tx,
        &counters,
    )
    .await;
    info!(live = conversations.len(), "conversation manager exiting");
}

/// Applies a single [`StateEvent`] to the live conversation set and its
/// [`SeqIndex`] (spec §4.4). This match is exhaustive over a closed sum
/// type, so there is no "unknown event kind" arm to write.
fn apply_event(
    conversations: &mut HashMap<ConversationId, Conversation>,
    seq_index: &mut SeqIndex,
    event: StateEvent,
    counters: &Counters,
) {
    match event {
        StateEvent::CreateConversation { msg } => {
            let id = ConversationId::new();
            let seqid = msg.seqid;
            debug!(conv_id = %id, seqid, "creating conversation");
            seq_index.insert(seqid, id.clone());
            conversations.insert(id.clone(), Conversation::new(id, msg));
            counters.conversations_created.fetch_add(1, Ordering::Relaxed);
        }
        StateEvent::AddToConversation { msg, parent_seqid } => {
            match seq_index.get(parent_seqid).cloned() {
                Some(id) => {
                    if let Some(conv) = conversations.get_mut(&id) {
                        let tail_preview: Vec<&str> = conv
                            .lines
                            .iter()
                            .rev()
                            .take(2)
                            .map(|m| m.text.as_str())
                            .collect();
                        debug!(conv_id = %id, ?tail_preview, "appending to matched conversation");
                        seq_index.insert(msg.seqid, id.clone());
                        conv.push(msg);
                    } else {
                        // SeqIndex points at a conversation no longer live
                        // (already archived). Degrade to create, same as
                        // a missing parent lookup.
                        warn!(parent_seqid, "parent conversation no longer live, degrading to create");
                        create_from_orphan(conversations, seq_index, msg, counters);
                    }
                }
                None => {
                    debug!(parent_seqid, "parent not found, degrading to create");
                    create_from_orphan(conversations, seq_index, msg, counters);
                }
            }
        }
    }
}

fn create_from_orphan(
    conversations: &mut HashMap<ConversationId, Conversation>,
    seq_index: &mut SeqIndex,
    msg: threadline_core::types::ClassifiedMessage,
    counters: &Counters,
) {
    let id = ConversationId::new();
    seq_index.insert(msg.seqid, id.clone());
    conversations.insert(id.clone(), Conversation::new(id, msg));
    counters.conversations_created.fetch_add(1, Ordering::Relaxed);
}

async fn run_lifecycle_pass(
    config: &ManagerConfig,
    datetime_extractor: Option<&Arc<dyn DatetimeExtractor>>,
    conversations: &mut HashMap<ConversationId, Conversation>,
    seq_index: &mut SeqIndex,
    archive_tx: &mpsc::Sender<Conversation>,
    counters: &Counters,
) {
    let now = chrono::Utc::now();
    let outcome = evaluate(
        now,
        conversations,
        config.suspend_after,
        config.completion_grace,
        datetime_extractor,
    )
    .await;

    for id in outcome.completed {
        if let Some(conv) = conversations.remove(&id) {
            seq_index.remove_conversation(&id);
            counters.conversations_completed.fetch_add(1, Ordering::Relaxed);
            if archive_tx.send(conv).await.is_err() {
                debug!("archive channel closed, stopping lifecycle handoff");
                break;
            }
        }
    }
}
