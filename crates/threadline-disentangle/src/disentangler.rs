//! The Disentangler stage (spec §4.3): consumes classified messages in
//! receipt order, emits exactly one [`StateEvent`] per input, using a
//! pluggable [`ContinuationClassifier`] to decide whether each message
//! continues an existing conversation or opens a new one.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use threadline_core::metrics::Counters;
use threadline_core::types::{ClassifiedMessage, StateEvent};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::window::{SlidingWindow, WindowEntry};
use crate::ContinuationClassifier;

/// Spawn the Disentangler as an independent task. There is only ever one
/// Disentangler task (spec §5), so the window and the continuation
/// classifier are owned exclusively by this task — no locks needed.
pub fn run_disentangler(
    classifier: Arc<dyn ContinuationClassifier>,
    window_size: usize,
    channel_capacity: usize,
    counters: Arc<Counters>,
) -> (mpsc::Sender<ClassifiedMessage>, mpsc::Receiver<StateEvent>, tokio::task::JoinHandle<()>) {
    let (in_tx, in_rx) = mpsc::channel(channel_capacity);
    let (out_tx, out_rx) = mpsc::channel(channel_capacity);

    let handle = tokio::spawn(disentangler_loop(classifier, window_size, in_rx, out_tx, counters));

    (in_tx, out_rx, handle)
}

async fn disentangler_loop(
    classifier: Arc<dyn ContinuationClassifier>,
    window_size: usize,
    mut input: mpsc::Receiver<ClassifiedMessage>,
    output: mpsc::Sender<StateEvent>,
    counters: Arc<Counters>,
) {
    info!("disentangler started");
    let mut window = SlidingWindow::new(window_size);

    while let Some(msg) = input.recv().await {
        let event = decide(&mut window, &classifier, msg).await;
        counters.disentangled_messages.fetch_add(1, Ordering::Relaxed);

        if output.send(event).await.is_err() {
            debug!("state-event channel closed, stopping disentangler");
            break;
        }
    }
    info!("disentangler drained input, exiting");
}

async fn decide(
    window: &mut SlidingWindow,
    classifier: &Arc<dyn ContinuationClassifier>,
    msg: ClassifiedMessage,
) -> StateEvent {
    if window.is_empty() {
        let local_id = window.fresh_local_id();
        window.push(msg.clone(), local_id);
        return StateEvent::CreateConversation { msg };
    }

    let entries: Vec<WindowEntry> = window.entries().iter().cloned().collect();
    let k = classifier.continuation_of(&entries, &msg).await;

    let (event, local_id) = if (1..=entries.len() as i64).contains(&k) {
        let parent = &entries[(k - 1) as usize];
        let parent_seqid = parent.msg.seqid;
        let local_id = parent.local_conv_id;
        (
            StateEvent::AddToConversation {
                msg: msg.clone(),
                parent_seqid,
            },
            local_id,
        )
    } else {
        let local_id = window.fresh_local_id();
        (StateEvent::CreateConversation { msg: msg.clone() }, local_id)
    };

    window.push(msg, local_id);
    event
}
