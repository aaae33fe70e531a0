//! Per-stage progress counters, the `tracing`-based replacement for
//! `original_source/src/pipeline/async_client.py`'s tqdm meters — there's
//! no TUI dependency anywhere in the teacher's non-interactive crates, so
//! this surfaces as a periodic `info!` summary line instead of a widget.
//!
//! Lives in `threadline-core` rather than the `threadline-pipeline`
//! binary crate so every stage crate (`threadline-ingest`,
//! `threadline-disentangle`, `threadline-conversation`,
//! `threadline-archive`) can hold an `Arc<Counters>` and increment its
//! own field without a dependency edge back onto the binary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

#[derive(Default)]
pub struct Counters {
    pub incoming_messages: AtomicU64,
    pub messages_classified: AtomicU64,
    pub disentangled_messages: AtomicU64,
    pub conversations_created: AtomicU64,
    pub conversations_completed: AtomicU64,
    pub conversations_stored: AtomicU64,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn snapshot_line(&self) -> String {
        format!(
            "incoming={} classified={} disentangled={} created={} completed={} stored={}",
            self.incoming_messages.load(Ordering::Relaxed),
            self.messages_classified.load(Ordering::Relaxed),
            self.disentangled_messages.load(Ordering::Relaxed),
            self.conversations_created.load(Ordering::Relaxed),
            self.conversations_completed.load(Ordering::Relaxed),
            self.conversations_stored.load(Ordering::Relaxed),
        )
    }
}

/// Spawns a task that logs a counters snapshot every `period` until
/// `shutdown` is signalled.
pub fn spawn_reporter(
    counters: Arc<Counters>,
    period: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    info!("{}", counters.snapshot_line());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("{}", counters.snapshot_line());
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_line_reflects_counter_state() {
        let counters = Counters::new();
        counters.incoming_messages.fetch_add(3, Ordering::Relaxed);
        counters.conversations_created.fetch_add(1, Ordering::Relaxed);
        let line = counters.snapshot_line();
        assert!(line.contains("incoming=3"));
        assert!(line.contains("created=1"));
    }
}
