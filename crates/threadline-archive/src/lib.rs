//! The Archiver stage (spec §4.6): consumes completed conversations and
//! writes each as a JSON document under a configured results directory.
//! Writes are atomic relative to a reader (write to a temp file, then
//! rename) and retried with backoff on failure; after the retry budget
//! is exhausted the conversation is logged and dropped rather than
//! stalling the pipeline.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use threadline_core::error::{Result, ThreadlineError};
use threadline_core::metrics::Counters;
use threadline_core::types::Conversation;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Bounded retry budget for a single conversation's write, matching the
/// shared backoff constants `threadline-clients` uses for external calls.
const MAX_WRITE_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_MS: u64 = 200;
const BACKOFF_MAX_MS: u64 = 5000;

/// Spawn the Archiver as an independent task, consuming from `rx` until
/// the channel closes.
pub fn run_archiver(
    results_dir: PathBuf,
    mut rx: mpsc::Receiver<Conversation>,
    counters: Arc<Counters>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(dir = %results_dir.display(), "archiver started");
        while let Some(conv) = rx.recv().await {
            match archive_with_retry(&results_dir, &conv).await {
                Ok(()) => {
                    counters.conversations_stored.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!(
                        conv_id = %conv.id,
                        error = %e,
                        "exhausted retries archiving conversation, dropping"
                    );
                }
            }
        }
        info!("archiver drained input, exiting");
    })
}

async fn archive_with_retry(results_dir: &Path, conv: &Conversation) -> Result<()> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match archive_once(results_dir, conv).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= MAX_WRITE_ATTEMPTS => return Err(e),
            Err(e) => {
                let delay_ms = backoff_delay_ms(attempt);
                warn!(
                    conv_id = %conv.id,
                    attempt,
                    error = %e,
                    delay_ms,
                    "archive write failed, retrying"
                );
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

fn backoff_delay_ms(attempt: u32) -> u64 {
    let exp = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(16));
    exp.min(BACKOFF_MAX_MS)
}

/// Writes `conv` to `event_{first_seqid}_v2.json` under `results_dir`.
/// Serialises to a `.tmp` sibling first, then renames over the final
/// name — a reader can never observe a partially-written file, and
/// re-archiving the same conversation overwrites with identical bytes
/// (serde's field order is deterministic for a fixed struct layout).
async fn archive_once(results_dir: &Path, conv: &Conversation) -> Result<()> {
    tokio::fs::create_dir_all(results_dir)
        .await
        .map_err(ThreadlineError::Io)?;

    let final_path = results_dir.join(format!("event_{}_v2.json", conv.first_seqid()));
    let tmp_path = results_dir.join(format!("event_{}_v2.json.tmp", conv.first_seqid()));

    let body = serde_json::to_vec_pretty(conv).map_err(ThreadlineError::Serialization)?;

    tokio::fs::write(&tmp_path, &body)
        .await
        .map_err(ThreadlineError::Io)?;
    tokio::fs::rename(&tmp_path, &final_path)
        .await
        .map_err(ThreadlineError::Io)?;

    Ok(())
}
