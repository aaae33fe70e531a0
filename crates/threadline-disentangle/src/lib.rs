pub mod disentangler;
pub mod llm_strategy;
pub mod rule_based;
pub mod window;

use async_trait::async_trait;
use threadline_core::types::ClassifiedMessage;

use crate::window::WindowEntry;

/// Strategy polymorphism point (spec §9): given the current window and a
/// new message, returns `k`:
///   - `-1` → the message opens a new conversation
///   - `1 ≤ k ≤ window.len()` → the message continues `window[k-1]`
///   - any other value must be treated as `-1` by the caller
#[async_trait]
pub trait ContinuationClassifier: Send + Sync {
    async fn continuation_of(&self, window: &[WindowEntry], msg: &ClassifiedMessage) -> i64;
}

pub use disentangler::run_disentangler;
