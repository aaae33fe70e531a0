use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ThreadlineError};

/// Sliding-window size the Disentangler keeps for the LLM continuation
/// strategy (spec §4.3: N = 6).
pub const WINDOW_SIZE: usize = 6;
/// Default external-call timeout (classifier / LLM / embedding), spec §5.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
/// Bounded channel capacity shared by all four inter-stage channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Top-level pipeline configuration (TOML file + raw environment
/// overrides, matching the wire names spec.md §6 mandates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upstream websocket feed URL. Required — `WS_SOCK`.
    pub ws_sock: String,
    /// Output directory for archived conversations. `RESULTS_DIR`.
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    /// Inactivity threshold before a conversation is suspended.
    /// `SUSPEND_AFTER_SECS`.
    #[serde(default = "default_suspend_after_secs")]
    pub suspend_after_secs: u64,
    /// How many state events the Conversation Manager processes between
    /// lifecycle evaluation passes. `ARCHIVE_EVERY`.
    #[serde(default = "default_archive_every")]
    pub archive_every: u64,
    /// Additional grace period after suspension before forcing completion
    /// when no event datetime was extracted (spec §9 Open Question #2).
    #[serde(default = "default_completion_grace_secs")]
    pub completion_grace_secs: u64,
    /// Capacity of each bounded inter-stage channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Timeout applied to every external-service call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Optional confidence gate on the calendar classifier (spec §9 Open
    /// Question #1). `None` means the unconditional path spec.md adopts.
    #[serde(default)]
    pub min_confidence: Option<f64>,
    /// Whether lifecycle evaluation should attempt datetime extraction at
    /// all (the external LLM call is optional per spec §4.5).
    #[serde(default = "bool_true")]
    pub extract_event_datetime: bool,
    /// Calendar classifier HTTP endpoint. `CLASSIFIER_ENDPOINT`.
    #[serde(default = "default_classifier_endpoint")]
    pub classifier_endpoint: String,
    /// Continuation/datetime chat model HTTP endpoint. `LLM_ENDPOINT`.
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,
    /// Chat model name passed in the request body. `LLM_MODEL`.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    /// Embedding model HTTP endpoint. `EMBEDDING_ENDPOINT`.
    #[serde(default = "default_embedding_endpoint")]
    pub embedding_endpoint: String,
}

fn bool_true() -> bool {
    true
}
fn default_results_dir() -> String {
    "results/".to_string()
}
fn default_suspend_after_secs() -> u64 {
    30
}
fn default_archive_every() -> u64 {
    10
}
fn default_completion_grace_secs() -> u64 {
    30
}
fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}
fn default_classifier_endpoint() -> String {
    "http://localhost:8000/classify".to_string()
}
fn default_llm_endpoint() -> String {
    "http://localhost:11434/api/chat".to_string()
}
fn default_llm_model() -> String {
    "qwen2.5-coder:32b".to_string()
}
fn default_embedding_endpoint() -> String {
    "http://localhost:11434/api/embed".to_string()
}

impl PipelineConfig {
    /// Load configuration from an optional TOML file merged with raw
    /// environment variables (`WS_SOCK`, `RESULTS_DIR`, ...). Env vars
    /// always win over the file, matching the teacher's figment layering.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::raw());

        let config: Self = figment
            .extract()
            .map_err(|e| ThreadlineError::Config(e.to_string()))?;

        if config.ws_sock.trim().is_empty() {
            return Err(ThreadlineError::Config(
                "WS_SOCK must be set to the upstream feed URL".to_string(),
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fails_without_ws_sock() {
        // No env vars set (and no file) — figment will fail to extract
        // the required `ws_sock` field or we reject an empty one.
        // SAFETY: test-local env mutation, no other test reads WS_SOCK.
        std::env::remove_var("WS_SOCK");
        let result = PipelineConfig::load(None);
        assert!(result.is_err());
    }

    #[test]
    fn load_picks_up_ws_sock_from_env() {
        std::env::set_var("WS_SOCK", "ws://localhost:9001/feed");
        let cfg = PipelineConfig::load(None).expect("config should load");
        assert_eq!(cfg.ws_sock, "ws://localhost:9001/feed");
        assert_eq!(cfg.results_dir, "results/");
        assert_eq!(cfg.suspend_after_secs, 30);
        std::env::remove_var("WS_SOCK");
    }
}
