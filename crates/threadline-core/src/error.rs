use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreadlineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed upstream frame: {0}")]
    MalformedFrame(String),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("archive write failed for conversation {conv_id}: {reason}")]
    ArchiveWrite { conv_id: String, reason: String },

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A programming invariant was violated (unknown event kind, an
    /// inconsistent SeqIndex, ...). Per spec this is fatal: it must
    /// propagate to the top and terminate the process with a
    /// distinguished exit code after flushing channels.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl ThreadlineError {
    /// Short machine-readable code, useful in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ThreadlineError::Config(_) => "CONFIG_ERROR",
            ThreadlineError::MalformedFrame(_) => "MALFORMED_FRAME",
            ThreadlineError::Classifier(_) => "CLASSIFIER_ERROR",
            ThreadlineError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            ThreadlineError::Embedding(_) => "EMBEDDING_ERROR",
            ThreadlineError::ArchiveWrite { .. } => "ARCHIVE_WRITE_FAILED",
            ThreadlineError::Timeout { .. } => "TIMEOUT",
            ThreadlineError::Serialization(_) => "SERIALIZATION_ERROR",
            ThreadlineError::Io(_) => "IO_ERROR",
            ThreadlineError::Invariant(_) => "INVARIANT_VIOLATION",
        }
    }

    /// True for the taxonomy-5 "programming invariant violation" class
    /// that must terminate the process (§7 of the spec).
    pub fn is_fatal(&self) -> bool {
        matches!(self, ThreadlineError::Invariant(_))
    }
}

pub type Result<T> = std::result::Result<T, ThreadlineError>;
