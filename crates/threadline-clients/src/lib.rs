pub mod backoff;
pub mod classifier;
pub mod embedding;
pub mod llm;
pub mod normalize;
pub mod test_utils;

pub use backoff::retry_with_backoff;
pub use classifier::{CalendarClassifier, HttpCalendarClassifier};
pub use embedding::{cosine_similarity, Embedder, HttpEmbedder};
pub use llm::{
    ContinuationLlm, ContinuationResponse, DatetimeExtractor, DatetimeResponse, HttpChatLlm,
};
