//! Rule-based continuation strategy (spec §4.3). Scores candidate
//! "conversations so far" — reconstructed from the sliding window by
//! grouping entries that share a [`LocalConvId`] — against the incoming
//! message using four weighted signals, and picks the top-scoring match.
//!
//! This is the spec's required fallback when the LLM strategy fails
//! twice, and may also be used as the primary strategy.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use threadline_clients::embedding::{cosine_similarity, Embedder};
use threadline_core::types::ClassifiedMessage;

use crate::window::{LocalConvId, WindowEntry};
use crate::ContinuationClassifier;

fn mention_pattern() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)@(\w+)").unwrap())
}

/// A reconstructed view of one candidate conversation, derived purely
/// from the entries currently in the window that share a local id.
struct ConversationView {
    users: BTreeSet<String>,
    last_updated: DateTime<Utc>,
    concatenated_text: String,
    /// 1-based window index of this view's most recently appended entry —
    /// this is what gets returned as `k` when this view wins.
    last_window_index: usize,
}

fn group_window(window: &[WindowEntry]) -> Vec<ConversationView> {
    let mut views: Vec<(LocalConvId, ConversationView)> = Vec::new();

    for (idx, entry) in window.iter().enumerate() {
        let window_index = idx + 1; // 1-based, per spec's k contract
        if let Some((_, view)) = views.iter_mut().find(|(id, _)| *id == entry.local_conv_id) {
            view.users.insert(entry.msg.user.clone());
            if entry.msg.ts > view.last_updated {
                view.last_updated = entry.msg.ts;
            }
            view.concatenated_text.push(' ');
            view.concatenated_text.push_str(&entry.msg.text);
            view.last_window_index = window_index;
        } else {
            let mut users = BTreeSet::new();
            users.insert(entry.msg.user.clone());
            views.push((
                entry.local_conv_id,
                ConversationView {
                    users,
                    last_updated: entry.msg.ts,
                    concatenated_text: entry.msg.text.clone(),
                    last_window_index: window_index,
                },
            ));
        }
    }

    views.into_iter().map(|(_, v)| v).collect()
}

/// `(reply, time_proximity, same_author, semantic)` weighted signal
/// scores plus the raw total used for ranking matches.
struct Scores {
    reply: f64,
    time_proximity: f64,
    same_author: bool,
    semantic: f64,
    matched: bool,
}

/// Time-proximity score: 1.0 at Δ = 0, decays linearly to 0.0 at Δ ≥ 30s.
/// Monotonically non-increasing in Δ (spec §8 algebraic property).
pub fn time_proximity_score(delta_secs: f64) -> f64 {
    ((30.0 - delta_secs) / 30.0).max(0.0)
}

fn reply_score(message_text: &str, users: &BTreeSet<String>) -> f64 {
    let mentioned: BTreeSet<String> = mention_pattern()
        .captures_iter(message_text)
        .map(|c| c[1].to_lowercase())
        .collect();
    let users_lower: BTreeSet<String> = users.iter().map(|u| u.to_lowercase()).collect();
    if mentioned.intersection(&users_lower).next().is_some() {
        1.0
    } else {
        0.0
    }
}

async fn score_view(
    view: &ConversationView,
    msg: &ClassifiedMessage,
    embedder: &dyn Embedder,
) -> Scores {
    let delta_secs = (msg.ts - view.last_updated).num_milliseconds() as f64 / 1000.0;
    let delta_secs = delta_secs.max(0.0);

    let reply = reply_score(&msg.text, &view.users);

    let same_author = view.users.contains(&msg.user) && delta_secs < 5.0;

    let time_proximity = time_proximity_score(delta_secs);

    let semantic = match (
        embedder.embed(&msg.text).await,
        embedder.embed(&view.concatenated_text).await,
    ) {
        (Ok(a), Ok(b)) => {
            let sim = cosine_similarity(&a, &b);
            if sim > 0.6 && delta_secs < 30.0 {
                sim
            } else {
                0.0
            }
        }
        _ => 0.0,
    };

    let matched = reply == 1.0 || semantic > 0.0 || same_author;

    Scores {
        reply,
        time_proximity,
        same_author,
        semantic,
        matched,
    }
}

impl Scores {
    /// Weighted total: reply(1.0) + time_proximity(1.0) + same_author(1.0)
    /// + semantic(0.7), used only to rank matching conversations against
    /// each other (never to decide whether a match occurred at all).
    fn weighted_total(&self) -> f64 {
        self.reply
            + self.time_proximity
            + if self.same_author { 1.0 } else { 0.0 }
            + self.semantic * 0.7
    }
}

/// Rule-based continuation classifier: four weighted signals, scored
/// against every conversation represented in the window.
pub struct RuleBasedClassifier {
    embedder: Arc<dyn Embedder>,
}

impl RuleBasedClassifier {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl ContinuationClassifier for RuleBasedClassifier {
    async fn continuation_of(&self, window: &[WindowEntry], msg: &ClassifiedMessage) -> i64 {
        let views = group_window(window);

        let mut best: Option<(f64, DateTime<Utc>, usize)> = None;
        for view in &views {
            let scores = score_view(view, msg, self.embedder.as_ref()).await;
            if !scores.matched {
                continue;
            }
            let total = scores.weighted_total();
            let candidate = (total, view.last_updated, view.last_window_index);
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    // Higher score wins; ties broken by most-recently-updated.
                    if candidate.0 > current.0
                        || (candidate.0 == current.0 && candidate.1 > current.1)
                    {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }

        match best {
            Some((_, _, window_index)) => window_index as i64,
            None => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use threadline_clients::test_utils::StubEmbedder;
    use threadline_core::types::CalendarLabel;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn entry(seqid: i64, secs: i64, user: &str, text: &str, conv: LocalConvId) -> WindowEntry {
        WindowEntry {
            msg: ClassifiedMessage {
                seqid,
                ts: ts(secs),
                user: user.to_string(),
                text: text.to_string(),
                label: CalendarLabel::Positive,
                score: 0.9,
            },
            local_conv_id: conv,
        }
    }

    fn new_msg(seqid: i64, secs: i64, user: &str, text: &str) -> ClassifiedMessage {
        ClassifiedMessage {
            seqid,
            ts: ts(secs),
            user: user.to_string(),
            text: text.to_string(),
            label: CalendarLabel::Positive,
            score: 0.9,
        }
    }

    #[test]
    fn time_proximity_is_one_at_zero_and_zero_at_30() {
        assert!((time_proximity_score(0.0) - 1.0).abs() < 1e-9);
        assert_eq!(time_proximity_score(30.0), 0.0);
        assert_eq!(time_proximity_score(45.0), 0.0);
    }

    #[test]
    fn time_proximity_is_monotonically_non_increasing() {
        let samples: Vec<f64> = (0..=35).map(|s| time_proximity_score(s as f64)).collect();
        for w in samples.windows(2) {
            assert!(w[1] <= w[0]);
        }
    }

    #[tokio::test]
    async fn reply_mention_matches_regardless_of_time() {
        let classifier = RuleBasedClassifier::new(Arc::new(StubEmbedder));
        let window = vec![entry(1, 0, "alice", "call at 4pm?", LocalConvId(0))];
        let msg = new_msg(2, 10_000, "bob", "@alice sounds good");
        let k = classifier.continuation_of(&window, &msg).await;
        assert_eq!(k, 1);
    }

    #[tokio::test]
    async fn same_author_within_5s_matches() {
        let classifier = RuleBasedClassifier::new(Arc::new(StubEmbedder));
        let window = vec![entry(1, 100, "alice", "first part", LocalConvId(0))];
        let msg = new_msg(2, 103, "alice", "second part unrelated text");
        let k = classifier.continuation_of(&window, &msg).await;
        assert_eq!(k, 1);
    }

    #[tokio::test]
    async fn same_author_beyond_5s_does_not_match_alone() {
        let classifier = RuleBasedClassifier::new(Arc::new(StubEmbedder));
        let window = vec![entry(1, 100, "alice", "xyz completely different", LocalConvId(0))];
        let msg = new_msg(2, 110, "alice", "qqq nothing similar at all");
        let k = classifier.continuation_of(&window, &msg).await;
        assert_eq!(k, -1);
    }

    #[tokio::test]
    async fn no_match_creates_new_conversation() {
        let classifier = RuleBasedClassifier::new(Arc::new(StubEmbedder));
        let window = vec![entry(1, 0, "alice", "meet tomorrow?", LocalConvId(0))];
        let msg = new_msg(2, 1, "carol", "anyone know a good pizza place");
        let k = classifier.continuation_of(&window, &msg).await;
        assert_eq!(k, -1);
    }
}
