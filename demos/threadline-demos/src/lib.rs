//! Synthetic chat frame generator, kept out of the core pipeline crates.
//!
//! `original_source/scripts/synthetic_data_generation.py` drove a chat
//! model to invent IRC-style scheduling conversations for manual testing.
//! This is a deterministic stand-in: no model call, just template
//! expansion over a small fixed set of intents/purposes/users, so it
//! needs no network access and produces the same output every run for a
//! given seed.

use chrono::{DateTime, Duration, Utc};
use threadline_core::types::Message;

const INTENTS: &[&str] = &[
    "get someone on a quick call to help out",
    "plan a meeting",
    "reschedule an existing meeting",
];

const USERS: &[&str] = &["hstefan", "e_t_", "flavio", "maribel", "quo"];

/// Generates `count` synthetic [`Message`]s starting at `start` and
/// `start_seqid`, cycling deterministically through [`INTENTS`] and
/// [`USERS`]. Messages are spaced a few seconds apart so the rule-based
/// time-proximity signal has something to react to.
pub fn generate(start_seqid: i64, start: DateTime<Utc>, count: usize) -> Vec<Message> {
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let intent = INTENTS[i % INTENTS.len()];
        let user = USERS[i % USERS.len()];
        let seqid = start_seqid + i as i64;
        let ts = start + Duration::seconds(i as i64 * 4);
        out.push(Message {
            seqid,
            ts,
            user: user.to_string(),
            text: format!("anyone free to {intent}? message #{i}"),
        });
    }
    out
}

/// Renders `messages` as newline-delimited JSON frames, the same shape
/// the Ingestor reads off the websocket feed.
pub fn to_ndjson(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| serde_json::to_string(m).expect("Message always serializes"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_deterministic() {
        let start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let a = generate(1, start, 5);
        let b = generate(1, start, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn seqids_are_sequential() {
        let start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let msgs = generate(100, start, 3);
        assert_eq!(
            msgs.iter().map(|m| m.seqid).collect::<Vec<_>>(),
            vec![100, 101, 102]
        );
    }

    #[test]
    fn ndjson_round_trips_through_message() {
        let start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let msgs = generate(1, start, 2);
        let rendered = to_ndjson(&msgs);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Message = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.seqid, 1);
    }
}
