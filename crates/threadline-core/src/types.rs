use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a [`Conversation`]. Fresh, random — conversations
/// have no externally-visible ordering requirement, unlike per-user session
/// keys elsewhere in this kind of system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single raw chat message as it arrives from the upstream feed.
///
/// `seqid` is monotonic but not guaranteed unique by the upstream source;
/// `ts` may arrive out of order relative to `seqid` (late messages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub seqid: i64,
    pub ts: DateTime<Utc>,
    pub user: String,
    /// Wire field name is `message`; kept as `text` internally to match
    /// the rest of this crate's naming.
    #[serde(rename = "message")]
    pub text: String,
}

/// Binary label returned by the external calendar classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalendarLabel {
    #[serde(rename = "LABEL_0")]
    Negative,
    #[serde(rename = "LABEL_1")]
    Positive,
}

impl CalendarLabel {
    pub fn is_positive(self) -> bool {
        matches!(self, CalendarLabel::Positive)
    }
}

/// A [`Message`] after the Calendar Classifier has scored it.
///
/// The original `text` is preserved unchanged; only the classifier sees
/// the normalised form (see `threadline-clients::normalize`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedMessage {
    pub seqid: i64,
    pub ts: DateTime<Utc>,
    pub user: String,
    pub text: String,
    pub label: CalendarLabel,
    pub score: f64,
}

impl ClassifiedMessage {
    pub fn from_message(msg: Message, label: CalendarLabel, score: f64) -> Self {
        Self {
            seqid: msg.seqid,
            ts: msg.ts,
            user: msg.user,
            text: msg.text,
            label,
            score,
        }
    }
}

/// A conversation being assembled by the Conversation Manager.
///
/// `lines` is append-only and stays in ingest order (not `ts` order — late
/// messages can have an earlier timestamp than lines already appended).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub lines: Vec<ClassifiedMessage>,
    pub users: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
    pub suspended: bool,
    pub completed: bool,
    pub event_datetime: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Construct a fresh conversation whose first line is `msg`.
    /// A `Conversation` can never exist with empty `lines` (spec §8).
    pub fn new(id: ConversationId, msg: ClassifiedMessage) -> Self {
        let mut users = BTreeSet::new();
        users.insert(msg.user.clone());
        let last_updated = msg.ts;
        Self {
            id,
            lines: vec![msg],
            users,
            last_updated,
            suspended: false,
            completed: false,
            event_datetime: None,
        }
    }

    /// Append `msg`, maintaining the `users` and `last_updated` invariants.
    pub fn push(&mut self, msg: ClassifiedMessage) {
        self.users.insert(msg.user.clone());
        if msg.ts > self.last_updated {
            self.last_updated = msg.ts;
        }
        self.lines.push(msg);
    }

    /// First line's seqid — used to name the archived JSON document.
    pub fn first_seqid(&self) -> i64 {
        // Safe: a Conversation is only ever constructed via `new`, which
        // always seeds `lines` with one element.
        self.lines[0].seqid
    }
}

/// Events produced by the Disentangler and consumed by the Conversation
/// Manager. A closed sum type — the manager pattern-matches on the tag,
/// no open inheritance needed (spec §9).
#[derive(Debug, Clone)]
pub enum StateEvent {
    CreateConversation {
        msg: ClassifiedMessage,
    },
    AddToConversation {
        msg: ClassifiedMessage,
        parent_seqid: i64,
    },
}
