use std::collections::VecDeque;

use threadline_core::types::ClassifiedMessage;

/// Local, Disentangler-only grouping id. This is NOT the authoritative
/// [`threadline_core::types::ConversationId`] minted by the Conversation
/// Manager — the Disentangler never sees that id. It is a cheap local
/// heuristic so the rule-based strategy (spec §4.3) can group the six
/// windowed messages into candidate "conversations so far" without
/// reaching into the Manager's owned state (spec §5: no component
/// touches another component's internal state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalConvId(pub u64);

#[derive(Debug, Clone)]
pub struct WindowEntry {
    pub msg: ClassifiedMessage,
    pub local_conv_id: LocalConvId,
}

/// Bounded sliding window of the N most-recently-seen classified messages
/// (spec §4.3: N = 6). The head is evicted once the window exceeds
/// capacity.
pub struct SlidingWindow {
    capacity: usize,
    entries: VecDeque<WindowEntry>,
    next_local_id: u64,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            next_local_id: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &VecDeque<WindowEntry> {
        &self.entries
    }

    /// Mint a fresh local conversation id for a `CreateConversation` decision.
    pub fn fresh_local_id(&mut self) -> LocalConvId {
        let id = LocalConvId(self.next_local_id);
        self.next_local_id += 1;
        id
    }

    /// Append `msg` tagged with `local_conv_id`, evicting the oldest entry
    /// if the window is now over capacity.
    pub fn push(&mut self, msg: ClassifiedMessage, local_conv_id: LocalConvId) {
        self.entries.push_back(WindowEntry { msg, local_conv_id });
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// 1-based window index of the entry with the given seqid, if present.
    pub fn index_of_seqid(&self, seqid: i64) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.msg.seqid == seqid)
            .map(|i| i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use threadline_core::types::CalendarLabel;

    fn msg(seqid: i64) -> ClassifiedMessage {
        ClassifiedMessage {
            seqid,
            ts: Utc::now(),
            user: "alice".to_string(),
            text: "hi".to_string(),
            label: CalendarLabel::Positive,
            score: 0.9,
        }
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut w = SlidingWindow::new(6);
        for i in 1..=7 {
            let id = w.fresh_local_id();
            w.push(msg(i), id);
        }
        assert_eq!(w.len(), 6);
        // seqid 1 was evicted, seqid 2 is now the oldest.
        assert!(w.index_of_seqid(1).is_none());
        assert_eq!(w.index_of_seqid(2), Some(1));
        assert_eq!(w.index_of_seqid(7), Some(6));
    }

    #[test]
    fn fresh_local_ids_are_distinct() {
        let mut w = SlidingWindow::new(6);
        let a = w.fresh_local_id();
        let b = w.fresh_local_id();
        assert_ne!(a, b);
    }
}
