use std::collections::HashMap;

use threadline_core::types::ConversationId;

/// Secondary lookup table mapping a message's `seqid` to the conversation
/// that owns it. Not owned by [`threadline_core::types::Conversation`] —
/// it's a derived index the Conversation Manager maintains in lockstep
/// with its mutations (spec §9: "rebuildable from live Conversations if
/// desired").
#[derive(Debug, Default)]
pub struct SeqIndex {
    table: HashMap<i64, ConversationId>,
}

impl SeqIndex {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn get(&self, seqid: i64) -> Option<&ConversationId> {
        self.table.get(&seqid)
    }

    pub fn insert(&mut self, seqid: i64, conv_id: ConversationId) {
        self.table.insert(seqid, conv_id);
    }

    pub fn remove(&mut self, seqid: i64) {
        self.table.remove(&seqid);
    }

    /// Drop every entry pointing at `conv_id` — used when a conversation
    /// is archived and leaves live state (spec §3: the index tracks only
    /// live conversations' membership).
    pub fn remove_conversation(&mut self, conv_id: &ConversationId) {
        self.table.retain(|_, v| v != conv_id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let mut idx = SeqIndex::new();
        let conv_id = ConversationId::new();
        idx.insert(1, conv_id.clone());
        assert_eq!(idx.get(1), Some(&conv_id));
        assert_eq!(idx.get(2), None);
    }

    #[test]
    fn remove_conversation_drops_all_its_seqids() {
        let mut idx = SeqIndex::new();
        let a = ConversationId::new();
        let b = ConversationId::new();
        idx.insert(1, a.clone());
        idx.insert(2, a.clone());
        idx.insert(3, b.clone());
        idx.remove_conversation(&a);
        assert_eq!(idx.get(1), None);
        assert_eq!(idx.get(2), None);
        assert_eq!(idx.get(3), Some(&b));
        assert_eq!(idx.len(), 1);
    }
}
