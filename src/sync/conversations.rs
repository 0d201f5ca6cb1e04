use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::api::models::Conversation;

/// Fields a live message may change on its conversation. Absent fields keep
/// the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityPatch {
    pub last_message: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub unread_increment: u32,
}

/// Ordered conversation summaries, one entry per id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationStore {
    items: Vec<Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the server's order as-is. Repeated ids keep their first occurrence.
    pub fn replace_all(&mut self, list: Vec<Conversation>) {
        let mut seen = HashSet::with_capacity(list.len());
        self.items = list
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .collect();
    }

    /// Appends an older page. Ids already present keep their existing entry.
    /// Returns how many entries were actually added.
    pub fn append_older(&mut self, list: Vec<Conversation>) -> usize {
        let mut seen: HashSet<String> = self.items.iter().map(|c| c.id.clone()).collect();
        let before = self.items.len();
        for conv in list {
            if seen.insert(conv.id.clone()) {
                self.items.push(conv);
            } else {
                log::debug!("conversation {} already listed, keeping existing entry", conv.id);
            }
        }
        self.items.len() - before
    }

    /// Merges `patch` into a known conversation and moves it to the front.
    /// Unknown ids are ignored; the list never invents conversations.
    pub fn upsert_on_activity(&mut self, conversation_id: &str, patch: &ActivityPatch) -> bool {
        let Some(idx) = self.items.iter().position(|c| c.id == conversation_id) else {
            return false;
        };
        let mut conv = self.items.remove(idx);
        if let Some(last) = &patch.last_message {
            conv.last_message = last.clone();
        }
        if let Some(at) = patch.updated_at {
            conv.updated_at = Some(at);
        }
        conv.unread_count = conv.unread_count.saturating_add(patch.unread_increment);
        self.items.insert(0, conv);
        true
    }

    pub fn mark_read(&mut self, conversation_id: &str) -> bool {
        match self.items.iter_mut().find(|c| c.id == conversation_id) {
            Some(conv) if conv.unread_count > 0 => {
                conv.unread_count = 0;
                true
            }
            _ => false,
        }
    }

    pub fn select_by_id(&self, conversation_id: &str) -> Option<&Conversation> {
        self.items.iter().find(|c| c.id == conversation_id)
    }

    pub fn as_slice(&self) -> &[Conversation] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Conversation> {
        self.items.clone()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
