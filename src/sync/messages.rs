use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::models::{Delivery, Message};

const LOCAL_ID_PREFIX: &str = "local-";

/// What `reconcile`/`confirm` did with a server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// New message, inserted in `created_at` order (normally the tail).
    Appended,
    /// Replaced the optimistic entry `temp_id` in place.
    Confirmed { temp_id: String },
    /// Already in the log; nothing changed (or a leftover placeholder was dropped).
    Duplicate,
}

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Message log of one conversation, ascending by `created_at`, unique by id.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    items: Vec<Message>,
    ids: HashSet<String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a fresh page. The server's order is not trusted: entries are
    /// stable-sorted by `created_at`, so equal timestamps keep arrival order.
    pub fn replace_all(&mut self, list: Vec<Message>) {
        self.clear();
        for msg in list {
            if self.ids.insert(msg.id.clone()) {
                self.items.push(msg);
            }
        }
        self.items.sort_by_key(|m| m.created_at);
    }

    /// Puts an older page in front of the current head without re-sorting.
    /// Offset pagination shifts when new messages arrive, so ids already
    /// present are skipped. Returns how many entries were added.
    pub fn prepend_older(&mut self, list: Vec<Message>) -> usize {
        let mut older = Vec::with_capacity(list.len());
        for msg in list {
            if self.ids.insert(msg.id.clone()) {
                older.push(msg);
            } else {
                log::debug!("older page repeats message {}, skipping", msg.id);
            }
        }
        older.sort_by_key(|m| m.created_at);
        let added = older.len();
        older.append(&mut self.items);
        self.items = older;
        added
    }

    /// Optimistic send. Returns the temporary id.
    pub fn append_local(
        &mut self,
        conversation_id: &str,
        body: &str,
        sender_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> String {
        let temp_id = format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4());
        self.ids.insert(temp_id.clone());
        self.items.push(Message {
            id: temp_id.clone(),
            conversation_id: conversation_id.to_string(),
            body: body.to_string(),
            created_at: now,
            is_own: true,
            sender_id: sender_id.map(str::to_string),
            is_typing: false,
            delivery: Delivery::Pending,
        });
        temp_id
    }

    /// Inserts after every entry with an equal or earlier `created_at`.
    fn insert_sorted(&mut self, msg: Message) {
        let at = self.items.partition_point(|m| m.created_at <= msg.created_at);
        self.items.insert(at, msg);
    }

    /// An echo without a timestamp keeps the placeholder's local time; one
    /// with a timestamp moves the entry to where that time sorts.
    fn replace_placeholder(&mut self, idx: usize, server: Message) -> Reconciled {
        let mut entry = self.items.remove(idx);
        let temp_id = std::mem::replace(&mut entry.id, server.id.clone());
        if server.created_at != DateTime::<Utc>::UNIX_EPOCH {
            entry.created_at = server.created_at;
        }
        entry.body = server.body;
        if server.sender_id.is_some() {
            entry.sender_id = server.sender_id;
        }
        entry.delivery = Delivery::Sent;
        self.ids.remove(&temp_id);
        self.ids.insert(server.id);
        self.insert_sorted(entry);
        Reconciled::Confirmed { temp_id }
    }

    /// Applies a server message from any channel (push event or send echo).
    ///
    /// A known id is a duplicate delivery and changes nothing. An own message
    /// confirms the most recent unconfirmed placeholder with the same body;
    /// anything else is appended.
    pub fn reconcile(&mut self, server: Message) -> Reconciled {
        if self.ids.contains(&server.id) {
            log::debug!("duplicate delivery of message {}", server.id);
            return Reconciled::Duplicate;
        }
        if server.is_own {
            let placeholder = self
                .items
                .iter()
                .rposition(|m| m.is_own && m.is_pending() && m.body == server.body);
            if let Some(idx) = placeholder {
                return self.replace_placeholder(idx, server);
            }
        }
        self.ids.insert(server.id.clone());
        self.insert_sorted(server);
        Reconciled::Appended
    }

    /// Applies the echo of a send we know the placeholder for.
    pub fn confirm(&mut self, temp_id: &str, server: Message) -> Reconciled {
        let idx = self.items.iter().position(|m| m.id == temp_id);
        if self.ids.contains(&server.id) {
            // The push echo got here first; drop the placeholder if it survived.
            if let Some(idx) = idx {
                self.items.remove(idx);
                self.ids.remove(temp_id);
            }
            return Reconciled::Duplicate;
        }
        match idx {
            Some(idx) => self.replace_placeholder(idx, server),
            None => self.reconcile(server),
        }
    }

    /// The entry stays visible; only its delivery state changes.
    pub fn mark_failed(&mut self, temp_id: &str) -> bool {
        match self.items.iter_mut().find(|m| m.id == temp_id) {
            Some(msg) if msg.delivery == Delivery::Pending => {
                msg.delivery = Delivery::Failed;
                true
            }
            _ => false,
        }
    }

    /// Re-applies entries that arrived before a fresh page load finished.
    pub fn merge_carried(&mut self, carried: Vec<Message>) {
        for msg in carried {
            if msg.is_pending() {
                if self.ids.insert(msg.id.clone()) {
                    self.insert_sorted(msg);
                }
            } else {
                self.reconcile(msg);
            }
        }
    }

    pub fn take_all(&mut self) -> Vec<Message> {
        self.ids.clear();
        std::mem::take(&mut self.items)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.items.iter().find(|m| m.id == id)
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
    }
}
