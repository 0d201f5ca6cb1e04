use std::time::{Duration, Instant};

use crate::api::models::{Conversation, Page};
use crate::error::{Result, SyncError};
use crate::sync::conversations::ConversationStore;
use crate::sync::pagination::Cursor;
use crate::sync::timer::QuietPeriod;

/// A search the overlay wants issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub seq: u64,
    pub query: String,
    pub page: u32,
    pub limit: u32,
}

/// Debounced conversation search layered over the conversation store.
///
/// Entering search mode snapshots the store once; results replace the store
/// contents; clearing the query puts the snapshot back. Every query change
/// bumps `seq`, and responses carrying an older `seq` are stale.
#[derive(Debug, Clone)]
pub struct SearchOverlay {
    query: String,
    pending: Option<String>,
    in_flight: Option<String>,
    snapshot: Option<ConversationStore>,
    seq: u64,
    debounce: QuietPeriod,
    cursor: Cursor,
}

impl SearchOverlay {
    pub fn new(debounce: Duration, page_size: u32) -> Self {
        Self {
            query: String::new(),
            pending: None,
            in_flight: None,
            snapshot: None,
            seq: 0,
            debounce: QuietPeriod::new(debounce),
            cursor: Cursor::new(page_size),
        }
    }

    pub fn set_query(&mut self, raw: &str, now: Instant, store: &mut ConversationStore) {
        let query = raw.trim();
        if query.is_empty() {
            self.leave(store);
            return;
        }
        if self.snapshot.is_none() {
            log::debug!("entering search mode, snapshotting {} conversations", store.len());
            self.snapshot = Some(store.clone());
        }
        self.seq += 1;
        self.in_flight = None;
        self.pending = Some(query.to_string());
        self.debounce.restart(now);
    }

    /// Drops out of search mode and restores the pre-search list.
    pub fn leave(&mut self, store: &mut ConversationStore) -> bool {
        self.debounce.cancel();
        self.seq += 1;
        self.pending = None;
        self.in_flight = None;
        self.query.clear();
        self.cursor.reset();
        match self.snapshot.take() {
            Some(snapshot) => {
                *store = snapshot;
                true
            }
            None => false,
        }
    }

    /// Issues the pending query once its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<SearchRequest> {
        if !self.debounce.fire(now) {
            return None;
        }
        let query = self.pending.take()?;
        self.cursor.reset();
        let page = self.cursor.begin()?;
        self.in_flight = Some(query.clone());
        Some(SearchRequest {
            seq: self.seq,
            query,
            page,
            limit: self.cursor.page_size(),
        })
    }

    /// Next page of the committed query.
    pub fn load_more(&mut self) -> Option<SearchRequest> {
        if self.snapshot.is_none() || self.query.is_empty() || self.pending.is_some() {
            return None;
        }
        let page = self.cursor.begin()?;
        Some(SearchRequest {
            seq: self.seq,
            query: self.query.clone(),
            page,
            limit: self.cursor.page_size(),
        })
    }

    pub fn apply(
        &mut self,
        seq: u64,
        requested_page: u32,
        result: Result<Page<Conversation>>,
        store: &mut ConversationStore,
    ) -> Result<()> {
        if seq != self.seq || self.snapshot.is_none() {
            return Err(SyncError::StaleResult);
        }
        if let Some(query) = self.in_flight.take() {
            self.query = query;
        }
        match result {
            Ok(page) => {
                let count = page.items.len();
                if !self.cursor.advance(requested_page, count, page.total) {
                    return Err(SyncError::StaleResult);
                }
                if requested_page == 1 {
                    store.replace_all(page.items);
                } else {
                    store.append_older(page.items);
                }
                Ok(())
            }
            Err(e) => {
                if requested_page == 1 {
                    store.replace_all(Vec::new());
                }
                self.cursor.fail();
                Err(e)
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn query(&self) -> &str {
        self.pending.as_deref().unwrap_or(&self.query)
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some() || self.cursor.is_loading()
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn snapshot(&self) -> Option<&ConversationStore> {
        self.snapshot.as_ref()
    }

    /// The pre-search list, kept current while search results are shown.
    pub fn snapshot_mut(&mut self) -> Option<&mut ConversationStore> {
        self.snapshot.as_mut()
    }

    pub fn clear(&mut self) {
        self.snapshot = None;
        self.debounce.cancel();
        self.seq += 1;
        self.pending = None;
        self.in_flight = None;
        self.query.clear();
        self.cursor.reset();
    }
}
