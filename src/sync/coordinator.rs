//! Single authority over the stores.
//!
//! Every input (REST completion, push event, user action, timer tick) is a
//! synchronous method call. Side effects the coordinator needs performed are
//! queued as [`Effect`]s; their outcomes come back as [`Completion`]s.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::events::{OutgoingEvent, ServerEvent};
use crate::api::models::{normalize_message, Conversation, Message, Page, Platform, SendRequest};
use crate::error::{Result, SyncError};
use crate::sync::conversations::{ActivityPatch, ConversationStore};
use crate::sync::messages::{MessageStore, Reconciled};
use crate::sync::pagination::Cursor;
use crate::sync::search::{SearchOverlay, SearchRequest};
use crate::sync::timer::earliest;
use crate::sync::typing::{TypingPresence, TypingSignal};

/// Which channel carries an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendChannel {
    /// `POST /api/messages`; the push echo is a secondary confirmation.
    #[default]
    Rest,
    /// `send_message` on the event stream; the push echo confirms.
    Stream,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub conversation_page_size: u32,
    pub message_page_size: u32,
    pub search_page_size: u32,
    pub search_debounce: Duration,
    pub typing_stop: Duration,
    pub typing_expiry: Duration,
    pub local_identity: String,
    pub send_channel: SendChannel,
    pub default_platform: Platform,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            conversation_page_size: 50,
            message_page_size: 20,
            search_page_size: 50,
            search_debounce: Duration::from_millis(500),
            typing_stop: Duration::from_millis(2000),
            typing_expiry: Duration::from_millis(5000),
            local_identity: "me".to_string(),
            send_channel: SendChannel::Rest,
            default_platform: Platform::Slack,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatformFilter {
    #[default]
    All,
    Only(Platform),
}

impl PlatformFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Some(PlatformFilter::All),
            other => match Platform::parse(other) {
                Platform::Unknown => None,
                platform => Some(PlatformFilter::Only(platform)),
            },
        }
    }

    pub fn matches(&self, conversation: &Conversation) -> bool {
        match self {
            PlatformFilter::All => true,
            PlatformFilter::Only(platform) => conversation.platform == *platform,
        }
    }
}

/// Work the coordinator wants done outside the synchronous core.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchConversations {
        page: u32,
        limit: u32,
    },
    FetchMessages {
        conversation_id: String,
        page: u32,
        limit: u32,
    },
    Search(SearchRequest),
    SendMessage {
        conversation_id: String,
        temp_id: String,
        request: SendRequest,
    },
    /// `send_message` on the event stream. If it cannot be written, the
    /// driver reports `Completion::Sent` with the error for `temp_id`.
    StreamSend {
        conversation_id: String,
        temp_id: String,
        event: OutgoingEvent,
    },
    Emit(OutgoingEvent),
}

/// Outcome of an [`Effect`], tagged with what was captured at dispatch time.
#[derive(Debug)]
pub enum Completion {
    Conversations {
        page: u32,
        result: Result<Page<Conversation>>,
    },
    Messages {
        conversation_id: String,
        page: u32,
        result: Result<Page<Message>>,
    },
    Search {
        seq: u64,
        page: u32,
        result: Result<Page<Conversation>>,
    },
    Sent {
        conversation_id: String,
        temp_id: String,
        result: Result<Message>,
    },
}

const SEEN_CAPACITY: usize = 512;

/// Recently applied `(conversation, message)` ids, oldest evicted first.
#[derive(Debug, Default)]
struct SeenMessages {
    order: VecDeque<(String, String)>,
    keys: HashSet<(String, String)>,
}

impl SeenMessages {
    /// False when the message was already applied.
    fn insert(&mut self, conversation_id: &str, message_id: &str) -> bool {
        let key = (conversation_id.to_string(), message_id.to_string());
        if !self.keys.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > SEEN_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        true
    }

    fn clear(&mut self) {
        self.order.clear();
        self.keys.clear();
    }
}

pub struct Coordinator {
    settings: SyncSettings,
    conversations: ConversationStore,
    conversation_cursor: Cursor,
    active: Option<String>,
    messages: MessageStore,
    message_cursor: Cursor,
    search: SearchOverlay,
    presence: TypingPresence,
    typing: TypingSignal,
    platform: PlatformFilter,
    seen: SeenMessages,
    effects: Vec<Effect>,
}

impl Coordinator {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            conversations: ConversationStore::new(),
            conversation_cursor: Cursor::new(settings.conversation_page_size),
            active: None,
            messages: MessageStore::new(),
            message_cursor: Cursor::new(settings.message_page_size),
            search: SearchOverlay::new(settings.search_debounce, settings.search_page_size),
            presence: TypingPresence::new(settings.typing_expiry),
            typing: TypingSignal::new(settings.typing_stop),
            platform: PlatformFilter::All,
            seen: SeenMessages::default(),
            effects: Vec::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Drains the queued effects in the order they were produced.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Seeds the list from an initial first page fetched before the loop starts.
    pub fn hydrate(&mut self, page: Page<Conversation>) {
        self.conversation_cursor.reset();
        self.conversation_cursor
            .advance(1, page.items.len(), page.total);
        self.conversations.replace_all(page.items);
        log::info!(
            "hydrated {} of {} conversations",
            self.conversations.len(),
            page.total
        );
    }

    // ---- conversation list ----

    /// Requests the next page of whichever list is showing. False when there
    /// is nothing more to load or a load is already running.
    pub fn load_more_conversations(&mut self) -> bool {
        if self.search.is_active() {
            return match self.search.load_more() {
                Some(req) => {
                    self.effects.push(Effect::Search(req));
                    true
                }
                None => false,
            };
        }
        match self.conversation_cursor.begin() {
            Some(page) => {
                self.effects.push(Effect::FetchConversations {
                    page,
                    limit: self.conversation_cursor.page_size(),
                });
                true
            }
            None => false,
        }
    }

    fn conversations_loaded(&mut self, page: u32, result: Result<Page<Conversation>>) -> Result<()> {
        if page != self.conversation_cursor.page() || !self.conversation_cursor.is_loading() {
            return Err(SyncError::StaleResult);
        }
        // While searching, the base list lives in the search snapshot.
        let store = match self.search.snapshot_mut() {
            Some(snapshot) => snapshot,
            None => &mut self.conversations,
        };
        match result {
            Ok(loaded) => {
                self.conversation_cursor
                    .advance(page, loaded.items.len(), loaded.total);
                if page == 1 {
                    store.replace_all(loaded.items);
                } else {
                    store.append_older(loaded.items);
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("conversation page {page} failed: {e}");
                self.conversation_cursor.fail();
                Err(e)
            }
        }
    }

    fn upsert_activity(&mut self, conversation_id: &str, patch: &ActivityPatch) -> bool {
        let mut known = self.conversations.upsert_on_activity(conversation_id, patch);
        if let Some(snapshot) = self.search.snapshot_mut() {
            known |= snapshot.upsert_on_activity(conversation_id, patch);
        }
        known
    }

    pub fn set_platform(&mut self, filter: PlatformFilter) {
        self.platform = filter;
    }

    pub fn platform(&self) -> PlatformFilter {
        self.platform
    }

    pub fn visible_conversations(&self) -> Vec<&Conversation> {
        self.conversations
            .iter()
            .filter(|c| self.platform.matches(c))
            .collect()
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn conversation_cursor(&self) -> &Cursor {
        &self.conversation_cursor
    }

    // ---- search ----

    pub fn set_search_query(&mut self, query: &str, now: Instant) {
        self.search.set_query(query, now, &mut self.conversations);
    }

    pub fn search(&self) -> &SearchOverlay {
        &self.search
    }

    // ---- active conversation ----

    pub fn open_conversation(&mut self, conversation_id: &str) -> bool {
        if self.active.as_deref() == Some(conversation_id) {
            return false;
        }
        if let Some(stop) = self.typing.flush() {
            self.effects.push(Effect::Emit(stop));
        }
        log::debug!("switching to conversation {conversation_id}");
        self.active = Some(conversation_id.to_string());
        self.messages.clear();
        self.message_cursor.reset();
        self.conversations.mark_read(conversation_id);
        if let Some(snapshot) = self.search.snapshot_mut() {
            snapshot.mark_read(conversation_id);
        }
        self.load_older_messages()
    }

    pub fn close_conversation(&mut self) {
        if let Some(stop) = self.typing.flush() {
            self.effects.push(Effect::Emit(stop));
        }
        self.active = None;
        self.messages.clear();
        self.message_cursor.reset();
    }

    /// Requests the next (older) page for the active conversation.
    pub fn load_older_messages(&mut self) -> bool {
        let Some(conversation_id) = self.active.clone() else {
            return false;
        };
        match self.message_cursor.begin() {
            Some(page) => {
                self.effects.push(Effect::FetchMessages {
                    conversation_id,
                    page,
                    limit: self.message_cursor.page_size(),
                });
                true
            }
            None => false,
        }
    }

    fn messages_loaded(
        &mut self,
        conversation_id: &str,
        page: u32,
        result: Result<Page<Message>>,
    ) -> Result<()> {
        if self.active.as_deref() != Some(conversation_id) {
            log::debug!("discarding messages for inactive conversation {conversation_id}");
            return Err(SyncError::StaleResult);
        }
        if page != self.message_cursor.page() || !self.message_cursor.is_loading() {
            return Err(SyncError::StaleResult);
        }
        match result {
            Ok(loaded) => {
                self.message_cursor
                    .advance(page, loaded.items.len(), loaded.total);
                if page == 1 {
                    // Live and optimistic entries may have landed while the page was in flight.
                    let carried = self.messages.take_all();
                    self.messages.replace_all(loaded.items);
                    self.messages.merge_carried(carried);
                } else {
                    self.messages.prepend_older(loaded.items);
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("message page {page} for {conversation_id} failed: {e}");
                self.message_cursor.fail();
                Err(e)
            }
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        let id = self.active.as_deref()?;
        self.conversations.select_by_id(id).or_else(|| {
            self.search
                .snapshot()
                .and_then(|snapshot| snapshot.select_by_id(id))
        })
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn message_cursor(&self) -> &Cursor {
        &self.message_cursor
    }

    /// The active log plus one ephemeral placeholder per remote typist.
    pub fn timeline(&self) -> Vec<Message> {
        let Some(active) = self.active.as_deref() else {
            return Vec::new();
        };
        let mut rows = self.messages.as_slice().to_vec();
        rows.extend(
            self.presence
                .typing_in(active)
                .into_iter()
                .map(|user| Message::typing_placeholder(active, user)),
        );
        rows
    }

    pub fn typing_users(&self) -> Vec<&str> {
        self.active
            .as_deref()
            .map(|id| self.presence.typing_in(id))
            .unwrap_or_default()
    }

    // ---- local input ----

    pub fn keystroke(&mut self, now: Instant) {
        let Some(active) = self.active.as_deref() else {
            return;
        };
        let events = self.typing.keystroke(active, now);
        self.effects.extend(events.into_iter().map(Effect::Emit));
    }

    /// Optimistically appends `body` and queues the send. Returns the temporary id.
    pub fn send(&mut self, body: &str) -> Option<String> {
        let body = body.trim();
        let conversation_id = self.active.clone()?;
        if body.is_empty() {
            return None;
        }
        let platform = match self.active_conversation().map(|c| c.platform) {
            Some(Platform::Unknown) | None => self.settings.default_platform,
            Some(platform) => platform,
        };
        let temp_id = self.messages.append_local(
            &conversation_id,
            body,
            Some(self.settings.local_identity.as_str()),
            Utc::now(),
        );
        if let Some(stop) = self.typing.flush() {
            self.effects.push(Effect::Emit(stop));
        }
        let effect = match self.settings.send_channel {
            SendChannel::Rest => Effect::SendMessage {
                conversation_id: conversation_id.clone(),
                temp_id: temp_id.clone(),
                request: SendRequest {
                    platform,
                    channel_id: conversation_id,
                    text: body.to_string(),
                },
            },
            SendChannel::Stream => Effect::StreamSend {
                conversation_id: conversation_id.clone(),
                temp_id: temp_id.clone(),
                event: OutgoingEvent::SendMessage {
                    conversation_id,
                    body: body.to_string(),
                },
            },
        };
        self.effects.push(effect);
        Some(temp_id)
    }

    fn message_sent(
        &mut self,
        conversation_id: &str,
        temp_id: &str,
        result: Result<Message>,
    ) -> Result<()> {
        let is_active = self.active.as_deref() == Some(conversation_id);
        match result {
            Ok(message) => {
                self.seen.insert(conversation_id, &message.id);
                self.upsert_activity(
                    conversation_id,
                    &ActivityPatch {
                        last_message: Some(message.body.clone()),
                        updated_at: known_time(message.created_at),
                        unread_increment: 0,
                    },
                );
                if is_active {
                    let outcome = self.messages.confirm(temp_id, message);
                    log::debug!("send {temp_id} confirmed: {outcome:?}");
                }
                Ok(())
            }
            Err(e) => {
                // The placeholder stays; the user can resend.
                if is_active {
                    self.messages.mark_failed(temp_id);
                }
                log::warn!("send {temp_id} to {conversation_id} failed: {e}");
                Err(e)
            }
        }
    }

    // ---- push events ----

    pub fn handle_event(&mut self, event: ServerEvent, now: Instant) -> Result<()> {
        match event {
            ServerEvent::NewMessage(raw) => {
                let message = normalize_message(&raw, None, &self.settings.local_identity)
                    .ok_or_else(|| {
                        SyncError::MalformedResponse("new_message without id or conversation".into())
                    })?;
                self.apply_new_message(message);
                Ok(())
            }
            ServerEvent::UserTyping {
                user_id,
                conversation_id,
            } => {
                if user_id == self.settings.local_identity {
                    return Ok(());
                }
                if let Some(conversation_id) = conversation_id.or_else(|| self.active.clone()) {
                    self.presence.start(&conversation_id, &user_id, now);
                }
                Ok(())
            }
            ServerEvent::TypingStop {
                user_id,
                conversation_id,
            } => {
                if let Some(conversation_id) = conversation_id.or_else(|| self.active.clone()) {
                    self.presence.stop(&conversation_id, &user_id);
                }
                Ok(())
            }
        }
    }

    /// Decides whether a pushed message is new, a duplicate, or the
    /// confirmation of a pending send, and updates list and log accordingly.
    fn apply_new_message(&mut self, message: Message) -> Option<Reconciled> {
        let conversation_id = message.conversation_id.clone();
        let is_active = self.active.as_deref() == Some(conversation_id.as_str());
        if let Some(sender) = message.sender_id.as_deref() {
            self.presence.stop(&conversation_id, sender);
        }

        if !self.seen.insert(&conversation_id, &message.id) {
            log::debug!("repeated delivery of {} in {conversation_id}", message.id);
            return is_active.then(|| self.messages.reconcile(message));
        }

        let patch = ActivityPatch {
            last_message: Some(message.body.clone()),
            updated_at: known_time(message.created_at),
            unread_increment: u32::from(!message.is_own && !is_active),
        };
        if !self.upsert_activity(&conversation_id, &patch) {
            log::debug!("new message for unlisted conversation {conversation_id}");
        }

        if !is_active {
            return None;
        }
        let outcome = self.messages.reconcile(message);
        log::debug!("new message in {conversation_id}: {outcome:?}");
        Some(outcome)
    }

    // ---- completions & timers ----

    pub fn complete(&mut self, completion: Completion) -> Result<()> {
        match completion {
            Completion::Conversations { page, result } => self.conversations_loaded(page, result),
            Completion::Messages {
                conversation_id,
                page,
                result,
            } => self.messages_loaded(&conversation_id, page, result),
            Completion::Search { seq, page, result } => {
                self.search
                    .apply(seq, page, result, &mut self.conversations)
            }
            Completion::Sent {
                conversation_id,
                temp_id,
                result,
            } => self.message_sent(&conversation_id, &temp_id, result),
        }
    }

    /// Fires whatever timers are due at `now`.
    pub fn tick(&mut self, now: Instant) {
        if let Some(req) = self.search.poll(now) {
            log::debug!("search #{} for {:?}", req.seq, req.query);
            self.effects.push(Effect::Search(req));
        }
        if let Some(stop) = self.typing.poll(now) {
            self.effects.push(Effect::Emit(stop));
        }
        for (conversation_id, user_id) in self.presence.expire(now) {
            log::debug!("{user_id} stopped typing in {conversation_id} (timed out)");
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.search.deadline(),
            self.typing.deadline(),
            self.presence.next_deadline(),
        ])
    }

    /// Clears everything at the end of a user session.
    pub fn end_session(&mut self) {
        self.conversations.clear();
        self.conversation_cursor.reset();
        self.active = None;
        self.messages.clear();
        self.message_cursor.reset();
        self.search.clear();
        self.presence.clear();
        self.typing.flush();
        self.platform = PlatformFilter::All;
        self.seen.clear();
        self.effects.clear();
        log::info!("session state cleared");
    }
}

/// Messages without a timestamp normalize to the epoch; that is not activity time.
fn known_time(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (at != DateTime::<Utc>::UNIX_EPOCH).then_some(at)
}
