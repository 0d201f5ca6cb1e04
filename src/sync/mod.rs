//! Client-side synchronization core: stores, cursors, timers and the
//! coordinator that arbitrates between REST pages, push events and local sends.

pub mod conversations;
pub mod coordinator;
pub mod messages;
pub mod pagination;
pub mod search;
pub mod timer;
pub mod typing;

pub use conversations::{ActivityPatch, ConversationStore};
pub use coordinator::{Completion, Coordinator, Effect, PlatformFilter, SendChannel, SyncSettings};
pub use messages::{MessageStore, Reconciled};
pub use pagination::Cursor;
pub use search::{SearchOverlay, SearchRequest};
pub use typing::{TypingPresence, TypingSignal};
