//! Client-side synchronization for a unified Slack/Gmail messaging dashboard:
//! paginated conversation and message lists, debounced search, live push
//! events, optimistic sends and typing indicators.

pub mod api;
pub mod app;
pub mod error;
pub mod session;
pub mod sync;
pub mod ui;
pub mod utils;

pub use app::AppConfig;
pub use error::{Result, SyncError};
pub use session::{Command, Session};
pub use sync::{Completion, Coordinator, Effect};
