pub mod chat_view;
pub mod sidebar;

use chrono::Utc;

use crate::error::SyncError;
use crate::sync::Coordinator;

/// Full screen: conversation list, then the open conversation, then any notice.
pub fn render_screen(coordinator: &Coordinator, notice: Option<&SyncError>) -> String {
    let mut lines = sidebar::Sidebar::render(coordinator, Utc::now());
    lines.push(String::new());
    lines.extend(chat_view::ChatView::render(coordinator));
    if let Some(err) = notice {
        lines.push(format!("! {err}"));
    }
    lines.join("\n")
}
