use chrono::{DateTime, Utc};

use crate::api::models::Conversation;
use crate::sync::{Coordinator, PlatformFilter};

const PREVIEW_CHARS: usize = 48;

/// Text rendition of the conversation list.
pub struct Sidebar;

impl Sidebar {
    pub fn render(coordinator: &Coordinator, now: DateTime<Utc>) -> Vec<String> {
        let mut lines = vec![Self::heading(coordinator)];
        let active = coordinator.active_id();
        let visible = coordinator.visible_conversations();
        if visible.is_empty() {
            lines.push("  (no conversations)".to_string());
        }
        for conv in visible {
            lines.push(row(conv, active == Some(conv.id.as_str()), now));
        }

        let search = coordinator.search();
        let (loading, has_more) = if search.is_active() {
            (search.is_loading(), search.cursor().has_more())
        } else {
            let cursor = coordinator.conversation_cursor();
            (cursor.is_loading(), cursor.has_more())
        };
        if loading {
            lines.push("  Loading…".to_string());
        } else if has_more {
            lines.push("  /more to load more".to_string());
        }
        lines
    }

    fn heading(coordinator: &Coordinator) -> String {
        let mut heading = String::from("Conversations");
        if let PlatformFilter::Only(platform) = coordinator.platform() {
            heading.push_str(&format!(" [{}]", platform.label()));
        }
        let search = coordinator.search();
        if search.is_active() {
            heading.push_str(&format!(" (search: {})", search.query()));
        }
        heading
    }
}

fn row(conv: &Conversation, selected: bool, now: DateTime<Utc>) -> String {
    let marker = if selected { '>' } else { ' ' };
    let mut line = format!(
        "{marker} {:<6} {} ({})  {}",
        conv.platform.label(),
        conv.title,
        conv.id,
        relative_time(conv.updated_at, now)
    );
    if let Some(badge) = unread_badge(conv.unread_count) {
        line.push_str(&format!("  [{badge}]"));
    }
    line.push_str("\n      ");
    line.push_str(&preview(&conv.last_message));
    line
}

pub fn relative_time(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return String::new();
    };
    let elapsed = now.signed_duration_since(at);
    if elapsed.num_minutes() < 1 {
        "Just now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}

pub fn unread_badge(count: u32) -> Option<String> {
    match count {
        0 => None,
        1..=99 => Some(count.to_string()),
        _ => Some("99+".to_string()),
    }
}

pub fn preview(last_message: &str) -> String {
    let text = last_message.trim();
    if text.is_empty() {
        return "No messages".to_string();
    }
    let first_line = text.lines().next().unwrap_or(text);
    if first_line.chars().count() > PREVIEW_CHARS {
        let cut: String = first_line.chars().take(PREVIEW_CHARS - 1).collect();
        format!("{cut}…")
    } else {
        first_line.to_string()
    }
}
