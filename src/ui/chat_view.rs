use chrono::Local;

use crate::api::models::{Delivery, Message};
use crate::sync::Coordinator;

/// Text rendition of the active conversation.
pub struct ChatView;

impl ChatView {
    pub fn render(coordinator: &Coordinator) -> Vec<String> {
        let Some(active) = coordinator.active_id() else {
            return vec!["Select a conversation with /open <id>".to_string()];
        };
        let title = coordinator
            .active_conversation()
            .map(|c| c.title.as_str())
            .unwrap_or(active);
        let mut lines = vec![format!("# {title}")];

        let cursor = coordinator.message_cursor();
        if cursor.is_loading() {
            lines.push("  Loading messages…".to_string());
        } else if cursor.has_more() {
            lines.push("  /older for earlier messages".to_string());
        }

        let timeline = coordinator.timeline();
        let (typing, messages): (Vec<&Message>, Vec<&Message>) =
            timeline.iter().partition(|m| m.is_typing);
        if messages.is_empty() && !cursor.is_loading() {
            lines.push("  No messages yet".to_string());
        }
        lines.extend(messages.into_iter().map(line));

        let typists: Vec<&str> = typing
            .iter()
            .filter_map(|m| m.sender_id.as_deref())
            .collect();
        if let Some(label) = typing_label(&typists) {
            lines.push(format!("  {label}…"));
        }
        lines
    }
}

pub fn sender_label(message: &Message) -> &str {
    if message.is_own {
        "You"
    } else {
        message.sender_id.as_deref().unwrap_or("Unknown")
    }
}

pub fn typing_label(users: &[&str]) -> Option<String> {
    match users {
        [] => None,
        [one] => Some(format!("{one} is typing")),
        many => Some(format!("{} people typing", many.len())),
    }
}

fn line(message: &Message) -> String {
    let time = message.created_at.with_timezone(&Local).format("%H:%M");
    let mut line = format!("  [{time}] {}: {}", sender_label(message), message.body);
    match message.delivery {
        Delivery::Pending => line.push_str(" (sending)"),
        Delivery::Failed => line.push_str(" (failed)"),
        Delivery::Sent => {}
    }
    line
}
