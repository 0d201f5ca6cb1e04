use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Slack,
    Gmail,
    #[default]
    Unknown,
}

impl Platform {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "slack" => Platform::Slack,
            "gmail" => Platform::Gmail,
            _ => Platform::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Slack => "slack",
            Platform::Gmail => "gmail",
            Platform::Unknown => "unknown",
        }
    }

    /// Badge text shown next to a conversation title.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Slack => "Slack",
            Platform::Gmail => "Gmail",
            Platform::Unknown => "Other",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub platform: Platform,
    pub title: String,
    pub last_message: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
}

/// Where an own message is in its round trip to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Shown optimistically, no server id yet.
    Pending,
    #[default]
    Sent,
    /// The send failed; the entry stays so the user can retry.
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_own: bool,
    pub sender_id: Option<String>,
    /// Ephemeral "someone is typing" row, never stored in a log.
    #[serde(skip)]
    pub is_typing: bool,
    #[serde(skip)]
    pub delivery: Delivery,
}

impl Message {
    pub fn typing_placeholder(conversation_id: &str, sender_id: &str) -> Self {
        Self {
            id: format!("typing-{sender_id}"),
            conversation_id: conversation_id.to_string(),
            body: String::new(),
            created_at: Utc::now(),
            is_own: false,
            sender_id: Some(sender_id.to_string()),
            is_typing: true,
            delivery: Delivery::Sent,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.delivery != Delivery::Sent
    }
}

/// One page of a paginated listing, after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

/// Body of `POST /api/messages`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub platform: Platform,
    pub channel_id: String,
    pub text: String,
}

/// Reads the first present key as a string; numeric ids are stringified.
fn string_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts RFC 3339 strings and epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

pub fn normalize_conversation(item: &Value) -> Option<Conversation> {
    let id = string_field(item, &["id", "conversationId"])?;
    let title = string_field(item, &["title", "subject", "name"]).unwrap_or_else(|| id.clone());
    let platform = item
        .get("platform")
        .and_then(|v| v.as_str())
        .map(Platform::parse)
        .unwrap_or_default();
    let last_message = string_field(item, &["lastMessage"]).unwrap_or_default();
    let updated_at = item.get("updatedAt").and_then(parse_timestamp);
    let unread_count = item
        .get("unreadCount")
        .and_then(|v| v.as_u64())
        .map(|n| n.min(u32::MAX as u64) as u32)
        .unwrap_or(0);
    Some(Conversation {
        id,
        platform,
        title,
        last_message,
        updated_at,
        unread_count,
    })
}

/// Builds the canonical message shape from any of the payloads the backend
/// and the event stream produce. Returns `None` when no id can be found.
pub fn normalize_message(
    item: &Value,
    fallback_conversation: Option<&str>,
    local_identity: &str,
) -> Option<Message> {
    let id = string_field(item, &["id", "_id", "messageId"])?;
    let conversation_id = string_field(item, &["conversationId", "channelId"])
        .or_else(|| fallback_conversation.map(str::to_string))?;
    let body = string_field(item, &["body", "text"]).unwrap_or_default();
    let created_at = item
        .get("createdAt")
        .and_then(parse_timestamp)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let sender_id = string_field(item, &["senderId", "userId"]);
    let flagged_own = item
        .get("isOwn")
        .or_else(|| item.get("isOwnMessage"))
        .and_then(|v| v.as_bool());
    let is_own = flagged_own.unwrap_or_else(|| sender_id.as_deref() == Some(local_identity));
    Some(Message {
        id,
        conversation_id,
        body,
        created_at,
        is_own,
        sender_id,
        is_typing: false,
        delivery: Delivery::Sent,
    })
}

/// Pulls the item array out of a listing envelope.
pub fn page_items(json: &Value) -> Option<&Vec<Value>> {
    json.as_array()
        .or_else(|| json.get("data").and_then(|v| v.as_array()))
        .or_else(|| json.get("messages").and_then(|v| v.as_array()))
        .or_else(|| json.get("conversations").and_then(|v| v.as_array()))
}

pub fn parse_page<T>(
    json: &Value,
    requested_page: u32,
    limit: u32,
    normalize: impl Fn(&Value) -> Option<T>,
) -> Option<Page<T>> {
    let raw = page_items(json)?;
    let items: Vec<T> = raw.iter().filter_map(normalize).collect();
    let total = json
        .get("total")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(items.len());
    let page = json
        .get("page")
        .and_then(|v| v.as_u64())
        .map(|n| n as u32)
        .unwrap_or(requested_page);
    let limit = json
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|n| n as u32)
        .unwrap_or(limit);
    Some(Page {
        items,
        total,
        page,
        limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversation_falls_back_across_field_names() {
        let conv = normalize_conversation(&json!({
            "conversationId": 17,
            "subject": "Quarterly report",
            "platform": "GMAIL",
            "updatedAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(conv.id, "17");
        assert_eq!(conv.title, "Quarterly report");
        assert_eq!(conv.platform, Platform::Gmail);
        assert_eq!(conv.last_message, "");
        assert_eq!(conv.unread_count, 0);
        assert!(conv.updated_at.is_some());
    }

    #[test]
    fn conversation_without_id_is_dropped() {
        assert!(normalize_conversation(&json!({"title": "orphan"})).is_none());
    }

    #[test]
    fn title_defaults_to_id() {
        let conv = normalize_conversation(&json!({"id": "c9"})).unwrap();
        assert_eq!(conv.title, "c9");
        assert_eq!(conv.platform, Platform::Unknown);
    }

    #[test]
    fn message_uses_text_and_channel_fallbacks() {
        let msg = normalize_message(
            &json!({"id": "m1", "channelId": "C1", "text": "hello", "createdAt": 1_700_000_000_000i64}),
            None,
            "me",
        )
        .unwrap();
        assert_eq!(msg.conversation_id, "C1");
        assert_eq!(msg.body, "hello");
        assert_eq!(msg.created_at.timestamp_millis(), 1_700_000_000_000);
        assert!(!msg.is_own);
    }

    #[test]
    fn message_is_own_when_sender_is_local_identity() {
        let msg = normalize_message(&json!({"id": "m2", "senderId": "me"}), Some("c1"), "me").unwrap();
        assert!(msg.is_own);
        assert_eq!(msg.conversation_id, "c1");
        assert_eq!(msg.created_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn explicit_own_flag_wins_over_sender() {
        let msg = normalize_message(
            &json!({"id": "m3", "senderId": "me", "isOwnMessage": false}),
            Some("c1"),
            "me",
        )
        .unwrap();
        assert!(!msg.is_own);
    }

    #[test]
    fn page_envelope_variants() {
        let bare = json!([{"id": "a"}, {"id": "b"}, {"title": "no id"}]);
        let page = parse_page(&bare, 3, 10, normalize_conversation).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 2);
        assert_eq!(page.page, 3);

        let wrapped = json!({"data": [{"id": "a"}], "total": 120, "page": 1, "limit": 50});
        let page = parse_page(&wrapped, 1, 10, normalize_conversation).unwrap();
        assert_eq!(page.total, 120);
        assert_eq!(page.limit, 50);

        assert!(parse_page(&json!({"ok": true}), 1, 10, normalize_conversation).is_none());
    }

    #[test]
    fn send_request_uses_wire_names() {
        let req = SendRequest {
            platform: Platform::Slack,
            channel_id: "C1".into(),
            text: "hi".into(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"platform": "slack", "channelId": "C1", "text": "hi"})
        );
    }
}
