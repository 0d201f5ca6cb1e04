use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SyncError};

/// Raw frame as it comes off the event stream: `{"event": "...", "data": {...}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct IncomingEvent {
    #[serde(rename = "event")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Push events the core reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Message payload, normalized later by whoever knows the local identity.
    NewMessage(Value),
    UserTyping {
        user_id: String,
        conversation_id: Option<String>,
    },
    TypingStop {
        user_id: String,
        conversation_id: Option<String>,
    },
}

/// Events the client emits on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutgoingEvent {
    TypingStart { conversation_id: String },
    TypingStop { conversation_id: String },
    SendMessage { conversation_id: String, body: String },
}

fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl IncomingEvent {
    pub fn parse(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    /// `Ok(None)` for event names this client does not handle.
    pub fn into_server_event(self) -> Result<Option<ServerEvent>> {
        let typing_ids = |data: &Value| -> Result<(String, Option<String>)> {
            let user_id = id_of(data.get("userId"))
                .ok_or_else(|| SyncError::MalformedResponse("typing event without userId".into()))?;
            Ok((user_id, id_of(data.get("conversationId"))))
        };
        let event = match self.event_type.as_str() {
            "new_message" => {
                if !self.data.is_object() {
                    return Err(SyncError::MalformedResponse("new_message without payload".into()));
                }
                ServerEvent::NewMessage(self.data)
            }
            "user_typing" | "typing_start" => {
                let (user_id, conversation_id) = typing_ids(&self.data)?;
                ServerEvent::UserTyping {
                    user_id,
                    conversation_id,
                }
            }
            "typing_stop" => {
                let (user_id, conversation_id) = typing_ids(&self.data)?;
                ServerEvent::TypingStop {
                    user_id,
                    conversation_id,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl OutgoingEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            OutgoingEvent::TypingStart { conversation_id }
            | OutgoingEvent::TypingStop { conversation_id }
            | OutgoingEvent::SendMessage { conversation_id, .. } => conversation_id,
        }
    }

    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
