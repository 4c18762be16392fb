use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::types::ChatMessage;

/// Push events received on a conversation's realtime connection.
///
/// Frames are JSON objects `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RealtimeEvent {
    /// A message was posted to the conversation.
    NewMessage(ChatMessage),
    /// A message's content changed; carries the full updated record.
    MessageEdited(ChatMessage),
    /// A message was removed.
    MessageDeleted(DeletedMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedMessage {
    pub message_id: String,
}

impl RealtimeEvent {
    /// Decode a text frame.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Id of the message the event refers to.
    pub fn message_id(&self) -> &str {
        match self {
            Self::NewMessage(m) | Self::MessageEdited(m) => &m.id,
            Self::MessageDeleted(d) => &d.message_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new_message",
            Self::MessageEdited(_) => "message_edited",
            Self::MessageDeleted(_) => "message_deleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEW_MESSAGE: &str = r#"{
        "type": "new_message",
        "data": {
            "id": "m3",
            "chat_id": "c1",
            "sender_id": "2",
            "content": "hey",
            "message_type": "text",
            "created_at": "2024-05-01T10:00:03Z",
            "edited": false
        }
    }"#;

    #[test]
    fn decodes_new_message() {
        let event = RealtimeEvent::from_json(NEW_MESSAGE).unwrap();
        assert_eq!(event.kind(), "new_message");
        assert_eq!(event.message_id(), "m3");
    }

    #[test]
    fn decodes_deleted_message() {
        let event =
            RealtimeEvent::from_json(r#"{"type":"message_deleted","data":{"message_id":"m9"}}"#)
                .unwrap();
        assert_eq!(
            event,
            RealtimeEvent::MessageDeleted(DeletedMessage {
                message_id: "m9".into()
            })
        );
    }

    #[test]
    fn rejects_unknown_type_and_bad_payloads() {
        assert!(RealtimeEvent::from_json(r#"{"type":"typing","data":{}}"#).is_err());
        assert!(RealtimeEvent::from_json(r#"{"type":"new_message","data":{"id":1}}"#).is_err());
        assert!(RealtimeEvent::from_json("not json").is_err());
    }
}
