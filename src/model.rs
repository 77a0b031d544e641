//! Chat message document stored in the history collection
//!
//! The bootstrapper never writes these; the chat application does. The
//! type documents the fields the indexes are built over.

use anyhow::Result;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Human,
    Assistant,
    System,
}

/// Position of a message inside the sliding context window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub window_position: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub session_id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub context_info: ContextInfo,
}

impl ChatMessage {
    pub fn to_document(&self) -> Result<Document> {
        Ok(bson::to_document(self)?)
    }

    /// Illustrative document shown by `plan`
    pub fn sample(timestamp: DateTime<Utc>) -> Self {
        Self {
            message_id: "msg-0001".to_string(),
            session_id: "session-42".to_string(),
            conversation_id: "conversation-7".to_string(),
            user_id: "user-1".to_string(),
            message_type: MessageType::Human,
            timestamp,
            content: "Hello!".to_string(),
            context_info: ContextInfo {
                window_position: 0,
                window_size: Some(10),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_has_indexed_fields() {
        let msg = ChatMessage::sample(Utc::now());
        let doc = msg.to_document().unwrap();
        for field in [
            "message_id",
            "session_id",
            "conversation_id",
            "user_id",
            "message_type",
            "timestamp",
        ] {
            assert!(doc.contains_key(field), "missing {}", field);
        }
        assert_eq!(doc.get_str("message_type").unwrap(), "human");
        let ctx = doc.get_document("context_info").unwrap();
        assert_eq!(ctx.get_i64("window_position").unwrap(), 0);
    }

    #[test]
    fn test_message_type_wire_names() {
        let json = serde_json::to_string(&MessageType::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let parsed: MessageType = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(parsed, MessageType::System);
    }
}
