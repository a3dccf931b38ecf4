//! Wire-level types shared with the conversation backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author name the backend uses for messages produced by the assistant
pub const ASSISTANT_AUTHOR: &str = "system";

/// Message attribute carrying the assistant's message classification
pub const MESSAGE_TYPE_ATTRIBUTE: &str = "assistantMessageType";

/// `assistantMessageType` value marking a UI-tool command
pub const UI_TOOL_MESSAGE_TYPE: &str = "ui-tool";

/// Conversation attribute toggled while the assistant composes a reply
pub const TYPING_ATTRIBUTE: &str = "assistantIsTyping";

/// Lifecycle of the underlying real-time transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Unknown,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Denied,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Transport is neither usable nor settled offline.
    pub fn is_busy(self) -> bool {
        !matches!(self, Self::Connected | Self::Disconnected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
            Self::Denied => "denied",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation state as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Inactive,
    Closed,
}

/// Which side of the conversation a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Sent by the assistant
    Inbound,
    /// Sent by the end user
    Outbound,
}

/// A single conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sid: String,
    #[serde(default)]
    pub index: u64,
    pub author: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub date_updated: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(sid: impl Into<String>, author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            index: 0,
            author: author.into(),
            body: Some(body.into()),
            attributes: Value::Object(serde_json::Map::new()),
            date_updated: None,
        }
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }

    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_date_updated(mut self, date: DateTime<Utc>) -> Self {
        self.date_updated = Some(date);
        self
    }

    pub fn is_from_assistant(&self) -> bool {
        self.author == ASSISTANT_AUTHOR
    }

    pub fn direction(&self) -> MessageDirection {
        if self.is_from_assistant() {
            MessageDirection::Inbound
        } else {
            MessageDirection::Outbound
        }
    }

    /// `assistantMessageType` attribute, if the attributes are an object carrying a string
    pub fn assistant_message_type(&self) -> Option<&str> {
        self.attributes.get(MESSAGE_TYPE_ATTRIBUTE)?.as_str()
    }

    pub fn is_ui_tool(&self) -> bool {
        self.assistant_message_type() == Some(UI_TOOL_MESSAGE_TYPE)
    }
}

/// Why the backend reported a message update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageUpdateReason {
    Body,
    LastUpdatedBy,
    DateCreated,
    DateUpdated,
    Attributes,
    Author,
    DeliveryReceipt,
    Media,
}

/// Why the backend reported a conversation update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConversationUpdateReason {
    Attributes,
    CreatedBy,
    DateCreated,
    DateUpdated,
    FriendlyName,
    LastReadMessageIndex,
    State,
    Status,
    UniqueName,
    NotificationLevel,
    LastMessage,
}

/// Events delivered by a joined conversation
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    MessageAdded(Message),
    MessageUpdated {
        message: Message,
        reasons: Vec<MessageUpdateReason>,
    },
    MessageRemoved(Message),
    Updated {
        /// Conversation attributes after the update
        attributes: Value,
        reasons: Vec<ConversationUpdateReason>,
    },
}

/// Parameters for creating a conversation
#[derive(Debug, Clone, PartialEq)]
pub struct CreateConversationOptions {
    pub friendly_name: String,
    pub attributes: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_state_wire_names() {
        let state: ConnectionState = serde_json::from_str("\"disconnecting\"").unwrap();
        assert_eq!(state, ConnectionState::Disconnecting);
        assert_eq!(serde_json::to_string(&ConnectionState::Denied).unwrap(), "\"denied\"");
        assert_eq!(ConnectionState::default(), ConnectionState::Unknown);
    }

    #[test]
    fn test_connection_state_busy() {
        assert!(!ConnectionState::Connected.is_busy());
        assert!(!ConnectionState::Disconnected.is_busy());
        assert!(ConnectionState::Connecting.is_busy());
        assert!(ConnectionState::Unknown.is_busy());
    }

    #[test]
    fn test_message_classification() {
        let tool = Message::new("IM1", "system", "{}")
            .with_attributes(json!({ "assistantMessageType": "ui-tool" }));
        assert!(tool.is_ui_tool());
        assert_eq!(tool.direction(), MessageDirection::Inbound);

        let user = Message::new("IM2", "alice", "hi");
        assert!(!user.is_ui_tool());
        assert_eq!(user.direction(), MessageDirection::Outbound);

        // Non-object attributes never classify as a tool
        let odd = Message::new("IM3", "system", "x").with_attributes(json!(["ui-tool"]));
        assert!(!odd.is_ui_tool());
    }

    #[test]
    fn test_message_deserializes_camel_case() {
        let msg: Message = serde_json::from_value(json!({
            "sid": "IM9",
            "index": 4,
            "author": "system",
            "body": "hello",
            "attributes": {},
            "dateUpdated": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.index, 4);
        assert!(msg.date_updated.is_some());
    }
}
