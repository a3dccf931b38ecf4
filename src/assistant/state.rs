//! Session state types

use crate::client::{ConnectionState, Conversation, Message};
use std::sync::Arc;

/// Observable state derived from client events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub connection: ConnectionState,
    /// Visible messages in arrival order, unique by sid, never UI-tool commands
    pub messages: Vec<Message>,
    pub assistant_typing: bool,
}

impl SessionState {
    pub fn position(&self, sid: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.sid == sid)
    }
}

/// Where the session is in acquiring its conversation
#[derive(Clone, Default)]
pub enum ConversationPhase {
    #[default]
    NotJoined,
    /// A `start` call is in flight
    Joining,
    Joined(Arc<dyn Conversation>),
    /// The last `start` failed; another attempt is allowed
    Failed(String),
}

impl ConversationPhase {
    pub fn conversation(&self) -> Option<&Arc<dyn Conversation>> {
        match self {
            Self::Joined(conversation) => Some(conversation),
            _ => None,
        }
    }

    /// Whether a new `start` should be skipped
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Joining | Self::Joined(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NotJoined => "not_joined",
            Self::Joining => "joining",
            Self::Joined(_) => "joined",
            Self::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Debug for ConversationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotJoined => f.write_str("NotJoined"),
            Self::Joining => f.write_str("Joining"),
            Self::Joined(conversation) => f.debug_tuple("Joined").field(&conversation.sid()).finish(),
            Self::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}
