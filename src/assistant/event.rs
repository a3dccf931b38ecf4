//! Events flowing into and out of the assistant adapter

use super::ui_tool::UiToolInvocation;
use crate::client::{ConnectionState, ConversationEvent, Message};
use serde::Serialize;

/// Low-level events fed to the adapter by the conversation client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ConnectionStateChanged(ConnectionState),
    /// Full history fetched after joining
    HistoryLoaded(Vec<Message>),
    Conversation(ConversationEvent),
}

impl From<ConversationEvent> for ClientEvent {
    fn from(event: ConversationEvent) -> Self {
        Self::Conversation(event)
    }
}

impl From<ConnectionState> for ClientEvent {
    fn from(state: ConnectionState) -> Self {
        Self::ConnectionStateChanged(state)
    }
}

/// Payload of [`AssistantEvent::JoinedConversation`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedConversation {
    pub conversation_sid: String,
    pub identity: String,
}

/// Events published by the adapter
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    StatusChanged(ConnectionState),
    /// Complete visible message list after a change
    MessagesChanged(Vec<Message>),
    JoinedConversation(JoinedConversation),
    AssistantTypingStarted,
    AssistantTypingEnded,
    UiToolTriggered(UiToolInvocation),
}

impl AssistantEvent {
    pub fn kind(&self) -> AssistantEventKind {
        match self {
            Self::StatusChanged(_) => AssistantEventKind::StatusChanged,
            Self::MessagesChanged(_) => AssistantEventKind::MessagesChanged,
            Self::JoinedConversation(_) => AssistantEventKind::JoinedConversation,
            Self::AssistantTypingStarted => AssistantEventKind::AssistantTypingStarted,
            Self::AssistantTypingEnded => AssistantEventKind::AssistantTypingEnded,
            Self::UiToolTriggered(_) => AssistantEventKind::UiToolTriggered,
        }
    }
}

/// Discriminant of [`AssistantEvent`], used to key subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssistantEventKind {
    StatusChanged,
    MessagesChanged,
    JoinedConversation,
    AssistantTypingStarted,
    AssistantTypingEnded,
    UiToolTriggered,
}

impl AssistantEventKind {
    pub const ALL: [AssistantEventKind; 6] = [
        Self::StatusChanged,
        Self::MessagesChanged,
        Self::JoinedConversation,
        Self::AssistantTypingStarted,
        Self::AssistantTypingEnded,
        Self::UiToolTriggered,
    ];

    /// Wire name of the event, e.g. `statusChanged`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatusChanged => "statusChanged",
            Self::MessagesChanged => "messagesChanged",
            Self::JoinedConversation => "joinedConversation",
            Self::AssistantTypingStarted => "assistantTypingStarted",
            Self::AssistantTypingEnded => "assistantTypingEnded",
            Self::UiToolTriggered => "uiToolTriggered",
        }
    }
}

impl std::fmt::Display for AssistantEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
