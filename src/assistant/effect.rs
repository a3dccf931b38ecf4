//! Effects produced by event translation

use super::event::AssistantEvent;
use super::ui_tool::UiToolError;

/// Effects to be executed after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Publish an event to subscribers
    Emit(AssistantEvent),

    /// A UI-tool message was malformed and dropped
    RejectToolPayload {
        message_sid: String,
        error: UiToolError,
    },
}

impl Effect {
    pub fn messages_changed(messages: &[crate::client::Message]) -> Self {
        Effect::Emit(AssistantEvent::MessagesChanged(messages.to_vec()))
    }
}
