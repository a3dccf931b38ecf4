//! Pure event translation
//!
//! Maps a low-level client event and the current session state to the next
//! state plus the effects to run. No I/O happens here; the adapter applies
//! the result and executes the effects.

use super::effect::Effect;
use super::event::{AssistantEvent, ClientEvent};
use super::state::SessionState;
use super::ui_tool::UiToolInvocation;
use crate::client::{ConversationEvent, ConversationUpdateReason, Message, TYPING_ATTRIBUTE};
use serde_json::Value;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn unchanged(state: &SessionState) -> Self {
        Self::new(state.clone())
    }
}

pub fn transition(state: &SessionState, event: ClientEvent) -> TransitionResult {
    match event {
        ClientEvent::ConnectionStateChanged(connection) => TransitionResult::new(SessionState {
            connection,
            ..state.clone()
        })
        .with_effect(Effect::Emit(AssistantEvent::StatusChanged(connection))),

        ClientEvent::HistoryLoaded(history) => {
            let messages = visible_history(history);
            let effect = Effect::messages_changed(&messages);
            TransitionResult::new(SessionState {
                messages,
                ..state.clone()
            })
            .with_effect(effect)
        }

        ClientEvent::Conversation(ConversationEvent::MessageAdded(message)) => {
            message_added(state, message)
        }

        ClientEvent::Conversation(ConversationEvent::MessageUpdated { message, .. }) => {
            message_updated(state, message)
        }

        ClientEvent::Conversation(ConversationEvent::MessageRemoved(message)) => {
            let Some(pos) = state.position(&message.sid) else {
                return TransitionResult::unchanged(state);
            };
            let mut new_state = state.clone();
            new_state.messages.remove(pos);
            let effect = Effect::messages_changed(&new_state.messages);
            TransitionResult::new(new_state).with_effect(effect)
        }

        ClientEvent::Conversation(ConversationEvent::Updated {
            attributes,
            reasons,
        }) => conversation_updated(state, &attributes, &reasons),
    }
}

fn message_added(state: &SessionState, message: Message) -> TransitionResult {
    if message.is_ui_tool() {
        let effect = match UiToolInvocation::from_message(&message) {
            Ok(tool) => Effect::Emit(AssistantEvent::UiToolTriggered(tool)),
            Err(error) => Effect::RejectToolPayload {
                message_sid: message.sid,
                error,
            },
        };
        return TransitionResult::unchanged(state).with_effect(effect);
    }

    let mut new_state = state.clone();
    // History fetched on join may already hold a message that is also delivered live
    match new_state.position(&message.sid) {
        Some(pos) => new_state.messages[pos] = message,
        None => new_state.messages.push(message),
    }
    let effect = Effect::messages_changed(&new_state.messages);
    TransitionResult::new(new_state).with_effect(effect)
}

fn message_updated(state: &SessionState, message: Message) -> TransitionResult {
    let Some(pos) = state.position(&message.sid) else {
        return TransitionResult::unchanged(state);
    };
    let mut new_state = state.clone();
    if message.is_ui_tool() {
        new_state.messages.remove(pos);
    } else {
        new_state.messages[pos] = message;
    }
    let effect = Effect::messages_changed(&new_state.messages);
    TransitionResult::new(new_state).with_effect(effect)
}

fn conversation_updated(
    state: &SessionState,
    attributes: &Value,
    reasons: &[ConversationUpdateReason],
) -> TransitionResult {
    if !reasons.contains(&ConversationUpdateReason::Attributes) {
        return TransitionResult::unchanged(state);
    }
    let Some(typing) = attributes.get(TYPING_ATTRIBUTE).and_then(Value::as_bool) else {
        return TransitionResult::unchanged(state);
    };
    if typing == state.assistant_typing {
        return TransitionResult::unchanged(state);
    }

    let event = if typing {
        AssistantEvent::AssistantTypingStarted
    } else {
        AssistantEvent::AssistantTypingEnded
    };
    TransitionResult::new(SessionState {
        assistant_typing: typing,
        ..state.clone()
    })
    .with_effect(Effect::Emit(event))
}

/// History minus UI-tool commands, keeping the last copy of any repeated sid
fn visible_history(history: Vec<Message>) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::with_capacity(history.len());
    for message in history.into_iter().filter(|m| !m.is_ui_tool()) {
        match messages.iter().position(|m| m.sid == message.sid) {
            Some(pos) => messages[pos] = message,
            None => messages.push(message),
        }
    }
    messages
}
