//! Property-based tests for event translation
//!
//! These tests verify the message-list invariants hold across arbitrary
//! sequences of client events.

use super::effect::Effect;
use super::event::{AssistantEvent, ClientEvent};
use super::state::SessionState;
use super::transition::transition;
use crate::client::{ConversationEvent, ConversationUpdateReason, Message, MessageUpdateReason};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_sid() -> impl Strategy<Value = String> {
    (0u8..12).prop_map(|n| format!("IM{n}"))
}

fn arb_visible_message() -> impl Strategy<Value = Message> {
    (arb_sid(), prop_oneof![Just("system"), Just("alice")], "[a-z ]{0,12}")
        .prop_map(|(sid, author, body)| Message::new(sid, author, body))
}

fn arb_tool_message() -> impl Strategy<Value = Message> {
    (
        arb_sid(),
        prop_oneof![
            Just(r#"{"name":"fillForm","data":{"x":1}}"#.to_string()),
            Just("not json".to_string()),
            "[a-z]{0,8}",
        ],
    )
        .prop_map(|(sid, body)| {
            Message::new(sid, "system", body)
                .with_attributes(json!({ "assistantMessageType": "ui-tool" }))
        })
}

fn arb_message() -> impl Strategy<Value = Message> {
    prop_oneof![3 => arb_visible_message(), 1 => arb_tool_message()]
}

fn arb_event() -> impl Strategy<Value = ClientEvent> {
    prop_oneof![
        4 => arb_message().prop_map(|m| ClientEvent::Conversation(ConversationEvent::MessageAdded(m))),
        2 => arb_message().prop_map(|message| ClientEvent::Conversation(ConversationEvent::MessageUpdated {
            message,
            reasons: vec![MessageUpdateReason::Body],
        })),
        2 => arb_visible_message().prop_map(|m| ClientEvent::Conversation(ConversationEvent::MessageRemoved(m))),
        1 => any::<bool>().prop_map(|typing| ClientEvent::Conversation(ConversationEvent::Updated {
            attributes: json!({ "assistantIsTyping": typing }),
            reasons: vec![ConversationUpdateReason::Attributes],
        })),
    ]
}

fn run(events: Vec<ClientEvent>) -> (SessionState, Vec<Effect>) {
    let mut state = SessionState::default();
    let mut effects = Vec::new();
    for event in events {
        let result = transition(&state, event);
        state = result.new_state;
        effects.extend(result.effects);
    }
    (state, effects)
}

proptest! {
    #[test]
    fn prop_messages_never_hold_tools_or_duplicates(events in proptest::collection::vec(arb_event(), 0..40)) {
        let (state, _) = run(events);

        prop_assert!(state.messages.iter().all(|m| !m.is_ui_tool()));
        let unique: HashSet<&str> = state.messages.iter().map(|m| m.sid.as_str()).collect();
        prop_assert_eq!(unique.len(), state.messages.len());
    }

    #[test]
    fn prop_unique_adds_preserve_arrival_order(
        messages in proptest::collection::vec(arb_message(), 0..30)
    ) {
        // Give every message a distinct sid
        let messages: Vec<Message> = messages
            .into_iter()
            .enumerate()
            .map(|(i, mut m)| { m.sid = format!("IM{i}"); m })
            .collect();
        let expected: Vec<String> = messages
            .iter()
            .filter(|m| !m.is_ui_tool())
            .map(|m| m.sid.clone())
            .collect();

        let events = messages
            .into_iter()
            .map(|m| ClientEvent::Conversation(ConversationEvent::MessageAdded(m)))
            .collect();
        let (state, _) = run(events);

        let actual: Vec<String> = state.messages.iter().map(|m| m.sid.clone()).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_update_keeps_length_and_index(
        count in 1usize..10,
        target in 0usize..10,
        body in "[a-z]{1,8}",
    ) {
        let target = target % count;
        let adds = (0..count)
            .map(|i| ClientEvent::Conversation(ConversationEvent::MessageAdded(Message::new(format!("IM{i}"), "alice", "old"))))
            .collect();
        let (state, _) = run(adds);

        let result = transition(&state, ConversationEvent::MessageUpdated {
            message: Message::new(format!("IM{target}"), "alice", body.clone()),
            reasons: vec![MessageUpdateReason::Body],
        }.into());

        prop_assert_eq!(result.new_state.messages.len(), count);
        prop_assert_eq!(result.new_state.messages[target].body.as_deref(), Some(body.as_str()));
        let target_sid = format!("IM{target}");
        prop_assert_eq!(&result.new_state.messages[target].sid, &target_sid);
    }

    #[test]
    fn prop_remove_drops_exactly_one(count in 1usize..10, target in 0usize..20) {
        let adds = (0..count)
            .map(|i| ClientEvent::Conversation(ConversationEvent::MessageAdded(Message::new(format!("IM{i}"), "alice", "x"))))
            .collect();
        let (state, _) = run(adds);

        let result = transition(&state, ConversationEvent::MessageRemoved(
            Message::new(format!("IM{target}"), "alice", "x"),
        ).into());

        if target < count {
            let removed_sid = format!("IM{target}");
            let gone = result.new_state.position(&removed_sid).is_none();
            prop_assert_eq!(result.new_state.messages.len(), count - 1);
            prop_assert!(gone);
        } else {
            prop_assert_eq!(result.new_state, state);
        }
    }

    #[test]
    fn prop_typing_events_only_on_change(values in proptest::collection::vec(any::<bool>(), 0..20)) {
        let events = values
            .iter()
            .map(|&typing| ClientEvent::Conversation(ConversationEvent::Updated {
                attributes: json!({ "assistantIsTyping": typing }),
                reasons: vec![ConversationUpdateReason::Attributes],
            }))
            .collect();
        let (_, effects) = run(events);

        // Expected: one event per flip, starting from "not typing"
        let mut previous = false;
        let mut expected = Vec::new();
        for typing in values {
            if typing != previous {
                expected.push(if typing {
                    AssistantEvent::AssistantTypingStarted
                } else {
                    AssistantEvent::AssistantTypingEnded
                });
                previous = typing;
            }
        }
        let actual: Vec<AssistantEvent> = effects
            .into_iter()
            .filter_map(|e| match e {
                Effect::Emit(event) => Some(event),
                Effect::RejectToolPayload { .. } => None,
            })
            .collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_each_valid_tool_triggers_once(
        tools in proptest::collection::vec(arb_tool_message(), 0..15)
    ) {
        let valid = tools
            .iter()
            .filter(|m| m.body.as_deref() == Some(r#"{"name":"fillForm","data":{"x":1}}"#))
            .count();
        let events = tools
            .into_iter()
            .map(|m| ClientEvent::Conversation(ConversationEvent::MessageAdded(m)))
            .collect();
        let (state, effects) = run(events);

        let triggered = effects
            .iter()
            .filter(|e| matches!(e, Effect::Emit(AssistantEvent::UiToolTriggered(_))))
            .count();
        let rejected = effects
            .iter()
            .filter(|e| matches!(e, Effect::RejectToolPayload { .. }))
            .count();
        prop_assert_eq!(triggered, valid);
        prop_assert_eq!(triggered + rejected, effects.len());
        prop_assert!(state.messages.is_empty());
    }
}
