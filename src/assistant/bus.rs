//! Typed event subscriptions
//!
//! Handlers are keyed by [`AssistantEventKind`] and run synchronously on the
//! task that produced the event. Every event is also forwarded to a broadcast
//! channel for stream consumers.

use super::event::{AssistantEvent, AssistantEventKind, JoinedConversation};
use super::ui_tool::UiToolInvocation;
use crate::client::{ConnectionState, Message};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const STREAM_CAPACITY: usize = 128;

pub type Handler = Arc<dyn Fn(&AssistantEvent) + Send + Sync>;

/// Identifies a registration so it can be removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct EventBus {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<AssistantEventKind, Vec<(SubscriptionId, Handler)>>>,
    stream_tx: broadcast::Sender<AssistantEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (stream_tx, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(HashMap::new()),
            stream_tx,
        }
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<AssistantEventKind, Vec<(SubscriptionId, Handler)>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for one event kind
    pub fn subscribe(
        &self,
        kind: AssistantEventKind,
        handler: impl Fn(&AssistantEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Register one handler for every event kind
    pub fn subscribe_all(
        &self,
        handler: impl Fn(&AssistantEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler = Arc::new(handler);
        let mut handlers = self.handlers();
        for kind in AssistantEventKind::ALL {
            handlers
                .entry(kind)
                .or_default()
                .push((id, Arc::clone(&handler)));
        }
        id
    }

    /// Remove a registration; returns whether anything was removed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for list in self.handlers().values_mut() {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
        }
        removed
    }

    /// Drop every handler
    pub fn clear(&self) {
        self.handlers().clear();
    }

    pub fn handler_count(&self, kind: AssistantEventKind) -> usize {
        self.handlers().get(&kind).map_or(0, Vec::len)
    }

    /// Stream of every event published from now on
    pub fn stream(&self) -> BroadcastStream<AssistantEvent> {
        BroadcastStream::new(self.stream_tx.subscribe())
    }

    pub fn emit(&self, event: &AssistantEvent) {
        // Snapshot so handlers may (un)subscribe while running
        let handlers: Vec<Handler> = self
            .handlers()
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        tracing::trace!(event = %event.kind(), handlers = handlers.len(), "Emitting assistant event");
        for handler in handlers {
            handler(event);
        }
        let _ = self.stream_tx.send(event.clone());
    }

    // ------------------------------------------------------------------
    // Typed registration helpers
    // ------------------------------------------------------------------

    pub fn on_status_changed(
        &self,
        f: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(AssistantEventKind::StatusChanged, move |event| {
            if let AssistantEvent::StatusChanged(state) = event {
                f(*state);
            }
        })
    }

    pub fn on_messages_changed(
        &self,
        f: impl Fn(&[Message]) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(AssistantEventKind::MessagesChanged, move |event| {
            if let AssistantEvent::MessagesChanged(messages) = event {
                f(messages);
            }
        })
    }

    pub fn on_joined_conversation(
        &self,
        f: impl Fn(&JoinedConversation) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(AssistantEventKind::JoinedConversation, move |event| {
            if let AssistantEvent::JoinedConversation(joined) = event {
                f(joined);
            }
        })
    }

    pub fn on_typing_started(&self, f: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        self.subscribe(AssistantEventKind::AssistantTypingStarted, move |_| f())
    }

    pub fn on_typing_ended(&self, f: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        self.subscribe(AssistantEventKind::AssistantTypingEnded, move |_| f())
    }

    pub fn on_ui_tool(
        &self,
        f: impl Fn(&UiToolInvocation) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(AssistantEventKind::UiToolTriggered, move |event| {
            if let AssistantEvent::UiToolTriggered(tool) = event {
                f(tool);
            }
        })
    }
}
