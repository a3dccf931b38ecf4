//! Test helpers shared across modules

use crate::assistant::{AssistantEvent, AssistantEventKind, EventBus, JoinedConversation, UiToolInvocation};
use crate::client::ConnectionState;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Records every event published on a bus
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<AssistantEvent>>>,
}

impl EventLog {
    pub fn attach(bus: &EventBus) -> Self {
        let log = Self::default();
        let events = Arc::clone(&log.events);
        bus.subscribe_all(move |event| events.lock().unwrap().push(event.clone()));
        log
    }

    pub fn events(&self) -> Vec<AssistantEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<AssistantEventKind> {
        self.events().iter().map(AssistantEvent::kind).collect()
    }

    pub fn count(&self, kind: AssistantEventKind) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn statuses(&self) -> Vec<ConnectionState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AssistantEvent::StatusChanged(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn joined(&self) -> Option<JoinedConversation> {
        self.events().into_iter().find_map(|e| match e {
            AssistantEvent::JoinedConversation(joined) => Some(joined),
            _ => None,
        })
    }

    pub fn tools(&self) -> Vec<UiToolInvocation> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AssistantEvent::UiToolTriggered(tool) => Some(tool),
                _ => None,
            })
            .collect()
    }
}
