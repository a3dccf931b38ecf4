//! Assistant event adapter
//!
//! Owns one conversation client and re-publishes its events in the assistant
//! vocabulary. Client listeners are pumped on spawned tasks into a pure
//! [`transition`], and the resulting effects are executed here.

mod bus;
mod effect;
mod error;
pub mod event;
mod state;
mod transition;
mod ui_tool;

#[cfg(test)]
mod proptests;

pub use bus::{EventBus, Handler, SubscriptionId};
pub use effect::Effect;
pub use error::AssistantError;
pub use event::{AssistantEvent, AssistantEventKind, ClientEvent, JoinedConversation};
pub use state::{ConversationPhase, SessionState};
pub use transition::{transition, TransitionResult};
pub use ui_tool::{UiToolError, UiToolInvocation};

use crate::client::{
    ClientFactory, ConnectionState, Conversation, ConversationClient, ConversationStatus,
    CreateConversationOptions, Message,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// Conversation attribute linking a conversation to its assistant
pub const ASSISTANT_SID_ATTRIBUTE: &str = "assistantSid";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Human-readable name for a newly created assistant conversation
pub fn conversation_friendly_name(identity: &str, now: DateTime<Utc>) -> String {
    format!(
        "Assistant Conversation {identity} - {}",
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Outcome of [`Assistant::start`]
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Joined {
        conversation_sid: String,
        messages: Vec<Message>,
    },
    /// A conversation was already joined or being joined; nothing was done
    AlreadyStarted,
}

/// Adapter between a conversation client and assistant consumers
pub struct Assistant {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn ConversationClient>,
    state: Mutex<SessionState>,
    phase: Mutex<ConversationPhase>,
    bus: EventBus,
    /// Cancels every listener pump
    listeners: CancellationToken,
    destroyed: AtomicBool,
}

impl Assistant {
    /// Connect a client for `token`.
    ///
    /// Returns `None` without touching the factory when the token is empty.
    /// Must be called from within a Tokio runtime.
    pub fn initialize(factory: &dyn ClientFactory, token: &str) -> Option<Self> {
        if token.is_empty() {
            tracing::debug!("No token supplied, assistant not initialized");
            return None;
        }

        let client = factory.connect(token);
        let connection_events = client.connection_events();
        tracing::info!(identity = %client.identity(), "Assistant client initialized");

        let inner = Arc::new(Inner {
            client,
            state: Mutex::new(SessionState::default()),
            phase: Mutex::new(ConversationPhase::NotJoined),
            bus: EventBus::new(),
            listeners: CancellationToken::new(),
            destroyed: AtomicBool::new(false),
        });
        inner.spawn_listener(connection_events, ClientEvent::ConnectionStateChanged);

        Some(Self { inner })
    }

    /// Acquire and join the session's conversation.
    ///
    /// Creates a new conversation tagged with `assistant_sid` when
    /// `conversation_sid` is `None`, otherwise resumes the given one. Skipped
    /// when a conversation is already joined or being joined.
    pub async fn start(
        &self,
        assistant_sid: &str,
        conversation_sid: Option<&str>,
    ) -> Result<StartOutcome, AssistantError> {
        {
            let mut phase = lock(&self.inner.phase);
            if self.inner.is_destroyed() {
                return Err(AssistantError::Destroyed);
            }
            if phase.is_started() {
                tracing::debug!(phase = phase.name(), "Conversation already started, skipping");
                return Ok(StartOutcome::AlreadyStarted);
            }
            *phase = ConversationPhase::Joining;
        }

        match self.inner.join(assistant_sid, conversation_sid).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start assistant conversation");
                let mut phase = lock(&self.inner.phase);
                if matches!(*phase, ConversationPhase::Joining) {
                    *phase = ConversationPhase::Failed(e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Send `text` on the joined conversation.
    ///
    /// Returns `Ok(false)` without any network call when no conversation is
    /// joined yet. The sent message shows up through the backend echo, not
    /// by local insertion.
    pub async fn send_message(&self, text: &str) -> Result<bool, AssistantError> {
        let Some(conversation) = self.conversation() else {
            return Ok(false);
        };
        conversation
            .send_message(text)
            .await
            .map_err(|source| AssistantError::Send {
                sid: conversation.sid().to_string(),
                source,
            })?;
        Ok(true)
    }

    /// Hand a refreshed credential to the client; conversation state is kept
    pub async fn update_token(&self, token: &str) -> Result<(), AssistantError> {
        if self.inner.is_destroyed() {
            return Err(AssistantError::Destroyed);
        }
        self.inner
            .client
            .update_token(token)
            .await
            .map_err(AssistantError::UpdateToken)
    }

    /// Detach every listener and shut the client down. Idempotent.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    pub fn identity(&self) -> String {
        self.inner.client.identity()
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.inner.state).connection
    }

    /// Snapshot of the visible message list
    pub fn messages(&self) -> Vec<Message> {
        lock(&self.inner.state).messages.clone()
    }

    pub fn is_assistant_typing(&self) -> bool {
        lock(&self.inner.state).assistant_typing
    }

    pub fn phase(&self) -> ConversationPhase {
        lock(&self.inner.phase).clone()
    }

    pub fn conversation_sid(&self) -> Option<String> {
        self.conversation().map(|c| c.sid().to_string())
    }

    fn conversation(&self) -> Option<Arc<dyn Conversation>> {
        lock(&self.inner.phase).conversation().cloned()
    }

    /// Typed subscriptions
    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Stream of every event published from now on
    pub fn event_stream(&self) -> BroadcastStream<AssistantEvent> {
        self.inner.bus.stream()
    }

    /// Detach all consumer handlers without destroying the client
    pub fn remove_all_listeners(&self) {
        self.inner.bus.clear();
    }

    /// Feed a client event through the adapter as if a listener delivered it
    #[cfg(test)]
    pub(crate) fn apply(&self, event: ClientEvent) {
        self.inner.apply(event);
    }
}

impl Drop for Assistant {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}

impl Inner {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.listeners.cancel();
        self.bus.clear();
        self.client.shutdown();
        tracing::info!(phase = lock(&self.phase).name(), "Assistant destroyed");
    }

    /// Forward events from a client listener until destroyed or the source closes
    fn spawn_listener<T, F>(self: &Arc<Self>, mut rx: broadcast::Receiver<T>, map: F)
    where
        T: Clone + Send + 'static,
        F: Fn(T) -> ClientEvent + Send + 'static,
    {
        let inner = Arc::clone(self);
        let cancel = self.listeners.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => inner.apply(map(event)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Client listener lagged, events were dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    fn apply(&self, event: ClientEvent) {
        if self.is_destroyed() {
            return;
        }
        let effects = {
            let mut state = lock(&self.state);
            let result = transition(&state, event);
            *state = result.new_state;
            result.effects
        };
        for effect in effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&self, effect: Effect) {
        match effect {
            Effect::Emit(event) => self.bus.emit(&event),
            Effect::RejectToolPayload { message_sid, error } => {
                tracing::error!(message_sid = %message_sid, error = %error, "Dropping malformed ui-tool message");
            }
        }
    }

    async fn acquire(
        &self,
        assistant_sid: &str,
        conversation_sid: Option<&str>,
    ) -> Result<Arc<dyn Conversation>, AssistantError> {
        match conversation_sid {
            None => {
                let options = CreateConversationOptions {
                    friendly_name: conversation_friendly_name(&self.client.identity(), Utc::now()),
                    attributes: json!({ ASSISTANT_SID_ATTRIBUTE: assistant_sid }),
                };
                self.client
                    .create_conversation(options)
                    .await
                    .map_err(AssistantError::CreateConversation)
            }
            Some(sid) => self
                .client
                .get_conversation(sid)
                .await
                .map_err(|source| AssistantError::FetchConversation {
                    sid: sid.to_string(),
                    source,
                }),
        }
    }

    async fn join(
        self: &Arc<Self>,
        assistant_sid: &str,
        conversation_sid: Option<&str>,
    ) -> Result<StartOutcome, AssistantError> {
        let conversation = self.acquire(assistant_sid, conversation_sid).await?;
        let sid = conversation.sid().to_string();

        if let Err(source) = conversation.join().await {
            if conversation.status() == Some(ConversationStatus::Active) {
                tracing::warn!(conversation_sid = %sid, error = %source, "Join failed on an active conversation, treating as joined");
            } else {
                return Err(AssistantError::Join { sid, source });
            }
        }

        // Listen before fetching history so nothing delivered in between is lost
        let events = conversation.events();
        let history = conversation
            .get_messages()
            .await
            .map_err(|source| AssistantError::FetchMessages {
                sid: sid.clone(),
                source,
            })?;

        {
            let mut phase = lock(&self.phase);
            if self.is_destroyed() {
                return Err(AssistantError::Destroyed);
            }
            *phase = ConversationPhase::Joined(Arc::clone(&conversation));
        }

        let identity = self.client.identity();
        tracing::info!(conversation_sid = %sid, identity = %identity, messages = history.len(), "Joined assistant conversation");
        self.bus
            .emit(&AssistantEvent::JoinedConversation(JoinedConversation {
                conversation_sid: sid.clone(),
                identity,
            }));
        self.apply(ClientEvent::HistoryLoaded(history));
        self.spawn_listener(events, ClientEvent::Conversation);

        let messages = lock(&self.state).messages.clone();
        Ok(StartOutcome::Joined {
            conversation_sid: sid,
            messages,
        })
    }
}
