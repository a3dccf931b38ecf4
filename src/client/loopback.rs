//! In-process conversation backend
//!
//! Implements the client traits entirely in memory. The backend handle plays
//! the service side: it moves clients between connection states and acts as
//! the assistant (replies, UI-tool commands, typing indicator). Used by the
//! console binary and by tests.

use super::{
    ClientError, ClientFactory, ConnectionState, Conversation, ConversationClient,
    ConversationEvent, ConversationStatus, ConversationUpdateReason, CreateConversationOptions,
    Message, MessageUpdateReason, ASSISTANT_AUTHOR, MESSAGE_TYPE_ATTRIBUTE, TYPING_ATTRIBUTE,
    UI_TOOL_MESSAGE_TYPE,
};
use crate::token::identity_from_token;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Identity used when a token carries no identity claim
pub const DEFAULT_IDENTITY: &str = "anonymous";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend operations that can be counted or made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopbackOp {
    CreateConversation,
    GetConversation,
    Join,
    GetMessages,
    SendMessage,
    UpdateToken,
}

/// Handle to the in-memory backend
#[derive(Clone)]
pub struct LoopbackBackend {
    shared: Arc<Shared>,
}

struct Shared {
    default_identity: String,
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    clients: Mutex<Vec<Arc<LoopbackClient>>>,
    failures: Mutex<Vec<(LoopbackOp, ClientError)>>,
    calls: Mutex<HashMap<LoopbackOp, usize>>,
}

impl Shared {
    /// Record a call and return the injected failure for it, if any
    fn enter(&self, op: LoopbackOp) -> Result<(), ClientError> {
        *lock(&self.calls).entry(op).or_insert(0) += 1;
        let mut failures = lock(&self.failures);
        match failures.iter().position(|(o, _)| *o == op) {
            Some(pos) => Err(failures.remove(pos).1),
            None => Ok(()),
        }
    }

    fn room(&self, sid: &str) -> Result<Arc<Room>, ClientError> {
        lock(&self.rooms)
            .get(sid)
            .cloned()
            .ok_or_else(|| ClientError::not_found(format!("conversation {sid} not found")))
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY)
    }
}

impl LoopbackBackend {
    pub fn new(default_identity: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                default_identity: default_identity.into(),
                rooms: Mutex::new(HashMap::new()),
                clients: Mutex::new(Vec::new()),
                failures: Mutex::new(Vec::new()),
                calls: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Move every live client to `state`
    pub fn set_connection_state(&self, state: ConnectionState) {
        for client in lock(&self.shared.clients).iter() {
            client.set_state(state);
        }
    }

    /// Number of clients that have not been shut down
    pub fn live_clients(&self) -> usize {
        lock(&self.shared.clients).len()
    }

    /// Token most recently handed to the newest live client
    pub fn current_token(&self) -> Option<String> {
        lock(&self.shared.clients)
            .last()
            .map(|c| lock(&c.token).clone())
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: LoopbackOp, error: ClientError) {
        lock(&self.shared.failures).push((op, error));
    }

    /// How many times `op` was invoked
    pub fn calls(&self, op: LoopbackOp) -> usize {
        lock(&self.shared.calls).get(&op).copied().unwrap_or(0)
    }

    /// Create a conversation on the service side
    pub fn seed_conversation(&self, friendly_name: &str, attributes: Value) -> String {
        let room = Room::new(friendly_name, attributes);
        let sid = room.sid.clone();
        lock(&self.shared.rooms).insert(sid.clone(), room);
        sid
    }

    pub fn conversation_sids(&self) -> Vec<String> {
        lock(&self.shared.rooms).keys().cloned().collect()
    }

    pub fn friendly_name(&self, conversation_sid: &str) -> Result<String, ClientError> {
        Ok(self.shared.room(conversation_sid)?.friendly_name.clone())
    }

    pub fn conversation_attributes(&self, conversation_sid: &str) -> Result<Value, ClientError> {
        Ok(lock(&self.shared.room(conversation_sid)?.inner).attributes.clone())
    }

    pub fn participants(&self, conversation_sid: &str) -> Result<Vec<String>, ClientError> {
        let room = self.shared.room(conversation_sid)?;
        let mut participants: Vec<String> =
            lock(&room.inner).participants.iter().cloned().collect();
        participants.sort();
        Ok(participants)
    }

    pub fn messages(&self, conversation_sid: &str) -> Result<Vec<Message>, ClientError> {
        Ok(lock(&self.shared.room(conversation_sid)?.inner).messages.clone())
    }

    /// Add a message as any author
    pub fn push_message(
        &self,
        conversation_sid: &str,
        author: &str,
        body: &str,
        attributes: Value,
    ) -> Result<Message, ClientError> {
        Ok(self
            .shared
            .room(conversation_sid)?
            .add_message(author, body, attributes))
    }

    /// Add a visible assistant reply
    pub fn reply(&self, conversation_sid: &str, text: &str) -> Result<Message, ClientError> {
        self.push_message(conversation_sid, ASSISTANT_AUTHOR, text, json!({}))
    }

    /// Send a UI-tool command from the assistant
    pub fn trigger_ui_tool(
        &self,
        conversation_sid: &str,
        name: &str,
        data: Value,
    ) -> Result<Message, ClientError> {
        let body = json!({ "name": name, "data": data }).to_string();
        self.push_raw_ui_tool(conversation_sid, &body)
    }

    /// Send a UI-tool message with an arbitrary body
    pub fn push_raw_ui_tool(
        &self,
        conversation_sid: &str,
        body: &str,
    ) -> Result<Message, ClientError> {
        self.push_message(
            conversation_sid,
            ASSISTANT_AUTHOR,
            body,
            json!({ MESSAGE_TYPE_ATTRIBUTE: UI_TOOL_MESSAGE_TYPE }),
        )
    }

    pub fn edit_message(
        &self,
        conversation_sid: &str,
        message_sid: &str,
        body: &str,
    ) -> Result<Message, ClientError> {
        self.shared
            .room(conversation_sid)?
            .edit_message(message_sid, body)
    }

    pub fn remove_message(
        &self,
        conversation_sid: &str,
        message_sid: &str,
    ) -> Result<Message, ClientError> {
        self.shared
            .room(conversation_sid)?
            .remove_message(message_sid)
    }

    /// Merge `patch` into the conversation attributes and notify listeners
    pub fn update_attributes(
        &self,
        conversation_sid: &str,
        patch: Map<String, Value>,
    ) -> Result<(), ClientError> {
        self.shared.room(conversation_sid)?.update_attributes(patch);
        Ok(())
    }

    /// Toggle the assistant typing indicator
    pub fn set_typing(&self, conversation_sid: &str, typing: bool) -> Result<(), ClientError> {
        let mut patch = Map::new();
        patch.insert(TYPING_ATTRIBUTE.to_string(), Value::Bool(typing));
        self.update_attributes(conversation_sid, patch)
    }

    /// Move a conversation to `status`. Closed conversations refuse joins.
    pub fn set_conversation_status(
        &self,
        conversation_sid: &str,
        status: ConversationStatus,
    ) -> Result<(), ClientError> {
        lock(&self.shared.room(conversation_sid)?.inner).status = status;
        Ok(())
    }
}

impl ClientFactory for LoopbackBackend {
    fn connect(&self, token: &str) -> Arc<dyn ConversationClient> {
        let identity = identity_from_token(token).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Token has no readable identity, using default");
            self.shared.default_identity.clone()
        });
        let (state_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let client = Arc::new(LoopbackClient {
            shared: Arc::clone(&self.shared),
            identity,
            token: Mutex::new(token.to_string()),
            state: Mutex::new(ConnectionState::Unknown),
            state_tx: Mutex::new(Some(state_tx)),
            shut_down: AtomicBool::new(false),
        });
        lock(&self.shared.clients).push(Arc::clone(&client));
        client
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client half of the loopback backend
pub struct LoopbackClient {
    shared: Arc<Shared>,
    identity: String,
    token: Mutex<String>,
    state: Mutex<ConnectionState>,
    /// Taken on shutdown so receivers observe `Closed`
    state_tx: Mutex<Option<broadcast::Sender<ConnectionState>>>,
    shut_down: AtomicBool,
}

impl LoopbackClient {
    fn set_state(&self, state: ConnectionState) {
        if self.is_shut_down() {
            return;
        }
        let mut current = lock(&self.state);
        if *current != state {
            *current = state;
            if let Some(tx) = lock(&self.state_tx).as_ref() {
                let _ = tx.send(state);
            }
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), ClientError> {
        if self.is_shut_down() {
            Err(ClientError::unavailable("client has been shut down"))
        } else {
            Ok(())
        }
    }

    fn handle(&self, room: Arc<Room>) -> Arc<dyn Conversation> {
        Arc::new(LoopbackConversation {
            shared: Arc::clone(&self.shared),
            room,
            identity: self.identity.clone(),
        })
    }
}

#[async_trait]
impl ConversationClient for LoopbackClient {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn connection_state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionState> {
        if let Some(tx) = lock(&self.state_tx).as_ref() {
            return tx.subscribe();
        }
        // Already shut down: hand out a receiver that is closed from the start
        broadcast::channel(1).1
    }

    async fn create_conversation(
        &self,
        options: CreateConversationOptions,
    ) -> Result<Arc<dyn Conversation>, ClientError> {
        self.ensure_live()?;
        self.shared.enter(LoopbackOp::CreateConversation)?;
        let room = Room::new(&options.friendly_name, options.attributes);
        lock(&self.shared.rooms).insert(room.sid.clone(), Arc::clone(&room));
        Ok(self.handle(room))
    }

    async fn get_conversation(&self, sid: &str) -> Result<Arc<dyn Conversation>, ClientError> {
        self.ensure_live()?;
        self.shared.enter(LoopbackOp::GetConversation)?;
        let room = self.shared.room(sid)?;
        Ok(self.handle(room))
    }

    async fn update_token(&self, token: &str) -> Result<(), ClientError> {
        self.ensure_live()?;
        self.shared.enter(LoopbackOp::UpdateToken)?;
        *lock(&self.token) = token.to_string();
        Ok(())
    }

    fn shutdown(&self) {
        self.set_state(ConnectionState::Disconnected);
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.state_tx).take();
        lock(&self.shared.clients).retain(|c| !std::ptr::eq(Arc::as_ptr(c), self));
    }
}

// ============================================================================
// Conversations
// ============================================================================

struct Room {
    sid: String,
    friendly_name: String,
    inner: Mutex<RoomState>,
    events_tx: broadcast::Sender<ConversationEvent>,
}

struct RoomState {
    status: ConversationStatus,
    attributes: Value,
    participants: HashSet<String>,
    messages: Vec<Message>,
    next_index: u64,
}

impl Room {
    fn new(friendly_name: &str, attributes: Value) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            sid: format!("CH{}", uuid::Uuid::new_v4().simple()),
            friendly_name: friendly_name.to_string(),
            inner: Mutex::new(RoomState {
                status: ConversationStatus::Active,
                attributes,
                participants: HashSet::new(),
                messages: Vec::new(),
                next_index: 0,
            }),
            events_tx,
        })
    }

    fn add_message(&self, author: &str, body: &str, attributes: Value) -> Message {
        let message = {
            let mut inner = lock(&self.inner);
            let message = Message::new(format!("IM{}", uuid::Uuid::new_v4().simple()), author, body)
                .with_index(inner.next_index)
                .with_attributes(attributes)
                .with_date_updated(Utc::now());
            inner.next_index += 1;
            inner.messages.push(message.clone());
            message
        };
        let _ = self
            .events_tx
            .send(ConversationEvent::MessageAdded(message.clone()));
        message
    }

    fn edit_message(&self, message_sid: &str, body: &str) -> Result<Message, ClientError> {
        let message = {
            let mut inner = lock(&self.inner);
            let message = inner
                .messages
                .iter_mut()
                .find(|m| m.sid == message_sid)
                .ok_or_else(|| ClientError::not_found(format!("message {message_sid} not found")))?;
            message.body = Some(body.to_string());
            message.date_updated = Some(Utc::now());
            message.clone()
        };
        let _ = self.events_tx.send(ConversationEvent::MessageUpdated {
            message: message.clone(),
            reasons: vec![MessageUpdateReason::Body, MessageUpdateReason::DateUpdated],
        });
        Ok(message)
    }

    fn remove_message(&self, message_sid: &str) -> Result<Message, ClientError> {
        let message = {
            let mut inner = lock(&self.inner);
            let pos = inner
                .messages
                .iter()
                .position(|m| m.sid == message_sid)
                .ok_or_else(|| ClientError::not_found(format!("message {message_sid} not found")))?;
            inner.messages.remove(pos)
        };
        let _ = self
            .events_tx
            .send(ConversationEvent::MessageRemoved(message.clone()));
        Ok(message)
    }

    fn update_attributes(&self, patch: Map<String, Value>) {
        let attributes = {
            let mut inner = lock(&self.inner);
            if !inner.attributes.is_object() {
                inner.attributes = Value::Object(Map::new());
            }
            if let Value::Object(current) = &mut inner.attributes {
                current.extend(patch);
            }
            inner.attributes.clone()
        };
        let _ = self.events_tx.send(ConversationEvent::Updated {
            attributes,
            reasons: vec![ConversationUpdateReason::Attributes],
        });
    }
}

/// A room as seen by one client identity
struct LoopbackConversation {
    shared: Arc<Shared>,
    room: Arc<Room>,
    identity: String,
}

#[async_trait]
impl Conversation for LoopbackConversation {
    fn sid(&self) -> &str {
        &self.room.sid
    }

    fn status(&self) -> Option<ConversationStatus> {
        Some(lock(&self.room.inner).status)
    }

    fn attributes(&self) -> Value {
        lock(&self.room.inner).attributes.clone()
    }

    fn events(&self) -> broadcast::Receiver<ConversationEvent> {
        self.room.events_tx.subscribe()
    }

    async fn join(&self) -> Result<(), ClientError> {
        self.shared.enter(LoopbackOp::Join)?;
        let mut inner = lock(&self.room.inner);
        if inner.status == ConversationStatus::Closed {
            return Err(ClientError::unavailable(format!(
                "conversation {} is closed",
                self.room.sid
            )));
        }
        if !inner.participants.insert(self.identity.clone()) {
            return Err(ClientError::conflict(format!(
                "{} is already a participant of {}",
                self.identity, self.room.sid
            )));
        }
        Ok(())
    }

    async fn get_messages(&self) -> Result<Vec<Message>, ClientError> {
        self.shared.enter(LoopbackOp::GetMessages)?;
        Ok(lock(&self.room.inner).messages.clone())
    }

    async fn send_message(&self, body: &str) -> Result<(), ClientError> {
        self.shared.enter(LoopbackOp::SendMessage)?;
        if !lock(&self.room.inner).participants.contains(&self.identity) {
            return Err(ClientError::forbidden(format!(
                "{} is not a participant of {}",
                self.identity, self.room.sid
            )));
        }
        self.room.add_message(&self.identity, body, json!({}));
        Ok(())
    }
}
