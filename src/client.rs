//! Conversation client abstraction
//!
//! The real-time messaging backend is an external collaborator. These traits
//! are the seam the assistant adapter talks through, so the adapter can run
//! against the production SDK binding, the in-process loopback backend, or a
//! test mock.

mod error;
pub mod loopback;
mod types;

pub use error::{ClientError, ClientErrorKind};
pub use types::*;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A connected real-time conversation client, constructed from one credential
#[async_trait]
pub trait ConversationClient: Send + Sync {
    /// Identity of the authenticated user
    fn identity(&self) -> String;

    /// Current transport state
    fn connection_state(&self) -> ConnectionState;

    /// Subscribe to transport state changes. Dropping the receiver detaches the listener.
    fn connection_events(&self) -> broadcast::Receiver<ConnectionState>;

    /// Create a new conversation
    async fn create_conversation(
        &self,
        options: CreateConversationOptions,
    ) -> Result<Arc<dyn Conversation>, ClientError>;

    /// Fetch an existing conversation by sid
    async fn get_conversation(&self, sid: &str) -> Result<Arc<dyn Conversation>, ClientError>;

    /// Replace the credential on a live connection
    async fn update_token(&self, token: &str) -> Result<(), ClientError>;

    /// Close the connection and release backend resources
    fn shutdown(&self);
}

/// Handle to a single conversation on the backend
#[async_trait]
pub trait Conversation: Send + Sync {
    fn sid(&self) -> &str;

    /// Backend-reported state, if known
    fn status(&self) -> Option<ConversationStatus>;

    fn attributes(&self) -> Value;

    /// Subscribe to message and conversation updates. Dropping the receiver detaches the listener.
    fn events(&self) -> broadcast::Receiver<ConversationEvent>;

    /// Add the current user as a participant
    async fn join(&self) -> Result<(), ClientError>;

    /// Full message history, oldest first
    async fn get_messages(&self) -> Result<Vec<Message>, ClientError>;

    async fn send_message(&self, body: &str) -> Result<(), ClientError>;
}

/// Builds a client for a credential
pub trait ClientFactory: Send + Sync {
    fn connect(&self, token: &str) -> Arc<dyn ConversationClient>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ConversationClient + ?Sized> ConversationClient for Arc<T> {
    fn identity(&self) -> String {
        (**self).identity()
    }

    fn connection_state(&self) -> ConnectionState {
        (**self).connection_state()
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionState> {
        (**self).connection_events()
    }

    async fn create_conversation(
        &self,
        options: CreateConversationOptions,
    ) -> Result<Arc<dyn Conversation>, ClientError> {
        (**self).create_conversation(options).await
    }

    async fn get_conversation(&self, sid: &str) -> Result<Arc<dyn Conversation>, ClientError> {
        (**self).get_conversation(sid).await
    }

    async fn update_token(&self, token: &str) -> Result<(), ClientError> {
        (**self).update_token(token).await
    }

    fn shutdown(&self) {
        (**self).shutdown();
    }
}

impl<T: ClientFactory + ?Sized> ClientFactory for Arc<T> {
    fn connect(&self, token: &str) -> Arc<dyn ConversationClient> {
        (**self).connect(token)
    }
}
