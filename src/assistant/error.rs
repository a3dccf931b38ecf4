//! Assistant adapter errors

use crate::client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("failed to create conversation: {0}")]
    CreateConversation(#[source] ClientError),

    #[error("failed to fetch conversation {sid}: {source}")]
    FetchConversation { sid: String, source: ClientError },

    #[error("failed to join conversation {sid}: {source}")]
    Join { sid: String, source: ClientError },

    #[error("failed to load messages of conversation {sid}: {source}")]
    FetchMessages { sid: String, source: ClientError },

    #[error("failed to send message to conversation {sid}: {source}")]
    Send { sid: String, source: ClientError },

    #[error("failed to update token: {0}")]
    UpdateToken(#[source] ClientError),

    #[error("assistant has been destroyed")]
    Destroyed,
}
