//! Environment configuration

use crate::binding::BindingOptions;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err("expected `json` or `pretty`"),
        }
    }
}

/// Configuration for an assistant session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantConfig {
    /// Access token for the messaging backend
    pub token: Option<String>,
    pub assistant_sid: Option<String>,
    /// Conversation to resume
    pub conversation_sid: Option<String>,
    /// Identity the loopback backend falls back to when the token carries none
    pub identity: Option<String>,
    pub log_format: LogFormat,
}

impl AssistantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_format = match var("ASSISTANT_LOG_FORMAT") {
            None => LogFormat::default(),
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                key: "ASSISTANT_LOG_FORMAT",
                value,
                reason,
            })?,
        };

        Ok(Self {
            token: var("ASSISTANT_TOKEN"),
            assistant_sid: var("ASSISTANT_SID"),
            conversation_sid: var("ASSISTANT_CONVERSATION_SID"),
            identity: var("ASSISTANT_IDENTITY"),
            log_format,
        })
    }

    /// Binding options carrying the configured sids; handlers are left empty
    pub fn binding_options(&self) -> BindingOptions {
        BindingOptions {
            assistant_sid: self.assistant_sid.clone(),
            conversation_sid: self.conversation_sid.clone(),
            ..BindingOptions::default()
        }
    }
}
