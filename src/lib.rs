//! Assistant bridge
//!
//! Adapts a real-time conversation client into the small event vocabulary an
//! AI-assistant chat surface needs, and binds that adapter to a changing
//! access token.

pub mod assistant;
pub mod binding;
pub mod client;
pub mod config;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use assistant::{Assistant, AssistantError, AssistantEvent, AssistantEventKind, StartOutcome};
pub use binding::{AssistantBinding, AssistantView, BindingOptions, ToolHandlers};
pub use config::{AssistantConfig, ConfigError, LogFormat};
