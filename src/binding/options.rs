//! Binding configuration

use crate::assistant::UiToolInvocation;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Callback for one named ui tool
pub type ToolHandler = Arc<dyn Fn(&Map<String, Value>) + Send + Sync>;

/// Called with the sid of a conversation the binding had not been told about
pub type ConversationSetupHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Ui tool handlers keyed by tool name
#[derive(Clone, Default)]
pub struct ToolHandlers {
    handlers: HashMap<String, ToolHandler>,
}

impl ToolHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&Map<String, Value>) + Send + Sync + 'static,
    ) -> Self {
        self.insert(name, handler);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&Map<String, Value>) + Send + Sync + 'static,
    ) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler registered for `tool.name`. Returns false if none is.
    pub fn dispatch(&self, tool: &UiToolInvocation) -> bool {
        match self.handlers.get(&tool.name) {
            Some(handler) => {
                handler(&tool.data);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ToolHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_set().entries(names).finish()
    }
}

/// How an [`AssistantBinding`](super::AssistantBinding) drives its adapter
#[derive(Clone, Default)]
pub struct BindingOptions {
    /// Assistant to attach new conversations to; without it nothing is started
    pub assistant_sid: Option<String>,
    /// Conversation to resume instead of creating one
    pub conversation_sid: Option<String>,
    pub tool_handlers: ToolHandlers,
    pub on_conversation_setup: Option<ConversationSetupHandler>,
}

impl BindingOptions {
    pub fn new(assistant_sid: impl Into<String>) -> Self {
        Self {
            assistant_sid: Some(assistant_sid.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_conversation_sid(mut self, conversation_sid: impl Into<String>) -> Self {
        self.conversation_sid = Some(conversation_sid.into());
        self
    }

    #[must_use]
    pub fn with_tool_handlers(mut self, tool_handlers: ToolHandlers) -> Self {
        self.tool_handlers = tool_handlers;
        self
    }

    #[must_use]
    pub fn on_conversation_setup(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_conversation_setup = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for BindingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingOptions")
            .field("assistant_sid", &self.assistant_sid)
            .field("conversation_sid", &self.conversation_sid)
            .field("tool_handlers", &self.tool_handlers)
            .field("on_conversation_setup", &self.on_conversation_setup.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn invocation(name: &str) -> UiToolInvocation {
        UiToolInvocation::parse(&json!({ "name": name, "data": { "k": "v" } }).to_string())
            .unwrap()
    }

    #[test]
    fn test_dispatch_matches_name_only() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handlers = ToolHandlers::new().with("fillForm", move |data| {
            assert_eq!(data.get("k"), Some(&json!("v")));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handlers.dispatch(&invocation("fillForm")));
        assert!(!handlers.dispatch(&invocation("FillForm")));
        assert!(!handlers.dispatch(&invocation("other")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_lists_names() {
        let handlers = ToolHandlers::new().with("b", |_| {}).with("a", |_| {});
        assert_eq!(format!("{handlers:?}"), r#"{"a", "b"}"#);

        let options = BindingOptions::new("AI1").on_conversation_setup(|_| {});
        let debug = format!("{options:?}");
        assert!(debug.contains("AI1"));
        assert!(debug.contains("on_conversation_setup: true"));
    }
}
