//! Consumer binding for the assistant adapter
//!
//! Holds one live [`Assistant`] for the current token and projects its events
//! into a read-only [`AssistantView`]. Replacing or clearing the token tears
//! the previous adapter down before anything new is built.

mod options;

pub use options::{BindingOptions, ConversationSetupHandler, ToolHandler, ToolHandlers};

use crate::assistant::{Assistant, AssistantError};
use crate::client::{ClientFactory, ConnectionState, Message};
use crate::token::AccessTokenClaims;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State derived from adapter events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantView {
    pub messages: Vec<Message>,
    pub state: ConnectionState,
    pub conversation_sid: Option<String>,
    pub is_typing: bool,
    /// Identity of the logged-in user, known once joined
    pub identity: Option<String>,
    /// Why the automatic start failed, if it did
    pub last_error: Option<String>,
}

impl AssistantView {
    /// Whether a consumer should show a loading indicator
    pub fn is_loading(&self) -> bool {
        self.state.is_busy()
    }
}

/// Binds an assistant adapter to a changing token
pub struct AssistantBinding {
    factory: Arc<dyn ClientFactory>,
    options: BindingOptions,
    token: String,
    mounted: Option<Mounted>,
    view: Arc<Mutex<AssistantView>>,
}

struct Mounted {
    assistant: Arc<Assistant>,
}

impl AssistantBinding {
    pub fn new(factory: impl ClientFactory + 'static, options: BindingOptions) -> Self {
        Self {
            factory: Arc::new(factory),
            options,
            token: String::new(),
            mounted: None,
            view: Arc::new(Mutex::new(AssistantView::default())),
        }
    }

    /// Point the binding at a new token.
    ///
    /// A different token disposes the current adapter and builds a fresh one;
    /// an empty token only disposes. Must be called from within a Tokio runtime.
    pub fn set_token(&mut self, token: &str) {
        if token == self.token {
            return;
        }
        self.token = token.to_string();
        self.remount();
    }

    /// Resume a different conversation (or start a new one with `None`)
    pub fn set_conversation_sid(&mut self, conversation_sid: Option<String>) {
        if conversation_sid == self.options.conversation_sid {
            return;
        }
        self.options.conversation_sid = conversation_sid;
        self.remount();
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn options(&self) -> &BindingOptions {
        &self.options
    }

    /// The live adapter, if a token is set
    pub fn assistant(&self) -> Option<&Assistant> {
        self.mounted.as_ref().map(|m| m.assistant.as_ref())
    }

    /// Snapshot of the projected state
    pub fn view(&self) -> AssistantView {
        lock(&self.view).clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.view).messages.clone()
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.view).state
    }

    pub fn is_typing(&self) -> bool {
        lock(&self.view).is_typing
    }

    pub fn conversation_sid(&self) -> Option<String> {
        lock(&self.view).conversation_sid.clone()
    }

    pub fn identity(&self) -> Option<String> {
        lock(&self.view).identity.clone()
    }

    /// Send `text` through the live adapter.
    ///
    /// Empty text and a missing adapter or conversation all yield `Ok(false)`.
    pub async fn send_message(&self, text: &str) -> Result<bool, AssistantError> {
        if text.is_empty() {
            return Ok(false);
        }
        let Some(assistant) = self.mounted.as_ref().map(|m| Arc::clone(&m.assistant)) else {
            return Ok(false);
        };
        assistant.send_message(text).await
    }

    /// Dispose the current adapter, if any
    pub fn dispose(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            // Detach first so nothing reaches the projection during shutdown
            mounted.assistant.remove_all_listeners();
            mounted.assistant.destroy();
        }
    }

    fn remount(&mut self) {
        self.dispose();
        // Fresh projection; stale handlers and in-flight starts keep the old one
        self.view = Arc::new(Mutex::new(AssistantView::default()));

        warn_if_expired(&self.token);
        let Some(assistant) = Assistant::initialize(self.factory.as_ref(), &self.token) else {
            return;
        };
        let assistant = Arc::new(assistant);
        self.subscribe(&assistant);
        self.mounted = Some(Mounted { assistant });
    }

    fn subscribe(&self, assistant: &Arc<Assistant>) {
        let bus = assistant.events();

        let view = Arc::clone(&self.view);
        bus.on_messages_changed(move |messages| lock(&view).messages = messages.to_vec());

        let trigger = StartTrigger {
            assistant: Arc::downgrade(assistant),
            assistant_sid: self.options.assistant_sid.clone(),
            conversation_sid: self.options.conversation_sid.clone(),
            requested: AtomicBool::new(false),
            view: Arc::clone(&self.view),
        };
        let view = Arc::clone(&self.view);
        bus.on_status_changed(move |state| {
            lock(&view).state = state;
            if state.is_connected() {
                trigger.fire();
            }
        });

        let view = Arc::clone(&self.view);
        let configured = self.options.conversation_sid.clone();
        let on_setup = self.options.on_conversation_setup.clone();
        bus.on_joined_conversation(move |joined| {
            {
                let mut view = lock(&view);
                view.conversation_sid = Some(joined.conversation_sid.clone());
                view.identity = Some(joined.identity.clone());
            }
            if configured.as_deref() != Some(joined.conversation_sid.as_str()) {
                if let Some(on_setup) = &on_setup {
                    on_setup(&joined.conversation_sid);
                }
            }
        });

        let view = Arc::clone(&self.view);
        bus.on_typing_started(move || lock(&view).is_typing = true);
        let view = Arc::clone(&self.view);
        bus.on_typing_ended(move || lock(&view).is_typing = false);

        let handlers = self.options.tool_handlers.clone();
        bus.on_ui_tool(move |tool| {
            if !handlers.dispatch(tool) {
                tracing::debug!(tool = %tool.name, "No handler registered for ui tool");
            }
        });
    }
}

impl Drop for AssistantBinding {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Starts the conversation the first time the client reports `connected`
struct StartTrigger {
    assistant: Weak<Assistant>,
    assistant_sid: Option<String>,
    conversation_sid: Option<String>,
    requested: AtomicBool,
    view: Arc<Mutex<AssistantView>>,
}

impl StartTrigger {
    fn fire(&self) {
        let Some(assistant_sid) = self.assistant_sid.clone() else {
            return;
        };
        let Some(assistant) = self.assistant.upgrade() else {
            return;
        };
        if assistant.conversation_sid().is_some() || self.requested.swap(true, Ordering::SeqCst) {
            return;
        }

        let conversation_sid = self.conversation_sid.clone();
        let view = Arc::clone(&self.view);
        tokio::spawn(async move {
            match assistant
                .start(&assistant_sid, conversation_sid.as_deref())
                .await
            {
                Ok(_) | Err(AssistantError::Destroyed) => {}
                Err(e) => lock(&view).last_error = Some(e.to_string()),
            }
        });
    }
}

fn warn_if_expired(token: &str) {
    if token.is_empty() {
        return;
    }
    if let Ok(claims) = AccessTokenClaims::decode(token) {
        if claims.is_expired(Utc::now()) {
            tracing::warn!(expired_at = ?claims.expires_at(), "Access token has already expired");
        }
    }
}
