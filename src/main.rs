//! Assistant console
//!
//! Runs an assistant binding against the in-memory backend and drives both
//! sides from stdin: plain lines are sent as the user, slash commands act as
//! the assistant.

use assistant_bridge::client::loopback::{LoopbackBackend, DEFAULT_IDENTITY};
use assistant_bridge::client::ConnectionState;
use assistant_bridge::{
    AssistantBinding, AssistantConfig, AssistantEvent, AssistantView, LogFormat, ToolHandlers,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

const CONSOLE_ASSISTANT_SID: &str = "AIconsole";
const CONSOLE_TOKEN: &str = "console";

const HELP: &str = "\
commands:
  <text>                 send as the user
  /reply <text>          assistant reply
  /tool <name> [json]    assistant ui-tool command
  /typing on|off         assistant typing indicator
  /edit <sid> <text>     edit a message
  /delete <sid>          remove a message
  /state                 show the binding state
  /quit";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Send(String),
    Reply(String),
    Tool { name: String, data: Value },
    Typing(bool),
    Edit { message_sid: String, body: String },
    Delete(String),
    State,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };

    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();
    let command = match name {
        "reply" if !args.is_empty() => Command::Reply(args.to_string()),
        "tool" if !args.is_empty() => {
            let (tool, data) = args.split_once(' ').unwrap_or((args, ""));
            let data = if data.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(data).map_err(|e| format!("invalid tool data: {e}"))?
            };
            Command::Tool {
                name: tool.to_string(),
                data,
            }
        }
        "typing" => match args {
            "on" => Command::Typing(true),
            "off" => Command::Typing(false),
            _ => return Err("usage: /typing on|off".to_string()),
        },
        "edit" => match args.split_once(' ') {
            Some((sid, body)) if !body.trim().is_empty() => Command::Edit {
                message_sid: sid.to_string(),
                body: body.trim().to_string(),
            },
            _ => return Err("usage: /edit <sid> <text>".to_string()),
        },
        "delete" if !args.is_empty() => Command::Delete(args.to_string()),
        "state" => Command::State,
        "quit" | "exit" => Command::Quit,
        _ => return Err(HELP.to_string()),
    };
    Ok(Some(command))
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "assistant_bridge=info".into());
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let fmt = match format {
        LogFormat::Json => fmt
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt.compact().boxed(),
    };
    tracing_subscriber::registry().with(filter).with(fmt).init();
}

fn print_event(event: &AssistantEvent) {
    match event {
        AssistantEvent::StatusChanged(state) => println!("[status] {state}"),
        AssistantEvent::MessagesChanged(messages) => {
            println!("[messages] {} visible", messages.len());
            if let Some(last) = messages.last() {
                println!(
                    "  {} {}: {}",
                    last.sid,
                    last.author,
                    last.body.as_deref().unwrap_or("")
                );
            }
        }
        AssistantEvent::JoinedConversation(joined) => println!(
            "[joined] {} as {}",
            joined.conversation_sid, joined.identity
        ),
        AssistantEvent::AssistantTypingStarted => println!("[typing] assistant is typing"),
        AssistantEvent::AssistantTypingEnded => println!("[typing] assistant stopped"),
        AssistantEvent::UiToolTriggered(tool) => {
            println!("[tool] {} {}", tool.name, Value::Object(tool.data.clone()));
        }
    }
}

fn print_view(view: &AssistantView) {
    println!(
        "state={} conversation={} identity={} typing={}",
        view.state,
        view.conversation_sid.as_deref().unwrap_or("-"),
        view.identity.as_deref().unwrap_or("-"),
        view.is_typing
    );
    if let Some(error) = &view.last_error {
        println!("last error: {error}");
    }
    for message in &view.messages {
        println!(
            "  {} {}: {}",
            message.sid,
            message.author,
            message.body.as_deref().unwrap_or("")
        );
    }
}

fn tool_handlers() -> ToolHandlers {
    ToolHandlers::new()
        .with("navigate", |data| {
            let target = data.get("path").and_then(Value::as_str).unwrap_or("/");
            println!("(ui) navigating to {target}");
        })
        .with("showNotification", |data| {
            let text = data.get("text").and_then(Value::as_str).unwrap_or("");
            println!("(ui) notification: {text}");
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AssistantConfig::from_env()?;
    init_logging(config.log_format);

    let backend = LoopbackBackend::new(config.identity.as_deref().unwrap_or(DEFAULT_IDENTITY));

    let mut options = config.binding_options().with_tool_handlers(tool_handlers());
    if options.assistant_sid.is_none() {
        tracing::info!(assistant_sid = CONSOLE_ASSISTANT_SID, "No ASSISTANT_SID set, using console default");
        options.assistant_sid = Some(CONSOLE_ASSISTANT_SID.to_string());
    }
    let options = options.on_conversation_setup(|sid| {
        println!("[setup] new conversation {sid}, set ASSISTANT_CONVERSATION_SID to resume it");
    });

    let mut binding = AssistantBinding::new(backend.clone(), options);
    binding.set_token(config.token.as_deref().unwrap_or(CONSOLE_TOKEN));

    if let Some(assistant) = binding.assistant() {
        let mut events = assistant.event_stream();
        tokio::spawn(async move {
            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => print_event(&event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Console fell behind, events dropped");
                    }
                }
            }
        });
    }

    backend.set_connection_state(ConnectionState::Connecting);
    backend.set_connection_state(ConnectionState::Connected);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::State => print_view(&binding.view()),
            Command::Send(text) => match binding.send_message(&text).await {
                Ok(true) => {}
                Ok(false) => println!("not joined yet, message not sent"),
                Err(e) => println!("send failed: {e}"),
            },
            command => {
                let Some(sid) = binding.conversation_sid() else {
                    println!("not joined yet");
                    continue;
                };
                let result = match command {
                    Command::Reply(text) => backend.reply(&sid, &text).map(drop),
                    Command::Tool { name, data } => {
                        backend.trigger_ui_tool(&sid, &name, data).map(drop)
                    }
                    Command::Typing(typing) => backend.set_typing(&sid, typing),
                    Command::Edit { message_sid, body } => {
                        backend.edit_message(&sid, &message_sid, &body).map(drop)
                    }
                    Command::Delete(message_sid) => {
                        backend.remove_message(&sid, &message_sid).map(drop)
                    }
                    Command::Send(_) | Command::State | Command::Quit => Ok(()),
                };
                if let Err(e) = result {
                    println!("backend error: {e}");
                }
            }
        }
    }

    binding.dispose();
    backend.set_connection_state(ConnectionState::Disconnected);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_sends() {
        assert_eq!(
            parse_command("  hello there "),
            Ok(Some(Command::Send("hello there".to_string())))
        );
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn test_assistant_commands() {
        assert_eq!(
            parse_command("/reply Hi!"),
            Ok(Some(Command::Reply("Hi!".to_string())))
        );
        assert_eq!(
            parse_command(r#"/tool navigate {"path":"/home"}"#),
            Ok(Some(Command::Tool {
                name: "navigate".to_string(),
                data: json!({ "path": "/home" }),
            }))
        );
        assert_eq!(
            parse_command("/tool ping"),
            Ok(Some(Command::Tool {
                name: "ping".to_string(),
                data: json!({}),
            }))
        );
        assert_eq!(parse_command("/typing on"), Ok(Some(Command::Typing(true))));
        assert_eq!(
            parse_command("/edit IM1 new text"),
            Ok(Some(Command::Edit {
                message_sid: "IM1".to_string(),
                body: "new text".to_string(),
            }))
        );
        assert_eq!(
            parse_command("/delete IM1"),
            Ok(Some(Command::Delete("IM1".to_string())))
        );
        assert_eq!(parse_command("/state"), Ok(Some(Command::State)));
        assert_eq!(parse_command("/quit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn test_bad_commands() {
        assert!(parse_command("/typing maybe").is_err());
        assert!(parse_command("/edit IM1").is_err());
        assert!(parse_command("/tool navigate {oops").is_err());
        assert!(parse_command("/reply").is_err());
        assert_eq!(parse_command("/nope"), Err(HELP.to_string()));
    }
}
