use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, Utc};
use log::{info, warn};
use tokio::io::{BufReader, Lines, Stdin};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::api::client::ApiClient;
use crate::api::events::ChatEvent;
use crate::api::models::{Conversation, ConversationStatus, ImageAttachment, SenderRole};
use crate::app::ChatConfig;
use crate::chat::{ChatSession, Draft};
use crate::error::{ChatError, ErrorCategory};
use crate::ui::chat_view::{render_message, render_thread};
use crate::ui::sidebar::Sidebar;

const HELP: &str = "\
Type a message and press enter to send it.
  /image <path>            attach an image to the next message
  /drop                    remove the attached image
  /retry                   resend the last message that failed
  /list [query]            (admin) show conversations, optionally filtered
  /open <conversation id>  (admin) switch to a conversation
  /filter <open|closed|all> (admin) filter the conversation list by status
  /status <open|closed>    (admin) set the status of the open conversation
  /help                    show this help
  /quit                    leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Attach(PathBuf),
    DropImage,
    Retry,
    List(Option<String>),
    Open(String),
    Filter(Option<ConversationStatus>),
    Status(ConversationStatus),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match (name, arg) {
        ("image", "") => return Err("usage: /image <path>".into()),
        ("image", path) => Command::Attach(PathBuf::from(path)),
        ("drop", _) => Command::DropImage,
        ("retry", _) => Command::Retry,
        ("list", "") => Command::List(None),
        ("list", query) => Command::List(Some(query.to_string())),
        ("open", "") => return Err("usage: /open <conversation id>".into()),
        ("open", id) => Command::Open(id.to_string()),
        ("filter", "all") => Command::Filter(None),
        ("filter", "open") => Command::Filter(Some(ConversationStatus::Open)),
        ("filter", "closed") => Command::Filter(Some(ConversationStatus::Closed)),
        ("filter", _) => return Err("usage: /filter <open|closed|all>".into()),
        ("status", "open") => Command::Status(ConversationStatus::Open),
        ("status", "closed") => Command::Status(ConversationStatus::Closed),
        ("status", _) => return Err("usage: /status <open|closed>".into()),
        ("help", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        (other, _) => return Err(format!("unknown command /{other}, try /help")),
    };
    Ok(Some(command))
}

struct Screen {
    me: SenderRole,
    sidebar: Sidebar,
    conversations: Vec<Conversation>,
    active: Option<String>,
}

impl Screen {
    fn new(me: SenderRole) -> Self {
        Self {
            me,
            sidebar: Sidebar::new(),
            conversations: Vec::new(),
            active: None,
        }
    }

    fn print_sidebar(&self) {
        println!(
            "{}",
            self.sidebar
                .render(&self.conversations, self.active.as_deref(), Utc::now(), &Local)
        );
    }

    fn on_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::ConversationOpened(conv) => {
                println!("--- {} ({}) [{}] ---", conv.user_name, conv.id, conv.status.as_str());
                self.active = Some(conv.id);
            }
            ChatEvent::MessagesReplaced { messages, scroll_to_latest } => {
                if scroll_to_latest {
                    println!("{}", render_thread(&messages, self.me, &Local));
                }
            }
            ChatEvent::PendingAppended(message) => println!("{}", render_message(&message, self.me, &Local)),
            ChatEvent::MessageConfirmed { message, .. } => {
                println!("  delivered ({})", crate::ui::chat_view::format_time(message.created_at, &Local));
            }
            ChatEvent::SendFailed { error, .. } => {
                println!("! could not send: {error}. Your message is kept, /retry to try again.");
            }
            ChatEvent::PollFailed { error } => println!("! connection problem: {error}"),
            ChatEvent::ConversationsRefreshed(list) => {
                let changed = list != self.conversations;
                self.conversations = list;
                if changed {
                    self.print_sidebar();
                }
            }
            ChatEvent::StatusUpdated(conv) => println!("--- {} is now {} ---", conv.id, conv.status.as_str()),
        }
    }
}

async fn send(session: &ChatSession, draft: &mut Draft) -> Result<(), ChatError> {
    match session.send(draft).await {
        Ok(_) => Ok(()),
        // already reported through ChatEvent::SendFailed
        Err(err) if err.category() != ErrorCategory::Validation => Ok(()),
        Err(err) => Err(err),
    }
}

/// Returns false when the user asked to leave.
async fn handle(command: Command, session: &mut ChatSession, draft: &mut Draft, screen: &mut Screen) -> bool {
    let outcome = match command {
        Command::Quit => return false,
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Say(text) => {
            draft.text = text;
            send(session, draft).await
        }
        Command::Retry => send(session, draft).await,
        Command::Attach(path) => match ImageAttachment::from_path(&path).await {
            Ok(image) => {
                println!("attached {} ({} bytes)", image.file_name, image.bytes.len());
                draft.image = Some(image);
                Ok(())
            }
            Err(e) => Err(ChatError::Io(e)),
        },
        Command::DropImage => {
            draft.image = None;
            Ok(())
        }
        Command::List(query) => {
            screen.sidebar.set_query(query);
            session.refresh_conversations().await.map(|list| {
                screen.conversations = list;
                screen.print_sidebar();
            })
        }
        Command::Open(id) => session.select(&id).await.map(|_| ()),
        Command::Filter(filter) => session.set_status_filter(filter).await.map(|list| {
            screen.conversations = list;
            screen.print_sidebar();
        }),
        Command::Status(status) => session.update_status(status).await.map(|_| ()),
    };
    if let Err(err) = outcome {
        if err.category() != ErrorCategory::Validation {
            warn!("command failed: {err}");
        }
        println!("! {err}");
    }
    true
}

async fn event_loop(
    mut session: ChatSession,
    mut events: UnboundedReceiver<ChatEvent>,
    mut lines: Lines<BufReader<Stdin>>,
) -> Result<(), ChatError> {
    let mut screen = Screen::new(session.principal().role());
    let mut draft = Draft::default();
    println!("Type /help for commands.");

    loop {
        tokio::select! {
            Some(event) = events.recv() => screen.on_event(event),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if !handle(command, &mut session, &mut draft, &mut screen).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(usage) => println!("{usage}"),
                }
            }
        }
    }
    session.close();
    Ok(())
}

pub async fn run(config: ChatConfig, input: Lines<BufReader<Stdin>>) -> Result<(), ChatError> {
    let client = ApiClient::new(&config.base_url, config.token.clone(), config.request_timeout())?;
    let principal = config.principal();
    info!("connecting to {} as {}", config.base_url, principal.role().as_str());
    let (mut session, events) = ChatSession::new(Arc::new(client), principal, config.poll_settings());

    match config.role {
        SenderRole::User => {
            session.open_own().await?;
        }
        SenderRole::Admin => {
            session.start_conversation_refresh()?;
            println!("Use /list to see conversations and /open <id> to answer one.");
        }
    }
    event_loop(session, events, input).await
}
