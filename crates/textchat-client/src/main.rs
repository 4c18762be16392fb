//! textchat - terminal client for the textchat service.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use textchat_client::{
    init_tracing, message_content, ApiClient, AuthService, ClientConfig, ClientError,
    ConversationView, Update,
};
use textchat_shared::{ChatMessage, Conversation, MessageType, RealtimeEvent, UserId, UserProfile};
use textchat_store::{Database, SessionStore};

#[derive(Parser, Debug)]
#[command(name = "textchat", version, about = "Terminal client for textchat")]
struct Cli {
    /// Session database file (overrides TEXTCHAT_DB_PATH)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in with a username or email
    Login {
        identifier: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account (log in afterwards)
    Register {
        username: String,
        email: String,
        #[arg(long)]
        full_name: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// List users, or search them
    Users {
        #[arg(long)]
        search: Option<String>,
    },

    /// List your conversations
    Chats,

    /// Start a conversation with a user
    Start { username: String },

    /// Print one page of a conversation's history
    History {
        chat: String,
        /// Cursor printed by a previous page
        #[arg(long)]
        cursor: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Send a message
    Send {
        chat: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Edit one of your messages
    Edit {
        chat: String,
        message: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Delete one of your messages
    Delete { chat: String, message: String },

    /// Show your profile, or update it
    Profile {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },

    /// Follow a conversation live; lines typed on stdin are sent
    Watch { chat: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(db) = cli.db {
        config.database_path = Some(db);
    }

    let db = match &config.database_path {
        Some(path) => Database::open_at(path),
        None => Database::new(),
    }
    .context("failed to open session database")?;
    info!(path = ?db.path(), "session database ready");

    let session = Arc::new(SessionStore::new(db));
    let api = ApiClient::from_config(&config, session)?;
    let auth = AuthService::new(api.clone());

    match cli.command {
        Commands::Login {
            identifier,
            password,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password")?,
            };
            let session = auth.login(&identifier, &password).await?;
            println!(
                "Logged in as {} (session expires {})",
                session.user.username,
                format_ms(session.expires_at_ms)
            );
        }

        Commands::Register {
            username,
            email,
            full_name,
            password,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password")?,
            };
            let user = auth
                .register(&username, &email, &full_name, &password)
                .await?;
            println!(
                "Registered {} (id {}). Run `textchat login {}` to continue.",
                user.username, user.id, user.username
            );
        }

        Commands::Logout => {
            auth.logout();
            println!("Logged out");
        }

        Commands::Whoami => {
            let session = api.session().session().ok_or(ClientError::Unauthenticated)?;
            print_profile(&session.user);
            println!("session expires {}", format_ms(session.expires_at_ms));
        }

        Commands::Users { search } => {
            let me = require_user(&auth)?;
            let users = match search {
                Some(query) => auth.find_people(&query).await?,
                None => api.list_users().await?,
            };
            if users.is_empty() {
                println!("No users found");
            }
            for user in &users {
                let marker = if user.id == me.id { " (you)" } else { "" };
                println!("{:<20} {}{}", user.username, user.full_name, marker);
            }
        }

        Commands::Chats => {
            let me = require_user(&auth)?;
            let chats = api.list_conversations().await?;
            if chats.is_empty() {
                println!("No conversations yet. Start one with `textchat start <username>`.");
            }
            for chat in &chats {
                print_conversation(chat, &me.id);
            }
        }

        Commands::Start { username } => {
            let me = require_user(&auth)?;
            let chat = auth.start_conversation(&username).await?;
            print_conversation(&chat, &me.id);
        }

        Commands::History {
            chat,
            cursor,
            limit,
        } => {
            let me = require_user(&auth)?;
            let page = api
                .get_messages(&chat, limit.unwrap_or(config.page_size), cursor.as_deref())
                .await?;
            for message in &page.data {
                print_message(message, &me.id, None);
            }
            match (page.has_more, page.next_cursor) {
                (true, Some(cursor)) => println!("-- older: --cursor '{cursor}'"),
                _ => println!("-- start of conversation"),
            }
        }

        Commands::Send { chat, text } => {
            let me = require_user(&auth)?;
            let text = text.join(" ");
            let content = message_content(&text)?;
            let sent = api.send_message(&chat, content, MessageType::Text).await?;
            print_message(&sent, &me.id, None);
        }

        Commands::Edit {
            chat,
            message,
            text,
        } => {
            let me = require_user(&auth)?;
            let text = text.join(" ");
            let content = message_content(&text)?;
            let edited = api.edit_message(&chat, &message, content).await?;
            print_message(&edited, &me.id, None);
        }

        Commands::Delete { chat, message } => {
            require_user(&auth)?;
            api.delete_message(&chat, &message).await?;
            println!("Deleted {message}");
        }

        Commands::Profile { full_name, bio } => {
            let user = if full_name.is_none() && bio.is_none() {
                auth.refresh_profile().await?
            } else {
                auth.update_profile(full_name, bio).await?
            };
            print_profile(&user);
        }

        Commands::Watch { chat } => {
            require_user(&auth)?;
            let view = ConversationView::open(api, &config, &chat).await?;
            watch(view).await?;
        }
    }

    Ok(())
}

async fn watch(mut view: ConversationView) -> Result<()> {
    let me = view.me().id.clone();
    let other = view.other_participant().cloned();

    match &other {
        Some(p) => println!("== {} (@{}) ==", p.full_name, p.username),
        None => println!("== {} ==", view.conversation().id),
    }
    if view.has_more() {
        println!("-- type /older for earlier messages");
    }
    for message in view.messages() {
        print_message(message, &me, other.as_ref());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            update = view.next_update() => match update {
                Update::Connected => eprintln!("-- live"),
                Update::Applied { event, changed: true } => {
                    print_event(&event, &me, other.as_ref());
                }
                Update::Applied { .. } => {}
                Update::HandshakeFailed(reason) => {
                    eprintln!("-- could not connect: {reason}");
                    break;
                }
                Update::ConnectionLost(reason) => {
                    eprintln!(
                        "-- connection lost{}",
                        reason.map(|r| format!(": {r}")).unwrap_or_default()
                    );
                    break;
                }
                Update::Closed => break,
            },

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim() == "/older" {
                    match view.load_older().await {
                        Ok(0) => println!("-- no older messages"),
                        Ok(loaded) => {
                            println!("-- loaded {loaded} older messages");
                            for message in view.messages() {
                                print_message(message, &me, other.as_ref());
                            }
                        }
                        Err(e) => eprintln!("-- could not load older messages: {e}"),
                    }
                    continue;
                }
                match view.send(&line).await {
                    Ok(sent) => print_message(&sent, &me, other.as_ref()),
                    Err(ClientError::EmptyMessage) => {}
                    Err(e) => eprintln!("-- not sent: {e}"),
                }
            },

            _ = &mut ctrl_c => break,
        }
    }

    view.close();
    Ok(())
}

fn require_user(auth: &AuthService) -> Result<UserProfile> {
    match auth.current_user() {
        Some(user) => Ok(user),
        None => bail!("Not logged in. Run `textchat login <username>` first."),
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{label}: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

fn print_profile(user: &UserProfile) {
    println!("{} (@{})", user.full_name, user.username);
    if let Some(email) = &user.email {
        println!("email   {email}");
    }
    if let Some(bio) = &user.bio {
        println!("bio     {bio}");
    }
    println!("joined  {}", format_time(&user.created_at));
}

fn print_conversation(chat: &Conversation, me: &UserId) {
    let title = chat
        .other_participant(me)
        .map(|p| format!("{} (@{})", p.full_name, p.username))
        .or_else(|| chat.name.clone())
        .unwrap_or_else(|| "(no participants)".to_string());
    let unread = match chat.unread_count {
        Some(n) if n > 0 => format!(" [{n} unread]"),
        _ => String::new(),
    };
    println!("{}  {}{}", chat.id, title, unread);
    if let Some(last) = &chat.last_message {
        println!("    {}", preview(&last.content));
    }
}

fn print_event(event: &RealtimeEvent, me: &UserId, other: Option<&UserProfile>) {
    match event {
        RealtimeEvent::NewMessage(m) => print_message(m, me, other),
        RealtimeEvent::MessageEdited(m) => {
            print!("~ ");
            print_message(m, me, other);
        }
        RealtimeEvent::MessageDeleted(d) => println!("-- message {} deleted", d.message_id),
    }
}

fn print_message(message: &ChatMessage, me: &UserId, other: Option<&UserProfile>) {
    let sender = if &message.sender_id == me {
        "you".to_string()
    } else if let Some(sender) = &message.sender {
        sender.username.clone()
    } else {
        other
            .filter(|p| p.id == message.sender_id)
            .map(|p| p.username.clone())
            .unwrap_or_else(|| format!("user {}", message.sender_id))
    };
    let edited = if message.edited { " (edited)" } else { "" };
    let body = match message.kind {
        MessageType::Text => message.content.clone(),
        MessageType::Image | MessageType::File => format!(
            "[{}] {}",
            message.file_name.as_deref().unwrap_or("attachment"),
            message.file_url.as_deref().unwrap_or(&message.content)
        ),
    };
    println!(
        "[{}] {} {}: {}{}",
        format_time(&message.created_at),
        message.id,
        sender,
        body,
        edited
    );
}

fn preview(content: &str) -> String {
    const MAX: usize = 60;
    if content.chars().count() <= MAX {
        return content.to_string();
    }
    let cut: String = content.chars().take(MAX).collect();
    format!("{cut}...")
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn format_ms(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(at) => format_time(&at),
        None => format!("at {ms} ms"),
    }
}
