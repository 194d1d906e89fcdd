//! # paporeto
//!
//! Command-line front end for the PapoReto service layer.  Runs against the
//! configured backend, or the built-in demo dataset when none is configured.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use paporeto_client::platform::Platform;
use paporeto_client::PapoReto;
use paporeto_shared::constants::{APP_BUILD, APP_NAME, APP_VERSION};
use paporeto_shared::format::{format_date, format_time};
use paporeto_shared::models::{Message, NewMessage};
use paporeto_shared::types::ChatKind;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "paporeto", version, about)]
struct Cli {
    /// SQLite database path [default: platform data directory]
    #[arg(long, short = 'd', env = "PAPORETO_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the backend mode and the signed-in user
    Mode,
    /// Save backend credentials (used from the next start)
    Configure {
        #[arg(long)]
        url: String,
        #[arg(long)]
        key: String,
    },
    /// Sign in with email and password
    Login {
        email: String,
        #[arg(long, env = "PAPORETO_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Start a local demo session
    DemoLogin,
    /// Sign out and forget the local session
    Logout,
    /// Request a password reset email
    ResetPassword { email: String },
    Contacts,
    Groups,
    Statuses,
    Calls,
    /// Print a conversation
    Chat {
        id: String,
        #[arg(long, default_value = "user")]
        kind: ChatKind,
    },
    /// Send a text message
    Send {
        id: String,
        text: String,
        #[arg(long, default_value = "user")]
        kind: ChatKind,
    },
    /// Follow a conversation's live feed until interrupted
    Watch {
        id: String,
        #[arg(long, default_value = "user")]
        kind: ChatKind,
    },
    /// Space used by local data
    Storage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,paporeto_client=debug,paporeto_store=info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    info!("{APP_NAME} v{APP_VERSION} ({APP_BUILD})");

    // No desktop shell here: platform effects are recorded and dropped.
    let (platform, _host) = Platform::headless();
    let app = match cli.db {
        Some(ref path) => PapoReto::open_at(path, platform),
        None => PapoReto::open_default(platform),
    }
    .context("failed to open local store")?;

    run(&app, cli.command).await
}

async fn run(app: &PapoReto, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Mode => {
            println!("mode: {}", app.mode());
            match app.session()? {
                Some(session) => println!("user: {} ({})", session.name, session.id),
                None => println!("user: not signed in"),
            }
        }
        Command::Configure { url, key } => {
            app.configure_backend(&url, &key)?;
            println!("credentials saved; restart to apply");
        }
        Command::Login { email, password } => {
            let session = app.login(&email, &password).await?;
            println!("signed in as {} ({})", session.name, session.id);
        }
        Command::DemoLogin => {
            let session = app.start_demo_session()?;
            println!("demo session for {}", session.name);
        }
        Command::Logout => {
            app.logout().await;
            println!("signed out");
        }
        Command::ResetPassword { email } => {
            app.auth().request_password_reset(&email).await?;
            println!("reset email requested for {email}");
        }
        Command::Contacts => {
            let me = app.require_session(None)?;
            for user in app.data().get_users(&me.id).await? {
                let presence = if user.online { "online" } else { "offline" };
                println!("{:<8} {:<24} {}", user.id, user.name, presence);
            }
        }
        Command::Groups => {
            let me = app.require_session(None)?;
            for group in app.data().get_groups(&me.id).await? {
                println!("{:<16} {} {}", group.id, group.icon, group.name);
            }
        }
        Command::Statuses => {
            app.require_session(None)?;
            for status in app.data().get_statuses().await? {
                let author = status
                    .author
                    .map(|a| a.name)
                    .unwrap_or_else(|| status.user_id.clone());
                println!("{:<6} {:<24} {}", format_time(status.created_at), author, status.content);
            }
        }
        Command::Calls => {
            for call in app.call_history() {
                let outcome = if call.missed { "missed" } else { call.duration.as_str() };
                println!("{:<10} {:<24} {:?} {}", format_date(call.time), call.contact, call.kind, outcome);
            }
        }
        Command::Chat { id, kind } => {
            let me = app.require_session(None)?;
            for message in app.data().get_messages(kind, &id, &me.id).await? {
                print_message(&message, &me.id);
            }
            app.data().mark_read(kind, &id, &me.id).await?;
        }
        Command::Send { id, text, kind } => {
            let me = app.require_session(None)?;
            let draft = NewMessage::to_chat(kind, id, me.id, text);
            let sent = app.data().send_message(draft).await?;
            println!("sent {}", sent.id);
        }
        Command::Watch { id, kind } => {
            let me = app.require_session(None)?;
            let self_id = me.id.clone();
            let key = app.realtime().subscribe_messages(kind, &id, &me.id, move |change| {
                match change.message() {
                    Some(message) => {
                        if let Some(label) = change.label() {
                            print!("[{label}] ");
                        }
                        print_message(&message, &self_id);
                    }
                    None => println!("[{}] {}", change.label().unwrap_or("insert"), change.record),
                }
            })?;
            let Some(key) = key else {
                anyhow::bail!("live updates need a configured backend (mode: {})", app.mode());
            };
            println!("watching {key}; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            app.realtime().unsubscribe(&key);
        }
        Command::Storage => {
            println!("{}", app.storage_size()?);
        }
    }
    Ok(())
}

fn print_message(message: &Message, self_id: &str) {
    let from = if message.sender_id == self_id { "eu" } else { message.sender_id.as_str() };
    println!("{} {:<8} {}", format_time(message.created_at), from, message.content);
}
