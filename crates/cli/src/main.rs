//! Potato CLI - terminal host for a live chat session
//!
//! Configuration comes from the environment:
//! `POTATO_TOKEN` (required), `POTATO_CHANNEL` (optional initial channel)
//! and the `POTATO_*` gateway settings read by [`GatewayConfig::from_env`].

mod commands;

use anyhow::{Context, Result};
use commands::{Command, HELP};
use potato_core::{ChannelId, GatewayConfig, Message};
use potato_engine::ChatSession;
use potato_networking::{api, ChatClient};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "potato_cli=info,potato_networking=info,potato_engine=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env();
    let token = std::env::var("POTATO_TOKEN").context("POTATO_TOKEN must be set")?;
    let initial_channel = std::env::var("POTATO_CHANNEL")
        .ok()
        .filter(|c| !c.trim().is_empty())
        .map(|c| ChannelId::from(c.trim()));

    info!("Starting Potato client for {}", config.host);

    let client = Arc::new(ChatClient::new(config.clone(), &token)?);
    let session = ChatSession::with_websocket(config, client.clone());
    session.init(&token);
    session.set_active_channel(initial_channel);

    println!("{}", HELP);
    run(&session, client).await;

    session.dispose();
    Ok(())
}

async fn run(session: &ChatSession, client: Arc<ChatClient>) {
    let mut changes = session.watch_changes();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                session.with_messages(render);
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !handle_line(session, &client, &line) {
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    stdin_open = false;
                }
            },
        }
    }
}

/// Returns `false` when the user asked to quit
fn handle_line(session: &ChatSession, client: &Arc<ChatClient>, line: &str) -> bool {
    match Command::parse(line) {
        Command::Join(channel) => session.set_active_channel(Some(channel)),
        Command::Leave => session.set_active_channel(None),
        Command::Status => println!(
            "gateway: {}, channel: {}, view: {:?}",
            session.connection_state(),
            session
                .active_channel()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string()),
            session.load_state()
        ),
        Command::Quit => return false,
        Command::Help => println!("{}", HELP),
        Command::Empty => {}
        Command::Say(content) => match session.active_channel() {
            Some(channel) => {
                // Our own message comes back as MESSAGE_CREATE
                let client = client.clone();
                tokio::spawn(async move {
                    if let Err(e) = api::post_message(&client, &channel, &content).await {
                        warn!("Failed to send message: {}", e);
                    }
                });
            }
            None => println!("join a channel first"),
        },
    }
    true
}

fn render(messages: &[Message]) {
    println!("----");
    if messages.is_empty() {
        println!("No messages yet. Say something!");
    }
    for msg in messages {
        println!(
            "[{}] {}: {}{}",
            msg.created_at.format("%H:%M:%S"),
            msg.author_id,
            msg.content,
            if msg.is_edited() { " (edited)" } else { "" }
        );
    }
}
