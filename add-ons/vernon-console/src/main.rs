//! Vernon console: type messages, toggle listening and voice replies from a terminal.
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); the conversation goes to stdout.

use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vernon_assistant::VernonSession;
use vernon_core::{Origin, VernonConfig};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Message(String),
    Listen,
    Voice,
    Stop,
    History,
    Quit,
    Unknown(String),
    Empty,
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if !line.starts_with('/') {
            return Command::Message(line.to_string());
        }
        match line.to_lowercase().as_str() {
            "/listen" | "/mic" => Command::Listen,
            "/voice" => Command::Voice,
            "/stop" => Command::Stop,
            "/history" => Command::History,
            "/quit" | "/exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

const HELP: &str = "Type a message, or /listen, /voice, /stop, /history, /quit.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[vernon-console] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = VernonConfig::load().context("loading Vernon configuration")?;
    let session = Arc::new(VernonSession::from_config(&config).context("starting session")?);
    tracing::info!(
        assistant = %config.assistant_name,
        llm_mode = ?config.providers.llm_mode,
        voice_mode = session.voice_mode(),
        "Vernon console started"
    );

    println!("{} is ready. {}", config.assistant_name, HELP);
    let printer = tokio::spawn(print_replies(Arc::clone(&session), config.assistant_name.clone()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Command::Message(text) => {
                        let result = session.send_message(&text).await;
                        if result.is_busy() {
                            // Turned away, so it never reaches the transcript watcher.
                            if let Some(reply) = result.response {
                                println!("\n{}: {}\n", config.assistant_name, reply);
                            }
                        } else if result.response.is_none() {
                            if let Some(error) = result.error {
                                println!("[not sent: {}]", error);
                            }
                        }
                    }
                    Command::Listen => match session.toggle_listening() {
                        Ok(true) => println!("[listening]"),
                        Ok(false) => println!("[not listening]"),
                        Err(e) => {
                            tracing::warn!(error = %e, "could not start listening");
                            if let Some(notice) = session.take_notice() {
                                println!("[{}]", notice);
                            }
                        }
                    },
                    Command::Voice => {
                        let on = !session.voice_mode();
                        session.set_voice_mode(on);
                        println!("[voice replies {}]", if on { "on" } else { "off" });
                    }
                    Command::Stop => {
                        session.stop();
                        println!("[stopped]");
                    }
                    Command::History => {
                        for message in session.snapshot().messages {
                            let who = match message.origin {
                                Origin::User => "You",
                                Origin::Assistant => config.assistant_name.as_str(),
                            };
                            println!("{} {}: {}", message.created_at.format("%H:%M:%S"), who, message.text);
                        }
                    }
                    Command::Quit => break,
                    Command::Unknown(command) => println!("Unknown command {}. {}", command, HELP),
                    Command::Empty => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down");
                break;
            }
        }
    }

    session.stop();
    printer.abort();
    Ok(())
}

/// Print assistant messages as they appear or change (a placeholder and its final text),
/// including replies to spoken questions, plus any voice-input notice.
async fn print_replies(session: Arc<VernonSession>, name: String) {
    let mut changes = session.subscribe();
    let mut shown = HashMap::new();
    while changes.changed().await.is_ok() {
        for message in session.snapshot().messages {
            if message.origin != Origin::Assistant {
                continue;
            }
            let previous = shown.insert(message.id, message.text.clone());
            if previous.as_ref() != Some(&message.text) {
                println!("\n{}: {}\n", name, message.text);
            }
        }
        if let Some(notice) = session.take_notice() {
            println!("[{}]", notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(Command::parse("  "), Command::Empty);
        assert_eq!(Command::parse("/QUIT"), Command::Quit);
        assert_eq!(Command::parse("/voice"), Command::Voice);
        assert_eq!(Command::parse("/mic"), Command::Listen);
        assert_eq!(
            Command::parse(" what's on in Austin "),
            Command::Message("what's on in Austin".to_string())
        );
        assert_eq!(Command::parse("/dance"), Command::Unknown("/dance".to_string()));
    }
}
