//! A terminal client for browsing and continuing a LAYRA conversation.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use layra::client::{ClientConfigBuilder, LayraClient};
use layra::core::tree::ConversationBlock;
use layra::core::{OutgoingMessage, ReplyOutcome, Session, SessionBuilder};
use layra::{Command, fork_of_turn, next_line, render_path};
use layra_model::StreamEvent;
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(conversation_id) = env::var("LAYRA_CONVERSATION_ID") else {
        eprintln!("LAYRA_CONVERSATION_ID environment variable is not set");
        return;
    };
    let mut config_builder = ClientConfigBuilder::with_base_url(
        env::var("LAYRA_API_BASE_URL").unwrap_or_default(),
    );
    if let Ok(token) = env::var("LAYRA_TOKEN") {
        config_builder = config_builder.with_token(token);
    }
    let config = config_builder.build();
    debug!("using config: {config:?}");
    let backend = LayraClient::new(config);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = SessionBuilder::with_backend(backend, conversation_id)
        .on_event(move |event| {
            event_tx.send(event.clone()).ok();
        })
        .build();

    if let Err(err) = session.load().await {
        eprintln!("{} {err}", "Failed to load the conversation:".red());
        return;
    }
    print_path(session.path());

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        // Ctrl-C at the prompt exits like `/quit`.
        let Some(line) = next_line(read_line(), interrupted()).await else {
            println!();
            break;
        };
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{}", err.yellow());
                continue;
            }
        };

        match command {
            Command::Send(text) => {
                receive_reply(
                    &mut session,
                    OutgoingMessage::new(text),
                    &mut event_rx,
                    &progress_style,
                )
                .await;
            }
            Command::Next(turn) | Command::Previous(turn) => {
                let Some(parent_id) =
                    fork_of_turn(session.path(), turn).map(str::to_owned)
                else {
                    eprintln!("{}", "No such turn".yellow());
                    continue;
                };
                let changed = if matches!(command, Command::Next(_)) {
                    session.next_branch(&parent_id)
                } else {
                    session.previous_branch(&parent_id)
                };
                if changed {
                    print_path(session.path());
                } else {
                    eprintln!("{}", "No more branches there".yellow());
                }
            }
            Command::Path => print_path(session.path()),
            Command::Reload => match session.load().await {
                Ok(()) => print_path(session.path()),
                Err(err) => eprintln!("{} {err}", "Failed to reload:".red()),
            },
            Command::Quit => break,
        }
    }
}

async fn receive_reply(
    session: &mut Session,
    outgoing: OutgoingMessage,
    event_rx: &mut mpsc::UnboundedReceiver<StreamEvent>,
    progress_style: &ProgressStyle,
) {
    let mut reply = pin!(session.send_message(outgoing, interrupted()));

    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(progress_style.clone());
    progress_bar.set_message("🤔 Thinking...");
    let mut printer = ReplyPrinter::default();

    let result = loop {
        let tick = sleep(Duration::from_millis(100));
        select! {
            result = &mut reply => break result,
            Some(event) = event_rx.recv() => {
                // Finish the spinner before printing anything else.
                progress_bar.finish_and_clear();
                printer.print(event);
            }
            _ = tick => progress_bar.inc(1),
        }
    };
    progress_bar.finish_and_clear();

    // Events sent right before the reply finished.
    while let Ok(event) = event_rx.try_recv() {
        printer.print(event);
    }
    if printer.started {
        println!();
    }

    match result {
        Ok(ReplyOutcome::Aborted) => {
            println!("{}", "⚠️ Aborted by user".yellow());
        }
        Ok(_) => {}
        Err(err) => {
            eprintln!("{} {err}", "Failed to receive the reply:".red());
        }
    }
}

#[derive(Default)]
struct ReplyPrinter {
    started: bool,
    thinking: bool,
}

impl ReplyPrinter {
    fn print(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Thinking { delta, .. } => {
                self.start(true);
                print!("{}", delta.dimmed());
            }
            StreamEvent::Text { delta, .. } => {
                self.start(false);
                print!("{}", delta.bright_white());
            }
            StreamEvent::FilesUsed { files, .. } => {
                for file in files {
                    self.start(false);
                    let bar = BAR_CHAR.bright_cyan();
                    print!("\n{bar}📄 {}", file.file_name);
                }
            }
            StreamEvent::Usage(_) => {}
        }
        std::io::stdout().flush().ok();
    }

    fn start(&mut self, thinking: bool) {
        if !self.started {
            print!("{}🤖 ", BAR_CHAR.bright_cyan());
            self.started = true;
        } else if self.thinking && !thinking {
            print!("\n{}", BAR_CHAR.bright_cyan());
        }
        self.thinking = thinking;
    }
}

fn print_path(path: &[Arc<ConversationBlock>]) {
    if path.is_empty() {
        println!("{}", "The conversation is empty.".dimmed());
        return;
    }
    for line in render_path(path).lines() {
        println!("{}{line}", BAR_CHAR.bright_cyan());
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal can't be listened to.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("unable to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
