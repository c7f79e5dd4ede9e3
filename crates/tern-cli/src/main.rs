//! tern - terminal driver for the streaming session controller

mod config;
mod replay;
mod usage;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tern_ai::{ConversationId, ResourceId};
use tern_session::{Command, ControllerUpdate, SessionController, UsageStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing_subscriber::EnvFilter;

/// tern - streaming conversation session controller
#[derive(Parser, Debug)]
#[command(name = "tern")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provider (gemini, anthropic, openai, custom)
    #[arg(short, long)]
    provider: Option<String>,

    /// Resource to start on (default: the provider's highest tier)
    #[arg(short, long)]
    resource: Option<String>,

    /// Conversation to attach to (default: a new one)
    #[arg(long)]
    conversation: Option<String>,

    /// JSONL transcript of backend events to replay
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Print the persisted usage of a conversation and exit
    #[arg(long, value_name = "CONVERSATION")]
    usage: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = config::Config::load();

    // Setup tracing
    let filter = if args.verbose {
        EnvFilter::new("tern=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(cfg.log_filter.as_deref().unwrap_or("tern=warn"))
        })
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let store = Arc::new(usage::JsonlUsageStore::new(cfg.usage_dir()));

    // Show usage and exit
    if let Some(conversation) = args.usage {
        return show_usage(store.as_ref(), &ConversationId::new(conversation));
    }

    let controller_config =
        cfg.controller_config(args.provider.as_deref(), args.resource.as_deref())?;

    let Some(transcript) = args.replay else {
        eprintln!("Error: No backend configured");
        eprintln!();
        eprintln!("Replay a recorded transcript with: tern --replay <file.jsonl>");
        std::process::exit(1);
    };
    let backend = Arc::new(replay::ReplayBackend::from_file(&transcript)?);

    let conversation_id = args
        .conversation
        .map(ConversationId::new)
        .unwrap_or_else(|| ConversationId::new(uuid::Uuid::new_v4().to_string()));

    let mut controller =
        SessionController::open(controller_config, backend, store, conversation_id).await?;

    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!(
            "tern ({}) conversation: {}",
            controller.active_resource().id,
            controller.conversation_id()
        );
    }

    let updates = controller.subscribe();
    let (command_tx, command_rx) = mpsc::channel(16);

    let printer = tokio::spawn(print_updates(updates));

    // Non-interactive mode
    if let Some(prompt) = args.command {
        println!("tern> {}", prompt);
        println!();
        let idle = controller.subscribe();
        let driver = async move {
            let _ = command_tx
                .send(Command::Send {
                    text: prompt,
                    attachments: Vec::new(),
                })
                .await;
            wait_until_idle(idle).await;
        };
        tokio::join!(controller.run(command_rx), driver);
    } else {
        tokio::join!(controller.run(command_rx), read_commands(command_tx));
    }

    // Let the printer drain what the last turn published
    tokio::task::yield_now().await;
    printer.abort();
    Ok(())
}

/// Wait for the busy flag to fall after a prompt was sent
async fn wait_until_idle(mut updates: broadcast::Receiver<ControllerUpdate>) {
    let mut seen_busy = false;
    loop {
        match updates.recv().await {
            Ok(ControllerUpdate::Busy(true)) => seen_busy = true,
            Ok(ControllerUpdate::Busy(false)) if seen_busy => break,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Parse stdin lines into controller commands
async fn read_commands(command_tx: mpsc::Sender<Command>) {
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                break;
            }
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let command = match parse_command(input) {
            Some(InputCommand::Quit) => break,
            Some(InputCommand::Controller(command)) => command,
            Some(InputCommand::Unknown(name)) => {
                println!("Unknown command: /{}", name);
                println!("Commands: /stop, /switch <conversation>, /resource <id>, /quit");
                continue;
            }
            None => Command::Send {
                text: input.to_string(),
                attachments: Vec::new(),
            },
        };
        if command_tx.send(command).await.is_err() {
            break;
        }
    }
}

/// A slash command typed at the prompt
#[derive(Debug)]
enum InputCommand {
    Controller(Command),
    Quit,
    Unknown(String),
}

fn parse_command(input: &str) -> Option<InputCommand> {
    let rest = input.strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    Some(match name {
        "stop" => InputCommand::Controller(Command::Stop),
        "quit" | "exit" | "q" => InputCommand::Quit,
        "switch" if !arg.is_empty() => {
            InputCommand::Controller(Command::SwitchConversation(ConversationId::new(arg)))
        }
        "resource" if !arg.is_empty() => {
            InputCommand::Controller(Command::SelectResource(ResourceId::new(arg)))
        }
        "draft" => InputCommand::Controller(Command::SetDraft(arg.to_string())),
        other => InputCommand::Unknown(other.to_string()),
    })
}

async fn print_updates(mut updates: broadcast::Receiver<ControllerUpdate>) {
    loop {
        let update = match updates.recv().await {
            Ok(update) => update,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Display lagged, {} updates dropped", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if let Some(line) = render(&update) {
            println!("{}", line);
        }
    }
}

fn render(update: &ControllerUpdate) -> Option<String> {
    match update {
        ControllerUpdate::Busy(true) => Some("[working...]".to_string()),
        ControllerUpdate::Busy(false) => Some("[idle]".to_string()),
        ControllerUpdate::Progress(Some(thought)) => Some(match &thought.subject {
            Some(subject) => format!("[{}: {}]", subject, thought.description),
            None => format!("[{}]", thought.description),
        }),
        ControllerUpdate::Progress(None) => None,
        ControllerUpdate::Content(content) => Some(content.text.clone()),
        ControllerUpdate::Usage(usage) => Some(format!(
            "[Tokens: {} in, {} out, {} total]",
            usage.input_tokens, usage.output_tokens, usage.total_tokens
        )),
        ControllerUpdate::ResourceSwitched { from, to } => {
            Some(format!("[{} is out of quota, switched to {}]", from, to))
        }
        ControllerUpdate::NoFallbackAvailable { resource } => Some(format!(
            "[{} is out of quota and no fallback is available]",
            resource
        )),
        ControllerUpdate::Error { message } => Some(format!("Error: {}", message)),
        ControllerUpdate::Passthrough(raw) => {
            tracing::debug!("Unhandled event {}: {}", raw.kind, raw.payload);
            None
        }
    }
}

fn show_usage(store: &dyn UsageStore, conversation_id: &ConversationId) -> anyhow::Result<()> {
    match store.load(conversation_id)? {
        Some(usage) => println!(
            "{}: {} in, {} out, {} total",
            conversation_id, usage.input_tokens, usage.output_tokens, usage.total_tokens
        ),
        None => println!("No usage recorded for {}", conversation_id),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_ai::{ThoughtUpdate, UsageSnapshot};

    #[test]
    fn test_parse_plain_text_is_not_a_command() {
        assert!(parse_command("hello there").is_none());
    }

    #[test]
    fn test_parse_stop_and_quit() {
        assert!(matches!(
            parse_command("/stop"),
            Some(InputCommand::Controller(Command::Stop))
        ));
        assert!(matches!(parse_command("/quit"), Some(InputCommand::Quit)));
    }

    #[test]
    fn test_parse_switch_takes_conversation() {
        match parse_command("/switch  abc-123 ") {
            Some(InputCommand::Controller(Command::SwitchConversation(id))) => {
                assert_eq!(id.as_str(), "abc-123")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_command("/switch"),
            Some(InputCommand::Unknown(_))
        ));
    }

    #[test]
    fn test_render_updates() {
        assert_eq!(
            render(&ControllerUpdate::Progress(Some(
                ThoughtUpdate::new("reading files").with_subject("Planning")
            ))),
            Some("[Planning: reading files]".to_string())
        );
        assert_eq!(render(&ControllerUpdate::Progress(None)), None);
        assert_eq!(
            render(&ControllerUpdate::Usage(UsageSnapshot::new(3, 4))),
            Some("[Tokens: 3 in, 4 out, 7 total]".to_string())
        );
    }
}
