//! Terminal client for the cinema assistant.

mod chat;
mod config;
mod observability;
mod replay;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use cinema_assistant::{Assistant, ChatClient, Conversation};

#[derive(Parser)]
#[command(name = "cinema-assistant", version, about = "Ask the classic Arabic cinema assistant")]
struct Cli {
    /// Overall timeout per reply, in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,
    /// Debug logging for the assistant client.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question and stream the answer.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Interactive chat; history is kept between questions.
    Chat,
    /// Decode a recorded event-stream transcript without network access.
    Replay {
        path: PathBuf,
        /// Bytes fed to the decoder per chunk.
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::init();
    let cli = Cli::parse();
    observability::init_observability(cli.verbose);
    let timeout = cli.timeout.map(Duration::from_secs);

    match cli.command {
        Command::Ask { question } => {
            let assistant = assistant_from_env()?;
            let mut conversation = Conversation::new();
            let question = question.join(" ");
            let mut interrupts = chat::Interrupts::listen();
            chat::ask_once(
                &assistant,
                &mut conversation,
                &question,
                timeout,
                &mut interrupts,
                &mut std::io::stdout(),
            )
            .await?;
        }
        Command::Chat => {
            let assistant = assistant_from_env()?;
            chat::run_chat(&assistant, timeout).await?;
        }
        Command::Replay { path, chunk_size } => {
            let mut stdout = std::io::stdout();
            let summary = replay::replay_file(&path, chunk_size, &mut stdout)?;
            println!();
            eprintln!(
                "fragments={} chars={} end={:?} discarded_bytes={}",
                summary.fragments,
                summary.message.chars().count(),
                summary.end_reason,
                summary.discarded_bytes
            );
        }
    }
    Ok(())
}

fn assistant_from_env() -> Result<Assistant, cinema_assistant::StreamError> {
    Assistant::builder()
        .transport(Arc::new(ChatClient::from_env()?))
        .build()
}
