use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docchat_chat::{encode_ndjson, ChatPipeline};
use docchat_core::config::Config;
use docchat_core::traits::ChunkStore;
use docchat_core::types::{ChatRequest, ConversationHistory};
use docchat_llm::OllamaClient;
use docchat_vector::LanceChunkStore;

mod ingest;

#[derive(Parser)]
#[command(name = "docchat", about = "Ask questions about your documents")]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question, writing NDJSON events to stdout
    Ask {
        /// The question; use `-` to read a JSON chat request from stdin
        message: String,
        /// Restrict retrieval to these filenames
        #[arg(short, long = "file")]
        files: Vec<String>,
        /// JSON file holding the conversation so far
        #[arg(long)]
        history: Option<PathBuf>,
        /// Skip the Ollama model availability check
        #[arg(long)]
        no_model_check: bool,
    },
    /// Chunk, embed and store the text files in a directory
    Ingest {
        dir: PathBuf,
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
    },
    /// List the files in the knowledge base
    Files,
    /// Remove a file from the knowledge base
    Delete { filename: String },
    /// Make sure the configured model is present in Ollama, pulling it if not
    CheckModel,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug,lance=warn,tantivy=warn" } else { "info,lance=warn,tantivy=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_request(message: String, files: Vec<String>, history: Option<PathBuf>) -> Result<ChatRequest> {
    if message == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return serde_json::from_str(&raw).context("parsing chat request from stdin");
    }
    let history: ConversationHistory = match history {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing history in {}", path.display()))?
        }
        None => Vec::new(),
    };
    let selected_files = if files.is_empty() { None } else { Some(files) };
    Ok(ChatRequest { message, history, selected_files })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let settings = Config::load()?.settings()?;

    match cli.command {
        Command::Ask { message, files, history, no_model_check } => {
            let request = read_request(message, files, history)?;
            if !no_model_check {
                if let Err(e) = OllamaClient::new(&settings.llm)?.ensure_model().await {
                    warn!(error = %e, base_url = %settings.llm.base_url, "could not verify model availability");
                }
            }
            let pipeline = Arc::new(ChatPipeline::from_settings(&settings).await?);
            let mut events = pipeline.stream(request);
            let mut out = std::io::stdout().lock();
            while let Some(event) = events.next().await {
                out.write_all(encode_ndjson(&event)?.as_bytes())?;
                out.flush()?;
            }
        }
        Command::Ingest { dir, batch_size } => {
            let n = ingest::run(&settings, &dir, batch_size).await?;
            println!("Stored {n} chunks from {}", dir.display());
        }
        Command::Files => {
            let store = LanceChunkStore::from_settings(&settings.store).await?;
            for f in store.list_files().await? {
                println!("{f}");
            }
        }
        Command::Delete { filename } => {
            let store = LanceChunkStore::from_settings(&settings.store).await?;
            store.delete_file(&filename).await?;
            info!(filename = %filename, "deleted");
        }
        Command::CheckModel => {
            let client = OllamaClient::new(&settings.llm)?;
            let status = client.ensure_model().await?;
            println!("{}: {:?}", client.model(), status);
        }
    }
    Ok(())
}
