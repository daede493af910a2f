//! Paste Store CLI
//!
//! One-shot access to a configured document store.
//!
//! # Usage
//!
//! ```bash
//! # Store stdin, print the new key
//! echo 'fn main() {}' | pastectl --config pastes.yaml put --title "Hello" --tags rust,demo
//!
//! # Read it back without touching its expiration
//! pastectl --config pastes.yaml get abcdefghjk --raw --skip-expire
//!
//! # Tag statistics, purge expired documents
//! pastectl tags
//! pastectl purge
//! ```
//!
//! Output is JSON on stdout; logs go to stderr (`RUST_LOG` overrides `info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paste_store::{DocumentHandler, PasteStoreConfig, StoreError, StoreRuntime};
use serde_json::json;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pastectl")]
#[command(about = "Paste Store - store, fetch and search text documents", long_about = None)]
struct Cli {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a document read from FILE or stdin
    Put {
        /// Searchable title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Comma separated tags
        #[arg(long, default_value = "")]
        tags: String,

        /// Input file (stdin when omitted)
        file: Option<PathBuf>,
    },

    /// Fetch a document
    Get {
        key: String,

        /// Write the document body only
        #[arg(long)]
        raw: bool,

        /// Do not refresh the expiration
        #[arg(long)]
        skip_expire: bool,
    },

    /// Delete a document
    Delete { key: String },

    /// Search titles and tags
    Search { term: String },

    /// Tag statistics
    Tags,

    /// Remove expired documents now
    Purge,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<StoreError>() {
                Some(store_err) => {
                    tracing::error!("{}", store_err);
                    println!("{}", json!(store_err.to_response()));
                }
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = PasteStoreConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    // One-shot process: `purge` covers what the reaper would do
    config.reap_interval_secs = 0;

    let runtime = StoreRuntime::init(&config).await?;
    let result = execute(&runtime.handler(), cli.command).await;
    runtime.shutdown().await?;
    result
}

async fn execute(handler: &DocumentHandler, command: Commands) -> Result<()> {
    match command {
        Commands::Put { title, tags, file } => {
            let value = read_input(file)?;
            let key = handler.set(&value, &title, &tags).await?;
            println!("{}", json!({ "key": key }));
        }
        Commands::Get {
            key,
            raw,
            skip_expire,
        } => {
            if raw {
                let body = handler.get_raw(&key, skip_expire).await?;
                std::io::stdout()
                    .write_all(&body)
                    .context("Failed to write document")?;
            } else {
                let doc = handler.get(&key, skip_expire).await?;
                println!("{}", serde_json::to_string(&doc)?);
            }
        }
        Commands::Delete { key } => {
            handler.delete(&key).await?;
            println!("{}", json!({ "data": true }));
        }
        Commands::Search { term } => {
            let hits = handler.search(&term).await?;
            println!("{}", json!({ "data": hits }));
        }
        Commands::Tags => {
            let stats = handler.tag_stats().await?;
            println!("{}", json!({ "data": stats }));
        }
        Commands::Purge => {
            let purged = handler.purge_expired().await?;
            println!("{}", json!({ "purged": purged }));
        }
    }
    Ok(())
}

fn read_input(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            Ok(buffer)
        }
    }
}
