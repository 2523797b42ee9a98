//! # Panchakarma Bot CLI (`panchakarma`)
//!
//! ## Usage
//!
//! ```bash
//! panchakarma --config ./config/panchakarma.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `panchakarma serve` | Start the web chat UI |
//! | `panchakarma chat` | Interactive console session |
//! | `panchakarma ask "<question>"` | Answer one question and exit |
//! | `panchakarma retrieve "<question>"` | Show the passages a question retrieves |
//! | `panchakarma models` | List Gemini models that support generation |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use panchakarma_bot::config::{self, Config};
use panchakarma_bot::gemini::{self, GeminiBackend};
use panchakarma_bot::{console, knowledge, logging, server};
use panchakarma_core::Responder;

const DEFAULT_CONFIG_PATH: &str = "./config/panchakarma.toml";

/// Panchakarma Bot: Ayurvedic guidance grounded in a local knowledge file
/// and generated by Google Gemini.
#[derive(Parser)]
#[command(name = "panchakarma", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/panchakarma.toml` when that file exists, and to
    /// built-in settings otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web chat UI and JSON API on `[server].bind`.
    Serve,

    /// Interactive console session.
    Chat {
        /// Therapy type to focus on; skips the startup question.
        #[arg(long)]
        therapy: Option<String>,
    },

    /// Answer a single question and print the response.
    Ask {
        question: String,

        #[arg(long)]
        therapy: Option<String>,
    },

    /// Print the passages retrieved for a question with their distances.
    Retrieve {
        question: String,

        /// Number of passages (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// List Gemini models that support `generateContent`.
    Models,
}

async fn build_responder(cfg: &Config) -> Result<Responder> {
    let knowledge = knowledge::open_knowledge_base(cfg).await?;
    let backend = Arc::new(GeminiBackend::new(&cfg.generation)?);
    Ok(Responder::new(knowledge, backend, cfg.retrieval.top_k))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::resolve_config(cli.config.as_deref(), Path::new(DEFAULT_CONFIG_PATH))?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Chat { therapy } => {
            let responder = build_responder(&cfg).await?;
            let stdin = std::io::stdin();
            console::run_console(&responder, therapy, stdin.lock(), std::io::stdout()).await?;
        }
        Commands::Ask { question, therapy } => {
            let responder = build_responder(&cfg).await?;
            let response = responder.respond(&question, therapy.as_deref()).await;
            println!("{}", response);
        }
        Commands::Retrieve { question, k } => {
            let kb = knowledge::open_knowledge_base(&cfg).await?.snapshot();
            let k = k.unwrap_or(cfg.retrieval.top_k);
            let hits = kb.retrieve_scored(&question, k).await?;
            if hits.is_empty() {
                println!("No passages retrieved.");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [passage {}] distance={:.4}",
                    rank + 1,
                    hit.passage.position,
                    hit.distance
                );
                println!("   {}", hit.passage.text.replace('\n', "\n   "));
                println!();
            }
        }
        Commands::Models => {
            let models = gemini::list_models(&cfg.generation).await?;
            for model in models {
                match model.display_name {
                    Some(display) => println!("{}  ({})", model.name, display),
                    None => println!("{}", model.name),
                }
            }
        }
    }

    Ok(())
}
