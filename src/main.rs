//! # docdex CLI
//!
//! Development driver for the indexing and retrieval pipeline. The real
//! deployment sits behind an API layer; this binary exercises the same
//! [`IndexService`] facade against a local SQLite database.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docdex init` | Create the SQLite database and run schema migrations |
//! | `docdex add <file>` | Store a text file as a new document |
//! | `docdex index <id>` | Index a document and watch its progress |
//! | `docdex query "<text>"` | Ask a question over the indexed documents |
//! | `docdex progress <job>` | Show the progress record for a job |
//! | `docdex remove <id>` | Remove a document from the vector index |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use docdex::config::load_config;
use docdex::documents::{DocumentBackend, SqliteDocumentBackend};
use docdex::progress::JobStatus;
use docdex::{db, migrate, IndexService};

#[derive(Parser)]
#[command(
    name = "docdex",
    about = "docdex — an asynchronous document indexing and retrieval pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docdex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Store a plain-text file as a new document and print its id.
    Add {
        /// Path to the extracted text file.
        file: PathBuf,
        /// Owner identifier the document is scoped to.
        #[arg(long, default_value = "local")]
        owner: String,
        /// Start indexing immediately after storing.
        #[arg(long)]
        index: bool,
    },

    /// Index a stored document and watch the job until it finishes.
    Index {
        /// Document id.
        id: i64,
        #[arg(long, default_value = "local")]
        owner: String,
    },

    /// Ask a question over the owner's indexed documents.
    Query {
        /// The question text.
        text: String,
        #[arg(long, default_value = "local")]
        owner: String,
        /// Restrict retrieval to these document ids.
        #[arg(long = "doc")]
        docs: Vec<i64>,
        /// Generation model override.
        #[arg(long)]
        model: Option<String>,
    },

    /// Print the progress record for a job id.
    Progress {
        job_id: String,
    },

    /// Remove a document's chunks from the vector index.
    Remove {
        id: i64,
        #[arg(long, default_value = "local")]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docdex=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;

    match cli.command {
        Commands::Init => {
            println!("initialized {}", config.db.path.display());
        }

        Commands::Add { file, owner, index } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let backend = SqliteDocumentBackend::new(pool.clone());
            let id = backend.create(&owner, &text).await?;
            println!("document {}", id);

            if index {
                let service = IndexService::from_pool(config, pool.clone())?;
                watch_indexing(&service, id, &owner, text).await?;
            }
        }

        Commands::Index { id, owner } => {
            let service = IndexService::from_pool(config, pool.clone())?;
            let doc = service
                .documents()
                .get_document(id)
                .await?
                .with_context(|| format!("document {} not found", id))?;
            if doc.owner_id != owner {
                bail!("document {} does not belong to owner '{}'", id, owner);
            }
            watch_indexing(&service, id, &owner, doc.content).await?;
        }

        Commands::Query {
            text,
            owner,
            docs,
            model,
        } => {
            let service = IndexService::from_pool(config, pool.clone())?;
            let filter = if docs.is_empty() {
                None
            } else {
                Some(docs.as_slice())
            };
            let response = service
                .query(&owner, &text, filter, model.as_deref())
                .await?;

            for chunk in &response.retrieved_chunks {
                println!(
                    "[doc {} | {:.3}] {}",
                    chunk.document_id,
                    chunk.similarity,
                    snippet(&chunk.text)
                );
            }
            match (&response.answer, &response.generation_error) {
                (Some(answer), _) => println!("\n{}", answer),
                (None, Some(err)) => eprintln!("generation failed: {}", err),
                (None, None) => {}
            }
        }

        Commands::Progress { job_id } => {
            let service = IndexService::from_pool(config, pool.clone())?;
            match service.get_progress(&job_id) {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("job {} unknown (finished and swept, or never started)", job_id),
            }
        }

        Commands::Remove { id, owner } => {
            let service = IndexService::from_pool(config, pool.clone())?;
            service.remove_document(id, &owner).await?;
            println!("removed document {}", id);
        }
    }

    pool.close().await;
    Ok(())
}

/// Kick off indexing and poll the tracker until the job reaches a
/// terminal state, mirroring what an API client would do.
async fn watch_indexing(service: &IndexService, id: i64, owner: &str, text: String) -> Result<()> {
    let job_id = service.start_indexing(None, id, owner, text, None);

    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let Some(report) = service.get_progress(&job_id) else {
            continue;
        };
        eprintln!(
            "indexing {}  {}% ({}/{} chunks)",
            job_id, report.percent, report.processed_units, report.total_units
        );
        match report.status {
            JobStatus::Completed => {
                println!("indexed document {}", id);
                return Ok(());
            }
            JobStatus::Failed => {
                bail!(
                    "indexing failed: {}",
                    report.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            JobStatus::Pending | JobStatus::Processing => {}
        }
    }
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 160 {
        let end = flat
            .char_indices()
            .nth(160)
            .map(|(i, _)| i)
            .unwrap_or(flat.len());
        format!("{}…", &flat[..end])
    } else {
        flat
    }
}
