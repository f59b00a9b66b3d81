//! # Context DB CLI (`ctxdb`)
//!
//! ## Usage
//!
//! ```bash
//! ctxdb --config ./config/ctxdb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctxdb init` | Create the SQLite database and run schema migrations |
//! | `ctxdb add <target>...` | Add files or URLs and wait for processing |
//! | `ctxdb add-dir <dir>` | Add every matching file (`**/*.md` by default) under a directory |
//! | `ctxdb search "<query>"` | Semantic search |
//! | `ctxdb ls [uri]` | List children of a URI |
//! | `ctxdb read <uri>` | Print raw content (L2) |
//! | `ctxdb abstract <uri>` | Print the abstract (L0) |
//! | `ctxdb overview <uri>` | Print the overview (L1) |
//! | `ctxdb status <uri>` | Show both pipeline states of a resource |
//! | `ctxdb info` | Database statistics |
//! | `ctxdb retry` | Re-run failed pipeline work |
//!
//! ## Examples
//!
//! ```bash
//! ctxdb init
//! ctxdb add ./notes/design.md https://example.com/spec.html --parent research
//! ctxdb add-dir ./docs --pattern "**/*.{md,txt}"
//! ctxdb search "how are retries configured" --limit 3
//! ctxdb ls ctx://resources/docs
//! ctxdb abstract ctx://resources/docs/intro.md
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use context_db::config::{self, Config};
use context_db::engine::{ContextDb, EngineOptions};
use context_db::ingest::DEFAULT_DIR_PATTERN;
use context_db::tracker::JoinScope;
use context_db::{db, get, ingest, migrate, search, stats};

/// Context DB — a local context database with semantic search and
/// multi-level summaries.
#[derive(Parser)]
#[command(
    name = "ctxdb",
    about = "Context DB — ingest files and URLs, embed and summarize them, search and browse",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(
        long,
        global = true,
        env = "CTXDB_CONFIG",
        default_value = "./config/ctxdb.toml"
    )]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Add files or URLs.
    ///
    /// Each target becomes one resource under the namespace root (or under
    /// `--parent`). By default the command waits until both pipelines have
    /// finished for everything it added.
    Add {
        /// File paths or http(s) URLs.
        #[arg(required = true)]
        targets: Vec<String>,

        /// Parent subpath (`a/b`) or full URI to place the resources under.
        #[arg(long)]
        parent: Option<String>,

        /// Return as soon as the resources are stored.
        #[arg(long)]
        no_wait: bool,
    },

    /// Add every file under a directory, mirroring its layout.
    AddDir {
        dir: PathBuf,

        /// Only add files whose relative path matches this glob.
        #[arg(long, default_value = DEFAULT_DIR_PATTERN)]
        pattern: String,

        #[arg(long)]
        parent: Option<String>,

        #[arg(long)]
        no_wait: bool,
    },

    /// Semantic search over embedded resources.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,

        /// Only search below this URI.
        #[arg(long)]
        scope: Option<String>,
    },

    /// List the children of a URI (the root by default).
    Ls {
        uri: Option<String>,

        /// Include entries whose name starts with a dot.
        #[arg(short, long)]
        all: bool,
    },

    /// Print the raw content (L2) of a resource.
    Read { uri: String },

    /// Print the abstract (L0) of a resource.
    Abstract { uri: String },

    /// Print the overview (L1) of a resource.
    Overview { uri: String },

    /// Show a resource's metadata and pipeline states.
    Status { uri: String },

    /// Show database statistics.
    Info,

    /// Re-enqueue every failed pipeline and wait for the result.
    Retry {
        #[arg(long)]
        no_wait: bool,
    },
}

impl Commands {
    /// Commands that schedule pipeline work resume unfinished work on open.
    fn resumes_work(&self) -> bool {
        matches!(
            self,
            Commands::Add { .. } | Commands::AddDir { .. } | Commands::Retry { .. }
        )
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "context_db=debug"
    } else {
        "context_db=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn open(cfg: &Config, command: &Commands) -> anyhow::Result<ContextDb> {
    let mut options = EngineOptions::from_config(cfg);
    options.resume_pending = command.resumes_work();
    ContextDb::open_with(cfg, options).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        let pool = db::connect(&cfg).await?;
        migrate::run_migrations(&pool).await?;
        pool.close().await;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let ctx = open(&cfg, &cli.command).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Add {
            targets,
            parent,
            no_wait,
        } => {
            ingest::run_add(&ctx, &targets, parent.as_deref(), !no_wait).await?;
        }
        Commands::AddDir {
            dir,
            pattern,
            parent,
            no_wait,
        } => {
            ingest::run_add_dir(&ctx, &dir, Some(&pattern), parent.as_deref(), !no_wait).await?;
        }
        Commands::Search {
            query,
            limit,
            scope,
        } => {
            search::run_search(&ctx, &query, limit, scope.as_deref()).await?;
        }
        Commands::Ls { uri, all } => {
            get::run_ls(&ctx, uri.as_deref(), all).await?;
        }
        Commands::Read { uri } => {
            get::run_read(&ctx, &uri).await?;
        }
        Commands::Abstract { uri } => {
            get::run_abstract(&ctx, &uri).await?;
        }
        Commands::Overview { uri } => {
            get::run_overview(&ctx, &uri).await?;
        }
        Commands::Status { uri } => {
            get::run_status(&ctx, &uri).await?;
        }
        Commands::Info => {
            stats::run_info(&ctx, &cfg).await?;
        }
        Commands::Retry { no_wait } => {
            let count = ctx.retry_failed().await?;
            println!("re-enqueued {} work items", count);
            if count > 0 && !no_wait {
                ctx.wait_processed(JoinScope::All).await;
                let stats = ctx.info().await?;
                println!(
                    "remaining failures: {} embedding, {} summarization",
                    stats.embedding.failed, stats.summarization.failed
                );
            }
        }
    }

    Ok(())
}
