//! # wpsync CLI
//!
//! ## Usage
//!
//! ```bash
//! wpsync --config ./config/wpsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wpsync init` | Create the SQLite database and run schema migrations |
//! | `wpsync sync` | Run one full sync cycle |
//! | `wpsync sync --post <id>` | Resync a single post by remote id |
//! | `wpsync status` | Show the last recorded sync cycle |
//! | `wpsync posts` | List mirrored posts |
//! | `wpsync clean [file]` | Clean an HTML fragment (stdin when no file) |
//! | `wpsync serve` | Start the HTTP API and the background schedule |
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG=wpsync=debug`
//! for per-page detail.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wpsync::config;
use wpsync::migrate;
use wpsync::models::{SyncResult, SyncState, SyncStatus};
use wpsync::progress::{format_number, ProgressMode};
use wpsync::server;
use wpsync::service::SyncService;
use wpsync::sqlite_store::SqliteStore;
use wpsync_core::store::{PostStore, RunLog};

/// wpsync: mirror WordPress posts into a local SQLite store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/wpsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "wpsync",
    about = "wpsync: mirror WordPress posts into a local SQLite store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wpsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Pull posts from WordPress and reconcile them into the local store.
    Sync {
        /// Resync only this post (remote id).
        #[arg(long)]
        post: Option<i64>,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Show the most recently recorded sync cycle.
    Status,

    /// List mirrored posts, newest remote revision first.
    Posts {
        /// Maximum number of posts to print.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Clean an HTML fragment and print the canonical form.
    ///
    /// Does not need a config file.
    Clean {
        /// Input file. Reads stdin when omitted.
        file: Option<PathBuf>,
    },

    /// Start the HTTP API and, if configured, the background schedule.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Clean { file } = &cli.command {
        return run_clean(file.as_deref());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { post, progress } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            let service =
                SyncService::from_config_with_progress(&cfg, Some(mode.reporter())).await?;

            let result = match post {
                Some(id) => service.sync_single_wordpress_post(id).await?,
                None => service.sync_wordpress_posts().await?,
            };
            print_result(post, &result);

            if result.state == SyncState::Failed {
                bail!(
                    "sync failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Commands::Status => {
            let store = open_store(&cfg).await?;
            match store.last_run().await? {
                Some(status) => print_status(&status),
                None => println!("No sync has been recorded yet."),
            }
        }
        Commands::Posts { limit } => {
            let store = open_store(&cfg).await?;
            let mut posts = store.list().await?;
            posts.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
            let shown = limit.unwrap_or(posts.len()).min(posts.len());

            for post in &posts[..shown] {
                let mut flags = Vec::new();
                if post.moderation.hidden {
                    flags.push("hidden");
                }
                if post.moderation.comments_locked {
                    flags.push("locked");
                }
                println!(
                    "{:>8}  {}  {:<8} {}{}",
                    post.remote_id,
                    post.updated_at().format("%Y-%m-%d %H:%M"),
                    post.fields.status,
                    post.fields.title,
                    if flags.is_empty() {
                        String::new()
                    } else {
                        format!("  [{}]", flags.join(", "))
                    }
                );
            }
            println!("{} of {} posts", shown, posts.len());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Clean { file } => run_clean(file.as_deref())?,
    }

    Ok(())
}

fn run_clean(file: Option<&Path>) -> anyhow::Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    println!("{}", wpsync::clean_content(&raw));
    Ok(())
}

async fn open_store(cfg: &config::Config) -> anyhow::Result<SqliteStore> {
    let pool = wpsync::db::connect(cfg).await?;
    migrate::migrate_pool(&pool).await?;
    Ok(SqliteStore::new(pool))
}

fn print_result(post: Option<i64>, result: &SyncResult) {
    match post {
        Some(id) => println!("sync post {}", id),
        None => println!("sync wordpress"),
    }
    println!("  state: {}", result.state);
    println!(
        "  imported: {} / {} posts",
        format_number(result.posts_imported),
        format_number(result.total_posts)
    );
    println!("  created: {}", result.created);
    println!("  updated: {}", result.updated);
    println!("  skipped: {}", result.skipped);
    println!("  failed: {}", result.failed);
    if let Some(error) = &result.error {
        println!("  error: {}", error);
    }
    if result.success {
        println!("ok");
    }
}

fn print_status(status: &SyncStatus) {
    println!("state: {}", status.state);
    match status.last_sync_time {
        Some(t) => println!("last sync: {}", t.to_rfc3339()),
        None => println!("last sync: never"),
    }
    println!(
        "imported: {} / {} posts",
        format_number(status.posts_imported),
        format_number(status.total_posts)
    );
    if let Some(error) = &status.last_error {
        println!("last error: {}", error);
    }
}
