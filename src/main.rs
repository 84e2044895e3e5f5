//! tiercache CLI
//!
//! Operates a tiered cache directory from the command line.
//!
//! ```text
//! tiercache --base-dir /var/cache/ctx put session-42 --file blob.bin
//! tiercache --base-dir /var/cache/ctx get session-42 > blob.bin
//! tiercache --base-dir /var/cache/ctx migrate
//! tiercache --base-dir /var/cache/ctx stats --json
//! ```
//!
//! The hot tier only lives for one invocation; entries still hot when the
//! command finishes are spilled to warm.

use std::io::Write;
use std::path::PathBuf;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::adapters::LoggingEventListener;
use tiercache::cache::{CacheConfig, TieredCache};
use tiercache::{Error, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiercache - Hot/warm/cold content cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cache root directory
    #[arg(long, env = "TIERCACHE_DIR", default_value = "./tiercache")]
    base_dir: PathBuf,

    /// Hot tier byte budget (overrides the config file)
    #[arg(long, env = "TIERCACHE_HOT_CAPACITY_BYTES")]
    hot_capacity_bytes: Option<u64>,

    /// YAML configuration file
    #[arg(long, env = "TIERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store content under a key
    Put {
        key: String,
        /// Inline value
        #[arg(long, conflicts_with = "file")]
        value: Option<String>,
        /// Read the value from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Owner recorded with the entry
        #[arg(long)]
        owner: Option<String>,
    },
    /// Print content to stdout (or a file)
    Get {
        key: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show the tier and metadata of an entry without touching it
    Peek { key: String },
    /// Remove an entry
    Delete { key: String },
    /// Run one age-based migration sweep
    Migrate,
    /// Show per-tier statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Remove every entry from every tier
    Clear,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args);

    if let Err(e) = run(args).await {
        error!(error = %e, "Command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_yaml_file(path)?,
        None => CacheConfig::default(),
    };
    config.base_dir = args.base_dir.clone();
    if let Some(bytes) = args.hot_capacity_bytes {
        config.hot_capacity_bytes = bytes;
    }

    let cache = TieredCache::open(config).await?;
    cache.subscribe(std::sync::Arc::new(LoggingEventListener::new()));
    info!(base_dir = %args.base_dir.display(), "Opened cache");

    let outcome = execute(&cache, args.command).await;

    // Persist whatever is still hot even when the command failed
    let spill = cache.spill_hot().await;
    if spill.failed > 0 {
        error!(failed = spill.failed, "Some hot entries could not be spilled");
    }
    outcome
}

async fn execute(cache: &TieredCache, command: Command) -> Result<()> {
    match command {
        Command::Put {
            key,
            value,
            file,
            owner,
        } => {
            let content = match (value, file) {
                (Some(value), _) => Bytes::from(value),
                (None, Some(path)) => Bytes::from(tokio::fs::read(&path).await?),
                (None, None) => {
                    return Err(Error::Config("put needs --value or --file".into()));
                }
            };
            let size = content.len();
            cache.store(&key, content, owner.as_deref()).await?;
            println!("stored {key} ({size} bytes)");
        }
        Command::Get { key, output } => match cache.retrieve(&key).await? {
            Some(content) => match output {
                Some(path) => tokio::fs::write(&path, &content).await?,
                None => std::io::stdout().write_all(&content)?,
            },
            None => return Err(Error::Internal(format!("{key}: not found"))),
        },
        Command::Peek { key } => match cache.peek(&key) {
            Some((tier, metadata)) => {
                let doc = serde_json::json!({ "tier": tier, "metadata": metadata });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            }
            None => return Err(Error::Internal(format!("{key}: not found"))),
        },
        Command::Delete { key } => {
            if cache.delete(&key).await? {
                println!("deleted {key}");
            } else {
                println!("{key}: not found");
            }
        }
        Command::Migrate => {
            let report = cache.run_migration().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Stats { json } => {
            let stats = cache.statistics();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{:<6} {:>10} {:>16}", "tier", "entries", "bytes");
                for (name, tier) in [("hot", &stats.hot), ("warm", &stats.warm), ("cold", &stats.cold)] {
                    println!("{:<6} {:>10} {:>16}", name, tier.count, tier.total_size_bytes);
                }
            }
        }
        Command::Clear => {
            cache.clear().await?;
            println!("cleared");
        }
    }
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
