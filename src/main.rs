//! # logmine CLI
//!
//! ## Usage
//!
//! ```bash
//! logmine --config ./config/logmine.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `logmine init` | Create the SQLite database and the template catalog |
//! | `logmine run <inputs>...` | Mine templates and store extracted fields |
//! | `logmine tables` | List template tables with arity and row counts |
//! | `logmine patterns` | List remembered templates per source |
//! | `logmine clean` | Forget every remembered template |
//!
//! ## Examples
//!
//! ```bash
//! logmine init
//! logmine run /var/log/app.log --threshold 0.8 --max-lines 0
//! logmine run 'logs/**/*.log' --buf-size 512KB
//! logmine tables
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use logmine::config::{self, RunOverrides};
use logmine::progress::ProgressMode;
use logmine::{migrate, mine, patterns, tables};

/// Mine recurring templates out of unstructured logs.
///
/// Lines that match a known template are split into fields and stored in
/// SQLite, one table per template. Unmatched lines are clustered by
/// embedding similarity and a language model proposes a template for each
/// cluster; learned templates are remembered per input for later runs.
#[derive(Parser)]
#[command(name = "logmine", version, about = "Mine recurring templates out of unstructured logs")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/logmine.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Mine the given inputs.
    ///
    /// Inputs are files, directories, glob patterns, or `-` for stdin. The
    /// joined argument list is the key under which learned templates are
    /// remembered.
    Run {
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Maximum records to store; 0 stores everything.
        #[arg(long = "max-lines")]
        max_lines: Option<usize>,

        /// Clusterer buffer budget, e.g. `2MB`.
        #[arg(long = "buf-size")]
        buf_size: Option<String>,

        /// Maximum characters kept per line.
        #[arg(long = "max-len")]
        max_len: Option<usize>,

        /// Cosine similarity threshold for communities.
        #[arg(long)]
        threshold: Option<f32>,

        /// Smallest community that gets sampled.
        #[arg(long)]
        min_community_size: Option<usize>,

        /// Base URL of the completion API.
        #[arg(long)]
        api_base: Option<String>,

        /// Progress on stderr (default: human when stderr is a TTY).
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List template tables.
    Tables,

    /// List remembered templates.
    Patterns {
        /// Only this source key (the joined input arguments of a run).
        #[arg(long)]
        source: Option<String>,
    },

    /// Delete the pattern memory file.
    Clean,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logmine=info,logmine_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Run {
            inputs,
            max_lines,
            buf_size,
            max_len,
            threshold,
            min_community_size,
            api_base,
            progress,
            json,
        } => {
            let cfg = cfg.with_overrides(RunOverrides {
                max_line_len: max_len,
                buffer_size: buf_size,
                threshold,
                min_community_size,
                max_records: max_lines,
                api_base,
            })?;
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();
            let summary = mine::run_mine(&cfg, &inputs, reporter.as_ref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                summary.print();
            }
        }
        Commands::Tables => {
            tables::run_tables(&cfg).await?;
        }
        Commands::Patterns { source } => {
            patterns::run_patterns(&cfg, source.as_deref())?;
        }
        Commands::Clean => {
            patterns::run_clean(&cfg)?;
        }
    }

    Ok(())
}
