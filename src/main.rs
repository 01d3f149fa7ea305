//! # Report Harness CLI (`rh`)
//!
//! The `rh` binary runs retrieval plans, repairs generated drafts, and
//! inspects report sections.
//!
//! ## Usage
//!
//! ```bash
//! rh --config ./config/rh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rh collect <plan>` | Run a query plan against the search service |
//! | `rh report <subject>` | Collect, draft and repair a full report |
//! | `rh repair <draft>` | Rebuild tables and normalize a draft |
//! | `rh validate <file>` | Count tables in a section |
//! | `rh normalize [file]` | Normalize markdown text |
//!
//! ## Examples
//!
//! ```bash
//! # Collect research and print the aggregated text
//! rh collect plan.json --subject NVIDIA --aggregate
//!
//! # Full report as markdown
//! PERPLEXITY_API_KEY=... rh report NVIDIA --markdown
//!
//! # Repair a single markdown section
//! rh repair valuation.md --section valuationAnalysis
//!
//! # Check a section has at least three tables
//! rh validate valuation.md --min-tables 3
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `warn`).

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use report_harness::commands;
use report_harness::config::{self, Config};
use report_harness::progress::ProgressMode;

/// Report Harness CLI: collect research, draft reports, and repair their
/// markdown.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rh",
    about = "Report Harness: concurrent research collection and report repair",
    version,
    long_about = "Report Harness fans search queries out concurrently with bounded retries, \
    drafts a multi-section report from the results, and repairs the draft's markdown: \
    compact tables are rebuilt or quarantined, text is normalized, and sections are \
    checked against minimum table counts."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rh.toml`. Commands that do not call the
    /// search service run with built-in defaults when the file is missing.
    #[arg(long, global = true, default_value = "./config/rh.toml")]
    config: PathBuf,

    /// Progress output on stderr: `off`, `human` or `json`.
    /// Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true)]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a query plan against the configured search service.
    ///
    /// Prints the retrieval batch as JSON, one result per query in plan
    /// order, or the aggregated analysis text with `--aggregate`.
    Collect {
        /// Planner output: a JSON object with a `queries` array.
        plan: PathBuf,

        /// Subject named in the aggregated text. Defaults to the plan's
        /// file name.
        #[arg(long)]
        subject: Option<String>,

        /// Print the aggregated analysis text instead of JSON.
        #[arg(long)]
        aggregate: bool,
    },

    /// Collect, draft and repair a full report for a subject.
    ///
    /// Uses the default query plan unless `--plan` is given.
    Report {
        /// Subject of the report (e.g. a company name).
        subject: String,

        /// Planner output to use instead of the default plan.
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Print the report as markdown instead of artifact JSON.
        #[arg(long)]
        markdown: bool,
    },

    /// Repair a generated draft.
    ///
    /// Rebuilds compact tables, normalizes text, validates every section
    /// against the configured contract, and prints the artifact.
    Repair {
        /// Raw generator response (JSON object of section texts).
        draft: PathBuf,

        /// Treat the whole file as the markdown of this one section.
        #[arg(long)]
        section: Option<String>,

        /// Print markdown with this title instead of artifact JSON.
        #[arg(long)]
        markdown: Option<String>,
    },

    /// Count well-formed tables in a markdown section.
    Validate {
        file: PathBuf,

        /// Required minimum number of tables.
        #[arg(long, default_value_t = 0)]
        min_tables: usize,

        /// Section name in the report. Defaults to the file name.
        #[arg(long)]
        section: Option<String>,
    },

    /// Normalize markdown text (reads stdin when no file is given).
    Normalize { file: Option<PathBuf> },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Config for commands that work offline: the file if present, defaults
/// otherwise. A file that exists but is invalid is still an error.
fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let progress = ProgressMode::from_flag(cli.progress.as_deref())?;

    match cli.command {
        Commands::Collect {
            plan,
            subject,
            aggregate,
        } => {
            let cfg = config::load_config(&cli.config)?;
            commands::run_collect(&cfg, &plan, subject, aggregate, progress).await?;
        }
        Commands::Report {
            subject,
            plan,
            markdown,
        } => {
            let cfg = config::load_config(&cli.config)?;
            commands::run_report(&cfg, &subject, plan.as_deref(), markdown, progress).await?;
        }
        Commands::Repair {
            draft,
            section,
            markdown,
        } => {
            let cfg = load_or_default(&cli.config)?;
            commands::run_repair(&cfg, &draft, section, markdown)?;
        }
        Commands::Validate {
            file,
            min_tables,
            section,
        } => {
            commands::run_validate(&file, min_tables, section)?;
        }
        Commands::Normalize { file } => {
            let cfg = load_or_default(&cli.config)?;
            commands::run_normalize(&cfg, file.as_deref())?;
        }
    }

    Ok(())
}
