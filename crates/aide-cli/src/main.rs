mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "aide",
    about = "Vault-based workflow engine for a personal AI employee: watchers, planner, approvals",
    version,
    propagate_version = true
)]
struct Cli {
    /// Vault root (default: auto-detect from aide.yaml or Needs_Action/)
    #[arg(long, global = true, env = "AIDE_VAULT")]
    vault: Option<PathBuf>,

    /// Record what would be executed without running any executor
    #[arg(long, global = true, env = "AIDE_DRY_RUN")]
    dry_run: bool,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vault folders and a default aide.yaml
    Init,

    /// Run one channel watcher until stopped
    Watch {
        /// filesystem, mailbox, messaging or network
        kind: String,
        /// Seconds between polls (overrides watchers.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
        /// Watcher identity (default: the kind)
        #[arg(long)]
        id: Option<String>,
    },

    /// Turn action items into plans
    Process {
        /// Seconds between polls (overrides processor.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
        /// cli, api, auto or simulate (overrides processor.method)
        #[arg(long)]
        method: Option<String>,
        /// Poll once and exit
        #[arg(long)]
        once: bool,
    },

    /// Execute approved plans and expire stale ones
    Orchestrate {
        /// Seconds between polls (overrides approval.check_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
        /// Approval window in hours (overrides approval.expiration_hours)
        #[arg(long)]
        expiration_hours: Option<u32>,
        /// Poll once and exit
        #[arg(long)]
        once: bool,
    },

    /// Render Dashboard.md
    Dashboard {
        /// Keep refreshing until stopped
        #[arg(long)]
        watch: bool,
        /// Seconds between refreshes with --watch
        #[arg(long, default_value = "30")]
        interval: u64,
    },

    /// Show queue depths and watcher health
    Status,

    /// Release a pending plan for execution
    Approve { plan: String },

    /// Turn down a pending plan
    Reject {
        plan: String,
        #[arg(long, default_value = "rejected by operator")]
        reason: String,
    },

    /// Place a file into Needs_Action as a new action item
    Drop {
        file: PathBuf,
        /// Source channel recorded on the item
        #[arg(long, default_value = "manual")]
        source: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Watch { .. } => tracing::Level::INFO,
        Commands::Process { once: false, .. } | Commands::Orchestrate { once: false, .. } => {
            tracing::Level::INFO
        }
        Commands::Dashboard { watch: true, .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let vault = root::resolve_vault(cli.vault.as_deref());
    let opts = cmd::GlobalOpts {
        dry_run: cli.dry_run,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Init => cmd::init::run(&vault, opts),
        Commands::Watch { kind, interval, id } => {
            cmd::watch::run(&vault, &kind, interval, id.as_deref(), opts)
        }
        Commands::Process {
            interval,
            method,
            once,
        } => cmd::process::run(&vault, interval, method.as_deref(), once, opts),
        Commands::Orchestrate {
            interval,
            expiration_hours,
            once,
        } => cmd::orchestrate::run(&vault, interval, expiration_hours, once, opts),
        Commands::Dashboard { watch, interval } => cmd::dashboard::run(&vault, watch, interval, opts),
        Commands::Status => cmd::status::run(&vault, opts),
        Commands::Approve { plan } => cmd::review::approve(&vault, &plan, opts),
        Commands::Reject { plan, reason } => cmd::review::reject(&vault, &plan, &reason, opts),
        Commands::Drop { file, source } => cmd::drop::run(&vault, &file, &source, opts),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
