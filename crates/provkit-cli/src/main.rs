use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use provkit_core::ResolutionMode;
use tracing_subscriber::EnvFilter;

mod dispatch;
mod prompt;
mod render;

use dispatch::run_cli;

const LOG_ENV: &str = "PROVKIT_LOG";

#[derive(Parser, Debug)]
#[command(name = "provkit")]
#[command(
    about = "Resilient toolchain provisioning for Termux-style shells",
    long_about = None
)]
struct Cli {
    /// Config file; defaults to ~/.config/provkit/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, global = true)]
    mode: Option<ModeArg>,
    /// Override max_retries for this run.
    #[arg(long, global = true)]
    retries: Option<u32>,
    #[arg(long, global = true)]
    dry_run: bool,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the configured setup commands, then sync every listed tool.
    Setup {
        #[arg(long)]
        skip_tools: bool,
    },
    /// Correct, resolve and execute one command.
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Print the corrected form of a command without running it.
    Correct {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Show package-index and code-host candidates for a name.
    Search { name: String },
    Tools {
        #[command(subcommand)]
        command: ToolsCommands,
    },
    /// List the snapshots kept for a tool.
    Snapshots { tool: String },
    /// Restore a tool from its newest snapshot.
    Rollback { tool: String },
    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand, Debug)]
enum ToolsCommands {
    Sync,
    List,
    Add { locator: String },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ModeArg {
    Silent,
    Ask,
    Interactive,
}

impl From<ModeArg> for ResolutionMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Silent => ResolutionMode::Silent,
            ModeArg::Ask => ResolutionMode::Ask,
            ModeArg::Interactive => ResolutionMode::Interactive,
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run_cli(cli)
}
