use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::infra::config::SearchBackend;

/// Shared application context for global flags
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub quiet: bool,             // global --quiet
    pub no_color: bool,          // global --no-color
    pub dry_run: bool,           // global --dry-run
    pub threads: Option<usize>,  // global --threads
    pub config: Option<PathBuf>, // global --config
}

#[derive(Parser)]
#[command(name = "sqctx")]
#[command(
    about = "Build layered code context (enclosing blocks, anchor function, ranked call sites) for static-analysis issues"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Compute everything but do not write output files
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Worker threads for per-issue processing (default: all cores)
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Read configuration from this file instead of ./sqctx.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            no_color: self.no_color,
            dry_run: self.dry_run,
            threads: self.threads,
            config: self.config.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Attach enclosing indentation blocks to each issue
    Blocks(BlocksArgs),

    /// Locate the enclosing function and rank its call sites
    Anchors(AnchorsArgs),

    /// Blocks then anchors, without an intermediate file
    Run(RunArgs),

    /// Initialize a sqctx.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct BlocksArgs {
    /// Issues file (JSON array or JSON lines)
    #[arg(long)]
    pub issues: PathBuf,

    /// Repository checkout the issue paths are relative to
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Output file ("-" for stdout)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Only process the first N issues
    #[arg(long)]
    pub max_issues: Option<usize>,
}

#[derive(Debug, Parser)]
pub struct AnchorsArgs {
    /// Issues with blocks, as written by `sqctx blocks`
    #[arg(long)]
    pub input: PathBuf,

    /// Repository checkout the issue paths are relative to
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Output file ("-" for stdout)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub scan: ScanArgs,
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Issues file (JSON array or JSON lines)
    #[arg(long)]
    pub issues: PathBuf,

    /// Repository checkout the issue paths are relative to
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Output file ("-" for stdout)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub scan: ScanArgs,
}

/// Anchor-stage overrides; unset flags fall back to the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct ScanArgs {
    /// Only process the first N issues
    #[arg(long)]
    pub max_issues: Option<usize>,

    /// Keep at most N call sites per anchor (0 = unlimited)
    #[arg(long)]
    pub max_call_sites: Option<usize>,

    /// Lines scanned upward from the issue for a function header
    #[arg(long)]
    pub search_window: Option<usize>,

    /// Context lines around the issue and each call site
    #[arg(long)]
    pub context_window: Option<usize>,

    /// Repository search implementation
    #[arg(long, value_enum)]
    pub backend: Option<SearchBackend>,

    /// Keep call sites found in header files
    #[arg(long)]
    pub include_headers: bool,

    /// Path to the ripgrep binary
    #[arg(long)]
    pub rg_path: Option<String>,

    /// Per-search timeout in seconds (0 = none)
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
