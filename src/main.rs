use anyhow::Result;
use clap::Parser;
use sqctx::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = cli.context();
    init_tracing(ctx.quiet, ctx.no_color);

    match cli.command {
        Commands::Blocks(args) => sqctx::core::blocks_run(args, &ctx),
        Commands::Anchors(args) => sqctx::core::anchors_run(args, &ctx),
        Commands::Run(args) => sqctx::core::pipeline_run(args, &ctx),
        Commands::Init(args) => sqctx::infra::config::init(args, &ctx),
        Commands::Completions(args) => sqctx::completion::run(args),
    }
}

/// Logs go to stderr; `RUST_LOG` wins over the defaults.
fn init_tracing(quiet: bool, no_color: bool) {
    let default = if quiet { "sqctx=warn" } else { "sqctx=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .try_init();
}
