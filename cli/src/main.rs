//! CLI for rocscope
//!
//! Commands:
//! - list: Show the counters and metrics of a catalog
//! - check: Resolve metrics into hardware events without running anything
//! - eval: Run the full evaluation pipeline over recorded samples

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "rocscope")]
#[command(about = "rocscope - GPU hardware counter profiler", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: commands::CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog counters and metrics
    List(commands::list::ListArgs),

    /// Resolve metrics into hardware events and report block usage
    Check(commands::check::CheckArgs),

    /// Evaluate metrics over a recorded sample file
    Eval(commands::eval::EvalArgs),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.common.verbose);

    if let Err(e) = dispatch(cli) {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::List(args) => commands::list::run(&cli.common, args),
        Commands::Check(args) => commands::check::run(&cli.common, args),
        Commands::Eval(args) => commands::eval::run(&cli.common, args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
