//! orp: local orp:// resolution layer.
//!
//! # Usage
//!
//! ```text
//! orp interceptor start|stop|status
//! orp resolve <orp://address> [--json]
//! orp cache stats [--json]
//! orp cache clear
//! orp scan <page.html> [--output <file>]
//! orp config show|init [--force]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    cache::CacheCommand, config::ConfigCommand, interceptor::InterceptorCommand,
    resolve::ResolveArgs, scan::ScanArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "orp",
    version,
    about = "Resolve orp:// addresses to local HTTP endpoints",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or control the background Interceptor.
    Interceptor {
        #[command(subcommand)]
        command: InterceptorCommand,
    },

    /// Resolve one orp:// address through the running Interceptor.
    Resolve(ResolveArgs),

    /// Inspect or flush the resolution cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Enhance orp:// links in an HTML file.
    Scan(ScanArgs),

    /// Show or create ~/.orp/config.yaml.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Interceptor { command } => commands::interceptor::run(command),
        Commands::Resolve(args) => args.run(),
        Commands::Cache { command } => commands::cache::run(command),
        Commands::Scan(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
    }
}
