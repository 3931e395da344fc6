//! `orp interceptor`: Interceptor lifecycle over the control socket.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use orp_core::config;
use orp_interceptor::paths::socket_path;
use orp_interceptor::{first_run, request_shutdown, request_stats, start_blocking, InterceptorError};

use super::{home_dir, print_json};

#[derive(Subcommand, Debug)]
pub enum InterceptorCommand {
    /// Run the Interceptor in the foreground (gateway + bus + cache sweep).
    Start,
    /// Ask a running Interceptor to shut down.
    Stop,
    /// Show resolver counters from a running Interceptor.
    Status {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Tabled)]
struct CounterRow {
    #[tabled(rename = "counter")]
    name: &'static str,
    #[tabled(rename = "value")]
    value: u64,
}

pub fn run(command: InterceptorCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        InterceptorCommand::Start => {
            if first_run::is_pending(&home) {
                let settings = config::load_at(&home).context("failed to load settings")?;
                println!(
                    "{} orp:// support installed. Welcome page: http://{}/welcome.html",
                    "✓".green().bold(),
                    settings.gateway.listen
                );
            }
            start_blocking(&home).context("interceptor exited with error")?;
        }
        InterceptorCommand::Stop => match request_shutdown(&home) {
            Ok(_) => println!("interceptor stop requested"),
            Err(InterceptorError::NotRunning { .. }) => println!("interceptor is not running"),
            Err(err) => return Err(err).context("failed to stop interceptor"),
        },
        InterceptorCommand::Status { json } => match request_stats(&home) {
            Ok(stats) if json => print_json(&stats)?,
            Ok(stats) => {
                println!(
                    "orp interceptor v{} | up {}s | {} cached",
                    env!("CARGO_PKG_VERSION"),
                    stats.uptime_secs,
                    stats.cache_size
                );
                let rows = vec![
                    CounterRow { name: "requests", value: stats.requests },
                    CounterRow { name: "cache hits", value: stats.cache_hits },
                    CounterRow { name: "daemon hits", value: stats.daemon_hits },
                    CounterRow { name: "fallback hits", value: stats.fallback_hits },
                    CounterRow { name: "shared hits", value: stats.shared_hits },
                    CounterRow { name: "failures", value: stats.failures },
                ];
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
            }
            Err(InterceptorError::NotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                if json {
                    print_json(&payload)?;
                } else {
                    println!("interceptor is not running");
                }
            }
            Err(err) => return Err(err).context("failed to query interceptor status"),
        },
    }

    Ok(())
}
