//! `orp cache`: resolution cache inspection.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use orp_core::{CacheEntryReport, CacheStatsResponse};
use orp_interceptor::{request_cache_stats, request_clear_cache};

use super::{home_dir, print_json};

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List cached resolutions.
    Stats {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Drop every cached resolution.
    Clear,
}

#[derive(Tabled)]
struct CacheTableRow {
    #[tabled(rename = "address")]
    url: String,
    #[tabled(rename = "resolved to")]
    resolved_url: String,
    #[tabled(rename = "cached at")]
    cached_at: String,
    #[tabled(rename = "age")]
    age: String,
}

impl From<CacheEntryReport> for CacheTableRow {
    fn from(entry: CacheEntryReport) -> Self {
        let cached_at = i64::try_from(entry.timestamp)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            url: entry.url,
            resolved_url: entry.resolved_url,
            cached_at,
            age: format_age(entry.age),
        }
    }
}

pub fn run(command: CacheCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        CacheCommand::Stats { json } => {
            let stats = request_cache_stats(&home).context("failed to read cache stats")?;
            if json {
                print_json(&stats)?;
            } else {
                print_table(stats);
            }
        }
        CacheCommand::Clear => {
            request_clear_cache(&home).context("failed to clear cache")?;
            println!("{} resolution cache cleared", "✓".green().bold());
        }
    }
    Ok(())
}

fn print_table(stats: CacheStatsResponse) {
    println!("{} cached resolutions", stats.cache_size);
    if stats.entries.is_empty() {
        return;
    }
    let rows: Vec<CacheTableRow> = stats.entries.into_iter().map(CacheTableRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

/// Milliseconds rendered as `42s` or `3m 05s`.
fn format_age(millis: u64) -> String {
    let secs = millis / 1000;
    if secs < 60 {
        format!("{secs}s")
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ages_render_in_minutes_past_one_minute() {
        assert_eq!(format_age(999), "0s");
        assert_eq!(format_age(42_000), "42s");
        assert_eq!(format_age(185_000), "3m 05s");
    }

    #[test]
    fn table_row_formats_epoch_millis() {
        let row = CacheTableRow::from(CacheEntryReport {
            url: "orp://node-1/".to_string(),
            resolved_url: "http://localhost:9001/".to_string(),
            timestamp: 0,
            age: 1_000,
        });
        assert_eq!(row.cached_at, "1970-01-01T00:00:00+00:00");
        assert_eq!(row.age, "1s");
    }
}
