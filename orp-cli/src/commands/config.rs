//! `orp config`: settings file management.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;

use orp_core::config::{self, Settings};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print effective settings (defaults merged with config.yaml).
    Show,
    /// Write a config.yaml populated with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        ConfigCommand::Show => {
            let settings = config::load_at(&home).context("failed to load settings")?;
            println!("# {}", config::settings_path_at(&home).display());
            print!(
                "{}",
                serde_yaml::to_string(&settings).context("failed to render settings")?
            );
        }
        ConfigCommand::Init { force } => {
            let path = config::settings_path_at(&home);
            if path.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    path.display()
                );
            }
            let path = config::save_at(&home, &Settings::default())
                .context("failed to write settings")?;
            println!("{} wrote {}", "✓".green().bold(), path.display());
        }
    }
    Ok(())
}
