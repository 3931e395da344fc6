//! `orp scan`: offline Page Integrator pass over an HTML file.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use orp_core::config;
use orp_page::{Document, PageIntegrator};

use super::home_dir;

/// Arguments for `orp scan`.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// HTML file to enhance.
    pub input: PathBuf,

    /// Write the enhanced page here instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl ScanArgs {
    pub fn run(self) -> Result<()> {
        let settings = config::load_at(&home_dir()?).context("failed to load settings")?;
        let html = fs::read_to_string(&self.input)
            .with_context(|| format!("failed to read {}", self.input.display()))?;

        let (page, report) = PageIntegrator::attach(Document::parse(&html), &settings.page);
        let rendered = page.into_document().to_html();

        let Some(output) = self.output else {
            print!("{rendered}");
            return Ok(());
        };
        fs::write(&output, rendered)
            .with_context(|| format!("failed to write {}", output.display()))?;
        println!(
            "{} {} -> {}",
            "✓".green().bold(),
            self.input.display(),
            output.display()
        );
        println!(
            "  {} anchors enhanced, {} titles added, {} bare addresses linked",
            report.anchors_enhanced, report.titles_added, report.links_created
        );
        Ok(())
    }
}
