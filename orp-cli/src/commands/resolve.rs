//! `orp resolve`: one-off resolution through the running Interceptor.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use orp_core::ScopedUri;
use orp_interceptor::request_resolve;

use super::{home_dir, print_json};

/// Arguments for `orp resolve`.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Address to resolve, e.g. orp://node-1/profile.
    pub uri: String,

    /// Emit the raw bus response as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ResolveArgs {
    pub fn run(self) -> Result<()> {
        let uri = ScopedUri::parse(&self.uri)?;
        let home = home_dir()?;

        let answer = request_resolve(&home, uri.as_str())
            .with_context(|| format!("failed to resolve {uri}"))?;
        if self.json {
            print_json(&answer)?;
        }

        match answer.url() {
            Some(url) => {
                if !self.json {
                    println!("{url}");
                }
                Ok(())
            }
            None => {
                let reason = answer.error.as_deref().unwrap_or("no endpoint answered");
                if !self.json {
                    eprintln!("{} {reason}", "✗".red().bold());
                }
                bail!("could not resolve {uri}")
            }
        }
    }
}
