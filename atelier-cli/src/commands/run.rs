//! `atelier run`: foreground foreman.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use atelier_foreman::{drain_blocking, start_blocking, DrainSummary, ForemanConfig};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Plan and execute until nothing is ready, then exit.
    #[arg(long)]
    pub once: bool,

    /// Report deterministic hashes instead of executing actions.
    #[arg(long)]
    pub dry_run: bool,

    /// Root for per-job directories. Defaults to `<home>/.atelier/workspace`.
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Emit the `--once` summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let mut config = ForemanConfig::at(home).with_dry_run(self.dry_run);
        if let Some(workspace) = self.workspace {
            config = config.with_workspace(workspace);
        }

        if !self.once {
            return start_blocking(config).context("foreman exited with error");
        }

        let summary = drain_blocking(config).context("foreman drain failed")?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .context("failed to serialize drain summary")?
            );
        } else {
            print_summary(&summary);
        }
        Ok(())
    }
}

fn print_summary(summary: &DrainSummary) {
    let failed = if summary.failed > 0 {
        summary.failed.to_string().red().to_string()
    } else {
        summary.failed.to_string()
    };
    println!(
        "{} notices | {} executed | {} failed | {} released",
        summary.notices,
        summary.executed,
        failed,
        summary.released.len()
    );
    for catalog in &summary.released {
        println!("  {} {}", "✓".green(), catalog);
    }
    for catalog in &summary.unpublished {
        println!("  {} {} (not published)", "✗".red(), catalog);
    }
}
