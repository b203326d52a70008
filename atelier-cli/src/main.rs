//! Atelier: reactive build and release orchestration CLI.
//!
//! # Usage
//!
//! ```text
//! atelier [--home <dir>] catalog list [--json]
//! atelier [--home <dir>] catalog show <id> [--json]
//! atelier [--home <dir>] catalog release <id> --type <t> --hash <h> [--track <name>]
//! atelier [--home <dir>] commission add <file.yaml>
//! atelier [--home <dir>] commission list [--json]
//! atelier [--home <dir>] commission show <id>
//! atelier [--home <dir>] run [--once] [--dry-run] [--workspace <dir>] [--json]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{catalog::CatalogCommand, commission::CommissionCommand, run::RunArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "atelier",
    version,
    about = "Rebuild commissions whenever the catalogs they consume release",
    long_about = None,
)]
struct Cli {
    /// Directory holding `.atelier/`. Defaults to the user's home directory.
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect and release into catalogs.
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },

    /// Register and inspect commissions.
    Commission {
        #[command(subcommand)]
        command: CommissionCommand,
    },

    /// Run the foreman until interrupted, or drain once with `--once`.
    Run(RunArgs),
}

fn resolve_home(home: Option<PathBuf>) -> Result<PathBuf> {
    match home {
        Some(home) => Ok(home),
        None => dirs::home_dir().context("could not determine home directory; pass --home"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = resolve_home(cli.home)?;
    match cli.command {
        Commands::Catalog { command } => commands::catalog::run(&home, command),
        Commands::Commission { command } => commands::commission::run(&home, command),
        Commands::Run(args) => args.run(&home),
    }
}
