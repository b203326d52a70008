//! `atelier catalog list|show|release`

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use atelier_core::{CatalogBook, CatalogId, KnowledgeBase, Sku, TrackName};

use super::open_kb;

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// List every catalog with its latest default-track release.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show every track of one catalog.
    Show {
        id: String,

        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Append a release to a catalog, creating it if needed.
    Release(ReleaseArgs),
}

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Catalog id (e.g. "apollo", "B::x").
    pub id: String,

    /// Packing type of the released artifact.
    #[arg(long = "type", value_name = "TYPE")]
    pub packing: String,

    /// Content hash of the released artifact.
    #[arg(long)]
    pub hash: String,

    /// Track to release on. Only the default track drives rebuilds.
    #[arg(long)]
    pub track: Option<String>,
}

#[derive(Tabled)]
struct CatalogRow {
    #[tabled(rename = "catalog")]
    id: String,
    #[tabled(rename = "latest")]
    latest: String,
    #[tabled(rename = "releases")]
    releases: usize,
    #[tabled(rename = "tracks")]
    tracks: usize,
}

#[derive(Tabled)]
struct ReleaseRow {
    #[tabled(rename = "track")]
    track: String,
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "type")]
    packing: String,
    #[tabled(rename = "hash")]
    hash: String,
}

#[derive(Serialize)]
struct CatalogSummaryJson {
    id: String,
    latest: Option<Sku>,
    releases: usize,
    tracks: Vec<String>,
}

pub fn run(home: &Path, command: CatalogCommand) -> Result<()> {
    match command {
        CatalogCommand::List { json } => list(home, json),
        CatalogCommand::Show { id, json } => show(home, &id, json),
        CatalogCommand::Release(args) => release(home, args),
    }
}

fn list(home: &Path, json: bool) -> Result<()> {
    let kb = open_kb(home)?;
    let books: Vec<CatalogBook> = kb
        .list_catalogs()
        .iter()
        .filter_map(|id| kb.catalog(id))
        .collect();

    if json {
        let payload: Vec<CatalogSummaryJson> = books.iter().map(summary_json).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize catalog JSON")?
        );
        return Ok(());
    }

    if books.is_empty() {
        println!("No catalogs published.");
        println!("Run: atelier catalog release <id> --type <t> --hash <h>");
        return Ok(());
    }

    let rows: Vec<CatalogRow> = books
        .iter()
        .map(|book| CatalogRow {
            id: book.id.to_string(),
            latest: latest_label(book),
            releases: book.all().len(),
            tracks: book.track_names().count(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn show(home: &Path, id: &str, json: bool) -> Result<()> {
    let kb = open_kb(home)?;
    let book = kb
        .catalog(&CatalogId::from(id))
        .with_context(|| format!("catalog '{id}' not found"))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&book).context("failed to serialize catalog JSON")?
        );
        return Ok(());
    }

    println!("{} {}", "Catalog".bold(), book.id);
    let rows: Vec<ReleaseRow> = book
        .track_names()
        .flat_map(|track| {
            book.track(track)
                .iter()
                .enumerate()
                .map(move |(index, sku)| ReleaseRow {
                    track: track.to_string(),
                    index,
                    packing: sku.packing.clone(),
                    hash: sku.hash.clone(),
                })
        })
        .collect();
    if rows.is_empty() {
        println!("No releases.");
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn release(home: &Path, args: ReleaseArgs) -> Result<()> {
    let sku = Sku::new(args.packing, args.hash);
    if sku.is_zero() {
        anyhow::bail!("--hash must not be empty");
    }

    let kb = open_kb(home)?;
    let id = CatalogId::from(args.id);
    let track = TrackName::from(args.track.unwrap_or_default());
    let book = kb
        .catalog(&id)
        .unwrap_or_else(|| CatalogBook::new(id.clone()));
    let next = book.release(track.clone(), sku.clone());
    let count = next.track(&track).len();
    kb.publish_catalog(next)
        .with_context(|| format!("failed to publish catalog '{id}'"))?;

    println!(
        "{} Released {} to '{}' on {} (release #{})",
        "✓".green(),
        sku,
        id,
        track,
        count
    );
    Ok(())
}

fn latest_label(book: &CatalogBook) -> String {
    let latest = book.latest();
    if latest.is_zero() {
        "—".bright_black().to_string()
    } else {
        latest.to_string()
    }
}

fn summary_json(book: &CatalogBook) -> CatalogSummaryJson {
    let latest = book.latest();
    CatalogSummaryJson {
        id: book.id.to_string(),
        latest: (!latest.is_zero()).then_some(latest),
        releases: book.all().len(),
        tracks: book.track_names().map(|t| t.0.clone()).collect(),
    }
}
