//! `atelier commission add|list|show`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use atelier_core::{Commission, CommissionId, KnowledgeBase};

use super::open_kb;

#[derive(Subcommand, Debug)]
pub enum CommissionCommand {
    /// Publish a commission from a YAML file, replacing any with the same id.
    Add {
        /// Path to a YAML commission (`id` plus `formula`).
        file: PathBuf,
    },

    /// List registered commissions and the catalogs they consume.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print one commission as YAML.
    Show { id: String },
}

#[derive(Tabled)]
struct CommissionRow {
    #[tabled(rename = "commission")]
    id: String,
    #[tabled(rename = "inputs")]
    inputs: String,
    #[tabled(rename = "outputs")]
    outputs: String,
}

#[derive(Serialize)]
struct CommissionJson {
    id: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

pub fn run(home: &Path, command: CommissionCommand) -> Result<()> {
    match command {
        CommissionCommand::Add { file } => add(home, &file),
        CommissionCommand::List { json } => list(home, json),
        CommissionCommand::Show { id } => show(home, &id),
    }
}

fn add(home: &Path, file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let commission: Commission = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse commission in {}", file.display()))?;
    if commission.formula.action.exec.is_empty() {
        anyhow::bail!("commission '{}' has an empty action.exec", commission.id);
    }

    let kb = open_kb(home)?;
    let replaced = kb.commission(&commission.id).is_some();
    let id = commission.id.clone();
    let inputs = commission.input_catalogs().count();
    kb.publish_commission(commission)
        .with_context(|| format!("failed to publish commission '{id}'"))?;

    let verb = if replaced { "Replaced" } else { "Added" };
    println!("{} {verb} commission '{id}' ({inputs} inputs)", "✓".green());
    Ok(())
}

fn list(home: &Path, json: bool) -> Result<()> {
    let kb = open_kb(home)?;
    let commissions: Vec<Commission> = kb
        .list_commissions()
        .iter()
        .filter_map(|id| kb.commission(id))
        .collect();

    if json {
        let payload: Vec<CommissionJson> = commissions
            .iter()
            .map(|c| CommissionJson {
                id: c.id.to_string(),
                inputs: c.input_catalogs().map(|id| id.to_string()).collect(),
                outputs: c.formula.outputs.keys().cloned().collect(),
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&payload)
                .context("failed to serialize commission JSON")?
        );
        return Ok(());
    }

    if commissions.is_empty() {
        println!("No commissions registered.");
        println!("Run: atelier commission add <file.yaml>");
        return Ok(());
    }

    let rows: Vec<CommissionRow> = commissions
        .iter()
        .map(|c| CommissionRow {
            id: c.id.to_string(),
            inputs: join(c.input_catalogs().map(|id| id.to_string())),
            outputs: join(c.formula.outputs.keys().cloned()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn show(home: &Path, id: &str) -> Result<()> {
    let kb = open_kb(home)?;
    let commission = kb
        .commission(&CommissionId::from(id))
        .with_context(|| format!("commission '{id}' not found"))?;
    print!(
        "{}",
        serde_yaml::to_string(&commission).context("failed to serialize commission YAML")?
    );
    Ok(())
}

fn join(items: impl Iterator<Item = String>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "—".to_string()
    } else {
        joined
    }
}
