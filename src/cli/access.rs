//! `access` commands

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use std::path::PathBuf;

use super::output::{print_output, print_table_header, truncate, OutputFormat};
use crate::access::{template, AccessConfigDocument, ConfigStore, FileConfigStore};

#[derive(Subcommand)]
pub enum AccessCommands {
    /// Render access documents and report unresolved tokens
    #[command(
        long_about = "Load access documents, render their {{token}} placeholders and report any token without a value.\n\nNo backend is contacted. Tokens filled in during reconciliation, such as applicationId, are listed separately and do not fail the check.",
        after_help = "EXAMPLES:\n    # Check every document in a directory\n    keyward access check --config access/\n\n    # Check two files with JSON output\n    keyward access check --config a.json --config b.json --output json"
    )]
    Check {
        /// Access document file or directory of *.json files
        #[arg(short, long, value_name = "PATH", required = true, num_args = 1..)]
        config: Vec<PathBuf>,

        /// Output format (json, yaml, or table)
        #[arg(short, long, default_value = "table", value_parser = ["json", "yaml", "table"])]
        output: String,
    },
}

/// Result of checking one document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCheck {
    pub source: String,
    pub display_name: String,
    pub unresolved: Vec<String>,
    pub deferred: Vec<String>,
}

impl DocumentCheck {
    fn from_document(document: &AccessConfigDocument) -> Self {
        let (deferred, unresolved): (Vec<String>, Vec<String>) =
            document.unresolved().iter().cloned().partition(|t| template::is_deferred(t));
        Self {
            source: document.source().to_string(),
            display_name: document.display_name().to_string(),
            unresolved,
            deferred,
        }
    }

    pub fn passed(&self) -> bool {
        self.unresolved.is_empty()
    }
}

pub async fn handle_access_command(command: AccessCommands) -> Result<()> {
    match command {
        AccessCommands::Check { config, output } => check(config, &output).await,
    }
}

async fn check(paths: Vec<PathBuf>, output: &str) -> Result<()> {
    let format: OutputFormat = output.parse()?;
    let loaded = FileConfigStore::new(paths)
        .load()
        .await
        .context("Failed to load access documents")?;

    let checks: Vec<DocumentCheck> =
        loaded.documents.iter().map(DocumentCheck::from_document).collect();
    print_output(checks.as_slice(), format, print_checks_table)?;

    for failure in &loaded.invalid {
        eprintln!("  {}", failure);
    }

    let failed: Vec<&str> =
        checks.iter().filter(|c| !c.passed()).map(|c| c.display_name.as_str()).collect();
    let total = checks.len() + loaded.invalid.len();
    if !loaded.invalid.is_empty() {
        anyhow::bail!("{} of {} documents could not be loaded", loaded.invalid.len(), total);
    }
    if !failed.is_empty() {
        anyhow::bail!(
            "Unresolved tokens in {} of {} documents: {}",
            failed.len(),
            total,
            failed.join(", ")
        );
    }
    Ok(())
}

fn print_checks_table(checks: &[DocumentCheck]) {
    if checks.is_empty() {
        println!("No access documents found");
        return;
    }

    print_table_header(&[("Identity", 30), ("Result", 8), ("Tokens", 40)]);
    for check in checks {
        let mut tokens = check.unresolved.join(", ");
        if !check.deferred.is_empty() {
            if !tokens.is_empty() {
                tokens.push_str("; ");
            }
            tokens.push_str(&format!("deferred: {}", check.deferred.join(", ")));
        }
        println!(
            "{:<30} {:<8} {}",
            truncate(&check.display_name, 28),
            if check.passed() { "ok" } else { "FAILED" },
            tokens
        );
    }
    println!();
}
