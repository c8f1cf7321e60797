//! `list`, `status` and `rotate` commands

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::output::{print_output, print_table_header, truncate, OutputFormat};
use crate::clients::{ConsolePrompt, OperatorPrompt, UnattendedPrompt};
use crate::config::RuntimeConfig;
use crate::rotation::{
    load_plans, BatchReport, PlanHealth, PlanStatus, PlanSummary, RotateOptions, RotateRun,
    RotationOrchestrator, Selection,
};
use crate::secrets::{Collaborators, StoreRegistry};

/// Flags of the `rotate` command
#[derive(Debug, Clone)]
pub struct RotateArgs {
    pub all: bool,
    pub secrets: Vec<String>,
    pub expiring: bool,
    pub dry_run: bool,
    pub unattended: bool,
}

/// Collaborators available to this process. Vault is wired when its
/// environment is set; other backends are not compiled into the binary.
fn collaborators(
    runtime: &RuntimeConfig,
    operator: Arc<dyn OperatorPrompt>,
) -> Result<Collaborators> {
    #[allow(unused_mut)]
    let mut collaborators =
        Collaborators::default().with_operator(operator).with_limiter(runtime.limiter());

    #[cfg(feature = "vault")]
    {
        if let Some(client) = crate::clients::vault::VaultKvClient::from_env()
            .context("Failed to configure Vault")?
        {
            collaborators = collaborators.with_vault(Arc::new(client));
        }
    }

    Ok(collaborators)
}

fn orchestrator(
    config: &Path,
    runtime: &RuntimeConfig,
    operator: Arc<dyn OperatorPrompt>,
) -> Result<RotationOrchestrator> {
    let loaded = load_plans(config)
        .with_context(|| format!("Failed to load plans from {}", config.display()))?;
    let registry = StoreRegistry::with_collaborators(&collaborators(runtime, operator)?);
    info!(
        plans = loaded.documents.len(),
        invalid = loaded.invalid.len(),
        kinds = ?registry.registered_kinds(),
        "Loaded rotation plans"
    );
    Ok(RotationOrchestrator::new(loaded, &registry, runtime.warning_window))
}

/// A run is unattended when asked to be or when nobody can answer the prompt.
fn runs_unattended(requested: bool, operator: &dyn OperatorPrompt) -> bool {
    requested || !operator.is_interactive()
}

pub fn handle_list(config: &Path, output: &str, runtime: &RuntimeConfig) -> Result<()> {
    let format: OutputFormat = output.parse()?;
    let summaries = orchestrator(config, runtime, Arc::new(UnattendedPrompt))?.list();
    print_output(summaries.as_slice(), format, print_summaries_table)
}

pub async fn handle_status(config: &Path, output: &str, runtime: &RuntimeConfig) -> Result<()> {
    let format: OutputFormat = output.parse()?;
    let statuses =
        orchestrator(config, runtime, Arc::new(UnattendedPrompt))?.status(Utc::now()).await;
    print_output(statuses.as_slice(), format, print_statuses_table)
}

pub async fn handle_rotate(
    args: RotateArgs,
    config: &Path,
    output: &str,
    runtime: &RuntimeConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let format: OutputFormat = output.parse()?;
    let selection = Selection::from_flags(args.all, args.secrets)?;

    let console: Arc<dyn OperatorPrompt> = Arc::new(ConsolePrompt);
    let unattended = runs_unattended(args.unattended, console.as_ref());
    if unattended && !args.unattended {
        info!("stdin is not a terminal, running unattended");
    }
    let operator: Arc<dyn OperatorPrompt> =
        if unattended { Arc::new(UnattendedPrompt) } else { console };
    let orchestrator = orchestrator(config, runtime, operator)?;

    let mut options = RotateOptions::new(selection);
    options.expiring = args.expiring;
    options.dry_run = args.dry_run;
    options.unattended = unattended;
    options.cancel = cancel;

    let run = orchestrator.run(&options).await?;
    if run.is_success() || !run.report.outcomes.is_empty() {
        print_output(&run.report, format, print_report_table)?;
    }
    print_failures(&run);

    run.into_result()?;
    Ok(())
}

fn print_failures(run: &RotateRun) {
    if run.is_success() {
        return;
    }
    let total = run.report.outcomes.len() + run.failures.len();
    eprintln!();
    eprintln!("{} of {} plans failed:", run.failures.len(), total);
    for failure in &run.failures {
        eprintln!("  {}", failure);
    }
}

fn print_summaries_table(summaries: &[PlanSummary]) {
    if summaries.is_empty() {
        println!("No plans found");
        return;
    }

    print_table_header(&[("Name", 30), ("Tags", 20), ("Valid", 6), ("Stores", 50)]);
    for summary in summaries {
        println!(
            "{:<30} {:<20} {:<6} {}",
            truncate(&summary.name, 28),
            truncate(&summary.tags.join(","), 18),
            if summary.valid { "yes" } else { "no" },
            summary.stores.join(", ")
        );
        if let Some(error) = &summary.error {
            println!("  error: {}", error);
        }
    }
    println!();
}

fn print_statuses_table(statuses: &[PlanStatus]) {
    if statuses.is_empty() {
        println!("No plans found");
        return;
    }

    print_table_header(&[("Name", 30), ("Status", 14), ("Expires", 26), ("Details", 30)]);
    for status in statuses {
        let (label, expires, details) = match &status.health {
            PlanHealth::Current { expiration_date, expiring, pending_revocations, .. } => (
                if *expiring { "expiring" } else { "current" },
                expiration_date.map(|d| d.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
                if *pending_revocations > 0 {
                    format!("{} pending revocation(s)", pending_revocations)
                } else {
                    String::new()
                },
            ),
            PlanHealth::NeverRotated => ("never rotated", "-".to_string(), String::new()),
            PlanHealth::Unknown { reason } => ("unknown", "-".to_string(), reason.clone()),
        };
        println!(
            "{:<30} {:<14} {:<26} {}",
            truncate(&status.name, 28),
            label,
            expires,
            details
        );
    }
    println!();
}

fn print_report_table(report: &BatchReport) {
    if report.outcomes.is_empty() {
        println!("No plans selected");
        return;
    }

    print_table_header(&[("Plan", 30), ("Result", 10), ("Revoked", 8), ("Operation", 36)]);
    for outcome in &report.outcomes {
        let result = match (outcome.rotated, outcome.dry_run) {
            (true, true) => "would rotate",
            (true, false) => "rotated",
            (false, _) => "skipped",
        };
        println!(
            "{:<30} {:<10} {:<8} {}",
            truncate(&outcome.plan, 28),
            result,
            outcome.revoked,
            outcome.operation_id
        );
        for failure in &outcome.revocation_failures {
            println!("  revocation failed: {}", failure);
        }
    }
    println!();
}
