//! Rotation orchestrator
//!
//! Owns the plans of one configuration and runs `list`, `status` and
//! `rotate` over them. Every selected plan is attempted; failures are
//! collected and raised together once the batch is done.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::config::LoadedPlans;
use super::engine::{PlanOutcome, RotationEngine, RotationMode, RunOptions};
use super::plan::RotationPlan;
use crate::errors::{BatchError, Error, ItemFailure, Result};
use crate::secrets::StoreRegistry;

/// Which plans a rotate run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Named(Vec<String>),
}

impl Selection {
    /// Exactly one of `all` and `secrets` must be given.
    pub fn from_flags(all: bool, secrets: Vec<String>) -> Result<Self> {
        match (all, secrets.is_empty()) {
            (true, true) => Ok(Self::All),
            (false, false) => Ok(Self::Named(secrets)),
            (true, false) => Err(Error::usage("--all and --secrets cannot be combined")),
            (false, true) => Err(Error::usage("either --all or --secrets must be given")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RotateOptions {
    pub selection: Selection,
    /// Only rotate plans inside their warning window
    pub expiring: bool,
    pub dry_run: bool,
    /// No operator is available; plans needing one fail
    pub unattended: bool,
    pub now: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl RotateOptions {
    pub fn new(selection: Selection) -> Self {
        Self {
            selection,
            expiring: false,
            dry_run: false,
            unattended: false,
            now: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }
}

/// One line of `list` output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub name: String,
    pub tags: Vec<String>,
    /// `name (kind)` for every store, origin first
    pub stores: Vec<String>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanHealth {
    Current {
        #[serde(rename = "expirationDate")]
        expiration_date: Option<DateTime<Utc>>,
        expiring: bool,
        #[serde(rename = "operationId")]
        operation_id: Option<String>,
        #[serde(rename = "pendingRevocations")]
        pending_revocations: usize,
    },
    NeverRotated,
    Unknown {
        reason: String,
    },
}

/// One line of `status` output.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStatus {
    pub name: String,
    #[serde(flatten)]
    pub health: PlanHealth,
}

/// Outcomes of a rotate run where every plan succeeded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<PlanOutcome>,
}

impl BatchReport {
    pub fn rotated(&self) -> impl Iterator<Item = &PlanOutcome> {
        self.outcomes.iter().filter(|o| o.rotated)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PlanOutcome> {
        self.outcomes.iter().filter(|o| !o.rotated)
    }
}

/// Everything a rotate run produced: outcomes of the plans that finished and
/// failures of the ones that did not.
#[derive(Debug, Default)]
pub struct RotateRun {
    pub report: BatchReport,
    pub failures: Vec<ItemFailure>,
}

impl RotateRun {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The report when every plan succeeded, otherwise [`Error::Batch`].
    pub fn into_result(self) -> Result<BatchReport> {
        if self.failures.is_empty() {
            Ok(self.report)
        } else {
            let succeeded = self
                .report
                .outcomes
                .iter()
                .map(|o| o.plan.clone())
                .collect();
            Err(BatchError::new("plans", succeeded, self.failures).into())
        }
    }
}

#[derive(Debug)]
enum PlanEntry {
    Valid(RotationPlan),
    Invalid {
        name: String,
        tags: Vec<String>,
        stores: Vec<String>,
        error: String,
    },
}

impl PlanEntry {
    fn name(&self) -> &str {
        match self {
            Self::Valid(plan) => plan.name(),
            Self::Invalid { name, .. } => name,
        }
    }
}

#[derive(Debug)]
pub struct RotationOrchestrator {
    entries: Vec<PlanEntry>,
    engine: RotationEngine,
}

impl RotationOrchestrator {
    /// Build every loaded plan. Plans that fail to build are kept as invalid
    /// entries so they still show up in `list` and fail in `rotate`.
    pub fn new(
        loaded: LoadedPlans,
        registry: &StoreRegistry,
        default_warning_window: Duration,
    ) -> Self {
        let mut entries = Vec::new();

        for document in loaded.documents {
            let entry = match RotationPlan::build(&document, registry, default_warning_window) {
                Ok(plan) => PlanEntry::Valid(plan),
                Err(e) => {
                    warn!(plan = %document.name, error = %e, "Plan is invalid");
                    PlanEntry::Invalid {
                        stores: document
                            .stores
                            .iter()
                            .map(|s| format!("{} ({})", s.name, s.kind))
                            .collect(),
                        name: document.name,
                        tags: document.tags,
                        error: e.to_string(),
                    }
                }
            };
            entries.push(entry);
        }

        for failure in loaded.invalid {
            entries.push(PlanEntry::Invalid {
                name: failure.name,
                tags: Vec::new(),
                stores: Vec::new(),
                error: failure.error.to_string(),
            });
        }

        Self {
            entries,
            engine: RotationEngine::new(),
        }
    }

    pub fn plan_names(&self) -> Vec<&str> {
        self.entries.iter().map(PlanEntry::name).collect()
    }

    pub fn list(&self) -> Vec<PlanSummary> {
        self.entries
            .iter()
            .map(|entry| match entry {
                PlanEntry::Valid(plan) => PlanSummary {
                    name: plan.name().to_string(),
                    tags: plan.tags().to_vec(),
                    stores: plan
                        .stores()
                        .map(|s| format!("{} ({})", s.name(), s.kind()))
                        .collect(),
                    valid: true,
                    error: None,
                },
                PlanEntry::Invalid {
                    name,
                    tags,
                    stores,
                    error,
                } => PlanSummary {
                    name: name.clone(),
                    tags: tags.clone(),
                    stores: stores.clone(),
                    valid: false,
                    error: Some(error.clone()),
                },
            })
            .collect()
    }

    /// Read every plan's state. Never fails: problems become
    /// [`PlanHealth::Unknown`].
    pub async fn status(&self, now: DateTime<Utc>) -> Vec<PlanStatus> {
        let mut statuses = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let health = match entry {
                PlanEntry::Invalid { error, .. } => PlanHealth::Unknown {
                    reason: error.clone(),
                },
                PlanEntry::Valid(plan) => plan_health(plan, now).await,
            };
            statuses.push(PlanStatus {
                name: entry.name().to_string(),
                health,
            });
        }

        statuses
    }

    /// Rotate the selected plans.
    ///
    /// Selection problems are usage errors raised before any backend call.
    /// Otherwise every selected plan is attempted and the failures are
    /// returned together as [`Error::Batch`].
    pub async fn rotate(&self, options: &RotateOptions) -> Result<BatchReport> {
        self.run(options).await?.into_result()
    }

    /// Like [`rotate`](Self::rotate), but plan failures are returned next to
    /// the outcomes of the plans that succeeded. Only selection problems fail
    /// the call.
    pub async fn run(&self, options: &RotateOptions) -> Result<RotateRun> {
        let selected = self.select(&options.selection)?;
        info!(
            plans = selected.len(),
            dry_run = options.dry_run,
            expiring = options.expiring,
            "Starting rotation run"
        );

        let run_options = RunOptions {
            dry_run: options.dry_run,
            mode: if options.expiring {
                RotationMode::IfExpiring
            } else {
                RotationMode::Always
            },
            now: options.now,
            cancel: options.cancel.clone(),
        };

        let mut report = BatchReport::default();
        let mut failures = Vec::new();

        for entry in selected {
            let name = entry.name().to_string();

            if options.cancel.is_cancelled() {
                failures.push(ItemFailure::new(name, Error::Cancelled));
                continue;
            }

            let result = match entry {
                PlanEntry::Invalid { error, .. } => Err(Error::config(error.clone())),
                PlanEntry::Valid(plan) if options.unattended && plan.needs_operator() => {
                    Err(Error::config(format!(
                        "Plan '{}' needs an operator and cannot run unattended",
                        plan.name()
                    )))
                }
                PlanEntry::Valid(plan) => self.engine.execute(plan, &run_options).await,
            };

            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    error!(plan = %name, error = %e, "Plan failed");
                    failures.push(ItemFailure::new(name, e));
                }
            }
        }

        let rotated = report.rotated().count();
        info!(
            rotated,
            skipped = report.outcomes.len() - rotated,
            failed = failures.len(),
            "Rotation run finished"
        );

        Ok(RotateRun { report, failures })
    }

    fn select(&self, selection: &Selection) -> Result<Vec<&PlanEntry>> {
        match selection {
            Selection::All => Ok(self.entries.iter().collect()),
            Selection::Named(names) => {
                let unknown: Vec<&str> = names
                    .iter()
                    .map(String::as_str)
                    .filter(|name| !self.entries.iter().any(|e| e.name() == *name))
                    .collect();
                if !unknown.is_empty() {
                    return Err(Error::usage(format!(
                        "unknown secrets: {}",
                        unknown.join(", ")
                    )));
                }

                Ok(self
                    .entries
                    .iter()
                    .filter(|e| names.iter().any(|n| n == e.name()))
                    .collect())
            }
        }
    }
}

async fn plan_health(plan: &RotationPlan, now: DateTime<Utc>) -> PlanHealth {
    let Some(primary) = plan.primary() else {
        return PlanHealth::Unknown {
            reason: "no store persists state for this plan".to_string(),
        };
    };

    match primary.read_state().await {
        Ok(Some(record)) => {
            let pending_revocations = record.pending_revocations();
            match record.current {
                Some(state) => PlanHealth::Current {
                    expiring: state.is_expiring(now, plan.warning_window()),
                    expiration_date: state.expiration_date,
                    operation_id: state.operation_id,
                    pending_revocations,
                },
                None => PlanHealth::NeverRotated,
            }
        }
        Ok(None) => PlanHealth::NeverRotated,
        Err(e) => {
            warn!(plan = %plan.name(), error = %e, "Could not read plan state");
            PlanHealth::Unknown {
                reason: e.to_string(),
            }
        }
    }
}
