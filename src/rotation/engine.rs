//! Rotation plan engine
//!
//! Runs one plan through its steps, strictly in order:
//!
//! 1. load the rotation record from the primary store
//! 2. revoke retired values whose grace period is over
//! 3. originate a new value
//! 4. write it to every consumer, in configured order
//! 5. drop the plaintext, revoke abandoned values, then revoke or retire the
//!    previous value
//! 6. persist the new record
//!
//! A failure in steps 3 or 4 aborts the plan before anything is revoked, so
//! consumers always keep a working credential. Cancellation is honoured
//! between consumer writes with the same guarantee. A value originated by a
//! run that then failed to distribute it is recorded as abandoned and revoked
//! after the next successful distribution.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use super::plan::{RevocationPolicy, RotationPlan};
use crate::errors::{Error, Result};
use crate::plan_span;
use crate::secrets::{OriginateRequest, RotationRecord, SecretState, SecretValue, WriteRequest};

/// Whether a plan rotates unconditionally or only inside its warning window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RotationMode {
    #[default]
    Always,
    IfExpiring,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub mode: RotationMode,
    pub now: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            mode: RotationMode::Always,
            now: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }
}

/// What happened to one plan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutcome {
    pub plan: String,
    pub operation_id: String,
    pub dry_run: bool,
    /// A new value was originated and distributed
    pub rotated: bool,
    /// Current state after the run
    pub state: Option<SecretState>,
    /// Previous values revoked during this run
    pub revoked: usize,
    pub revocation_failures: Vec<String>,
    /// Previous values still waiting for revocation
    pub deferred: usize,
}

/// Executes rotation plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct RotationEngine;

impl RotationEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, plan: &RotationPlan, options: &RunOptions) -> Result<PlanOutcome> {
        let operation_id = Uuid::new_v4().to_string();
        let span = plan_span!(plan.name(), operation_id, dry_run = options.dry_run);
        self.run(plan, options, operation_id).instrument(span).await
    }

    async fn run(
        &self,
        plan: &RotationPlan,
        options: &RunOptions,
        operation_id: String,
    ) -> Result<PlanOutcome> {
        let now = options.now;
        let dry_run = options.dry_run;

        let mut record = match plan.primary() {
            Some(primary) => primary
                .read_state()
                .await
                .map_err(|e| Error::step("loading state", primary.name(), e))?
                .unwrap_or_default(),
            None => {
                warn!("Plan has no store able to persist state; previous values cannot be tracked");
                RotationRecord::default()
            }
        };

        let mut outcome = PlanOutcome {
            plan: plan.name().to_string(),
            operation_id: operation_id.clone(),
            dry_run,
            rotated: false,
            state: record.current.clone(),
            revoked: 0,
            revocation_failures: Vec::new(),
            deferred: 0,
        };

        let retired_before = record.retired.len();
        let mut still_retired = Vec::new();
        for retired in std::mem::take(&mut record.retired) {
            if !retired.is_revocable(now) {
                still_retired.push(retired);
                continue;
            }
            match revoke(plan, &retired, dry_run).await {
                Ok(()) => outcome.revoked += 1,
                Err(failures) => {
                    outcome.revocation_failures.extend(failures);
                    still_retired.push(retired);
                }
            }
        }
        record.retired = still_retired;

        let due = match options.mode {
            RotationMode::Always => true,
            RotationMode::IfExpiring => record
                .current
                .as_ref()
                .map_or(true, |state| state.is_expiring(now, plan.warning_window())),
        };

        if !due {
            info!(
                expires = ?record.current.as_ref().and_then(|s| s.expiration_date),
                "Not due for rotation"
            );
            if record.retired.len() != retired_before {
                persist(plan, &record, dry_run).await?;
            }
            outcome.deferred = record.retired.len();
            return Ok(outcome);
        }

        let expiration_date = now.checked_add_signed(plan.rotation_period()).ok_or_else(|| {
            Error::config(format!("Plan '{}': expiration date is out of range", plan.name()))
        })?;
        let revoke_after = match plan.revocation() {
            RevocationPolicy::Immediate => Some(now),
            RevocationPolicy::Deferred { after } => Some(
                chrono::Duration::from_std(after)
                    .ok()
                    .and_then(|after| now.checked_add_signed(after))
                    .ok_or_else(|| {
                        Error::config(format!(
                            "Plan '{}': revocation grace period is out of range",
                            plan.name()
                        ))
                    })?,
            ),
            RevocationPolicy::Never => None,
        };

        if options.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let origin = plan.origin();
        let value = origin
            .originate(OriginateRequest {
                current_state: record.current.as_ref(),
                expiration_date,
                dry_run,
            })
            .await
            .map_err(|e| Error::step("origination", origin.name(), e))?;
        info!(
            store = %origin.name(),
            fingerprint = %value.value().fingerprint(),
            expires = ?value.expiration_date(),
            "Originated new value"
        );

        let distributed =
            distribute(plan, &value, &record, revoke_after, &operation_id, options).await;
        if let Err(e) = distributed {
            if !dry_run {
                record.abandoned.push(SecretState::from_value(&value, operation_id.as_str()));
                match persist(plan, &record, dry_run).await {
                    Ok(()) => info!("Undistributed value recorded for later revocation"),
                    Err(persist_error) => warn!(
                        error = %persist_error,
                        "Could not record the undistributed value; it must be revoked by hand"
                    ),
                }
            }
            return Err(e);
        }

        let new_state = SecretState::from_value(&value, operation_id.as_str());
        drop(value);

        for abandoned in std::mem::take(&mut record.abandoned) {
            match revoke(plan, &abandoned, dry_run).await {
                Ok(()) => outcome.revoked += 1,
                Err(failures) => {
                    outcome.revocation_failures.extend(failures);
                    record.retired.push(abandoned.retired(now));
                }
            }
        }

        if let Some(previous) = record.current.take() {
            match plan.revocation() {
                RevocationPolicy::Immediate => match revoke(plan, &previous, dry_run).await {
                    Ok(()) => outcome.revoked += 1,
                    Err(failures) => {
                        outcome.revocation_failures.extend(failures);
                        record.retired.push(previous.retired(now));
                    }
                },
                RevocationPolicy::Deferred { .. } => {
                    let after = revoke_after.unwrap_or(now);
                    info!(revoke_after = %after, "Previous value retired until grace period ends");
                    record.retired.push(previous.retired(after));
                }
                RevocationPolicy::Never => {
                    debug!("Previous value left to expire");
                }
            }
        }

        record.current = Some(new_state);
        persist(plan, &record, dry_run).await?;

        outcome.rotated = true;
        outcome.state = record.current.clone();
        outcome.deferred = record.retired.len();

        info!(
            revoked = outcome.revoked,
            deferred = outcome.deferred,
            revocation_failures = outcome.revocation_failures.len(),
            "Rotation complete"
        );
        Ok(outcome)
    }
}

/// Write `value` to every consumer in order, stopping at the first failure.
async fn distribute(
    plan: &RotationPlan,
    value: &SecretValue,
    record: &RotationRecord,
    revoke_after: Option<DateTime<Utc>>,
    operation_id: &str,
    options: &RunOptions,
) -> Result<()> {
    for consumer in plan.consumers() {
        if options.cancel.is_cancelled() {
            warn!(store = %consumer.name(), "Cancelled during distribution; previous value left valid");
            return Err(Error::Cancelled);
        }
        consumer
            .write(
                value,
                WriteRequest {
                    current_state: record.current.as_ref(),
                    revoke_after,
                    operation_id,
                    dry_run: options.dry_run,
                },
            )
            .await
            .map_err(|e| Error::step("distribution", consumer.name(), e))?;
        debug!(store = %consumer.name(), "Distributed new value");
    }
    Ok(())
}

/// Run every store's revocation action for `state`.
///
/// Every store is attempted; failures are returned as messages. Backends
/// reporting the value as already gone count as success.
async fn revoke(
    plan: &RotationPlan,
    state: &SecretState,
    dry_run: bool,
) -> std::result::Result<(), Vec<String>> {
    let mut failures = Vec::new();
    let mut attempted = 0;

    for store in plan.stores() {
        let Some(action) = store.revocation_action(state, dry_run) else {
            continue;
        };
        attempted += 1;
        match action().await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(store = %store.name(), "Value already revoked");
            }
            Err(e) => {
                warn!(store = %store.name(), error = %e, "Revocation failed; will retry on next run");
                failures.push(format!("{}: {}", store.name(), e));
            }
        }
    }

    if attempted == 0 {
        debug!(operation_id = ?state.operation_id, "No store can revoke this value");
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures)
    }
}

async fn persist(plan: &RotationPlan, record: &RotationRecord, dry_run: bool) -> Result<()> {
    let Some(primary) = plan.primary() else {
        return Ok(());
    };
    primary
        .save_state(record, dry_run)
        .await
        .map_err(|e| Error::step("persisting state", primary.name(), e))
}
