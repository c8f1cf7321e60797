//! Rotation plans
//!
//! A [`RotationPlan`] ties one logical secret to the stores that originate,
//! consume and remember it. Plans are rebuilt from configuration on every
//! invocation; nothing about them is cached between runs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::config::PlanDocument;
use crate::errors::{Error, Result};
use crate::secrets::{SecretStore, StoreRegistry};

/// When the previous value is invalidated after a successful rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RevocationPolicy {
    /// Revoke as soon as every consumer holds the new value
    #[default]
    Immediate,
    /// Keep the previous value valid for a grace period
    Deferred {
        #[serde(with = "humantime_serde")]
        after: Duration,
    },
    /// Leave the previous value to expire on its own
    Never,
}

impl std::fmt::Display for RevocationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Deferred { after } => write!(f, "deferred ({})", humantime::format_duration(*after)),
            Self::Never => write!(f, "never"),
        }
    }
}

/// One logical secret and the stores it flows through.
#[derive(Debug, Clone)]
pub struct RotationPlan {
    name: String,
    tags: Vec<String>,
    origin: Arc<dyn SecretStore>,
    consumers: Vec<Arc<dyn SecretStore>>,
    primary: Option<Arc<dyn SecretStore>>,
    revocation: RevocationPolicy,
    rotation_period: chrono::Duration,
    warning_window: chrono::Duration,
}

/// Longest rotation period or revocation grace period a plan may set.
pub const MAX_PERIOD: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

fn to_chrono(duration: Duration, field: &str, plan: &str) -> Result<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|_| Error::config(format!("Plan '{}': {} is out of range", plan, field)))
}

impl RotationPlan {
    /// Build the plan's stores through `registry` and validate the result.
    ///
    /// The primary store is the one flagged `primary`; when none is flagged,
    /// the first store able to persist state is used.
    pub fn build(
        document: &PlanDocument,
        registry: &StoreRegistry,
        default_warning_window: Duration,
    ) -> Result<Self> {
        let name = document.name.clone();

        let mut seen = HashSet::new();
        for definition in &document.stores {
            if !seen.insert(definition.name.as_str()) {
                return Err(Error::config(format!(
                    "Plan '{}': store name '{}' is used more than once",
                    name, definition.name
                )));
            }
        }

        let origins: Vec<_> = document.stores.iter().filter(|d| d.origin).collect();
        let origin_definition = match origins.as_slice() {
            [single] => *single,
            [] => {
                return Err(Error::config(format!("Plan '{}' has no origin store", name)));
            }
            _ => {
                return Err(Error::config(format!(
                    "Plan '{}' has {} origin stores, expected exactly one",
                    name,
                    origins.len()
                )));
            }
        };

        if document.stores.iter().filter(|d| d.primary).count() > 1 {
            return Err(Error::config(format!("Plan '{}' has more than one primary store", name)));
        }

        let origin = registry.build(origin_definition)?;
        let mut consumers = Vec::new();
        let mut primary = origin_definition.primary.then(|| origin.clone());

        for definition in document.stores.iter().filter(|d| !d.origin) {
            let store = registry.build(definition)?;
            if definition.primary {
                primary = Some(store.clone());
            }
            consumers.push(store);
        }

        if primary.is_none() {
            primary = std::iter::once(&origin)
                .chain(consumers.iter())
                .find(|store| store.capabilities().can_persist_state)
                .cloned();
        }

        let plan = Self {
            rotation_period: to_chrono(document.rotation_period, "rotationPeriod", &name)?,
            warning_window: to_chrono(
                document.warning_window.unwrap_or(default_warning_window),
                "warningWindow",
                &name,
            )?,
            name,
            tags: document.tags.clone(),
            origin,
            consumers,
            primary,
            revocation: document.revocation,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Check the store graph against the stores' capabilities.
    pub fn validate(&self) -> Result<()> {
        if !self.origin.capabilities().can_originate {
            return Err(Error::config(format!(
                "Plan '{}': origin store '{}' ({}) cannot originate values",
                self.name,
                self.origin.name(),
                self.origin.kind()
            )));
        }

        if self.consumers.is_empty() {
            return Err(Error::config(format!("Plan '{}' has no consumer stores", self.name)));
        }

        if let Some(store) = self.consumers.iter().find(|s| !s.capabilities().can_write) {
            return Err(Error::config(format!(
                "Plan '{}': consumer store '{}' ({}) cannot write values",
                self.name,
                store.name(),
                store.kind()
            )));
        }

        if let Some(primary) = &self.primary {
            if !primary.capabilities().can_persist_state {
                return Err(Error::config(format!(
                    "Plan '{}': primary store '{}' ({}) cannot persist state",
                    self.name,
                    primary.name(),
                    primary.kind()
                )));
            }
        }

        if self.rotation_period <= chrono::Duration::zero() {
            return Err(Error::config(format!("Plan '{}': rotationPeriod must be positive", self.name)));
        }

        if self.rotation_period.to_std().map_or(true, |period| period > MAX_PERIOD) {
            return Err(Error::config(format!(
                "Plan '{}': rotationPeriod must not exceed {}",
                self.name,
                humantime::format_duration(MAX_PERIOD)
            )));
        }

        if let RevocationPolicy::Deferred { after } = self.revocation {
            if after > MAX_PERIOD {
                return Err(Error::config(format!(
                    "Plan '{}': revocation grace period must not exceed {}",
                    self.name,
                    humantime::format_duration(MAX_PERIOD)
                )));
            }
        }

        if self.warning_window >= self.rotation_period {
            return Err(Error::config(format!(
                "Plan '{}': warningWindow must be shorter than rotationPeriod",
                self.name
            )));
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn origin(&self) -> &Arc<dyn SecretStore> {
        &self.origin
    }

    /// Consumer stores in configured order
    pub fn consumers(&self) -> &[Arc<dyn SecretStore>] {
        &self.consumers
    }

    pub fn primary(&self) -> Option<&Arc<dyn SecretStore>> {
        self.primary.as_ref()
    }

    /// Origin followed by consumers
    pub fn stores(&self) -> impl Iterator<Item = &Arc<dyn SecretStore>> {
        std::iter::once(&self.origin).chain(self.consumers.iter())
    }

    pub fn revocation(&self) -> RevocationPolicy {
        self.revocation
    }

    pub fn rotation_period(&self) -> chrono::Duration {
        self.rotation_period
    }

    pub fn warning_window(&self) -> chrono::Duration {
        self.warning_window
    }

    /// Whether any store needs a human to complete its step
    pub fn needs_operator(&self) -> bool {
        self.stores().any(|store| store.capabilities().needs_operator)
    }
}
