//! Values produced by origination and the durable state derived from them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::SecretString;

/// String labels attached to values and states, e.g. backend identifiers
/// needed later for revocation.
pub type Tags = BTreeMap<String, String>;

/// Tag naming the directory credential (key id) a value was issued as.
pub const TAG_CREDENTIAL_ID: &str = "credentialId";
/// Tag naming the directory application that owns an issued credential.
pub const TAG_APPLICATION_OBJECT_ID: &str = "applicationObjectId";
/// Tag set on placeholder values produced during dry runs.
pub const TAG_DRY_RUN: &str = "dryRun";

/// A freshly originated credential.
///
/// The plaintext lives only here. It is handed to consumer stores and then
/// dropped; the engine keeps a [`SecretState`] built from its fingerprint.
#[derive(Debug, Clone)]
pub struct SecretValue {
    value: SecretString,
    expiration_date: Option<DateTime<Utc>>,
    tags: Tags,
}

impl SecretValue {
    pub fn new(value: impl Into<SecretString>, expiration_date: Option<DateTime<Utc>>) -> Self {
        Self { value: value.into(), expiration_date, tags: Tags::new() }
    }

    /// Placeholder returned by stores in dry-run mode
    pub fn placeholder(store: &str, expiration_date: Option<DateTime<Utc>>) -> Self {
        Self::new(format!("<dry-run value from {}>", store), expiration_date)
            .with_tag(TAG_DRY_RUN, "true")
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn value(&self) -> &SecretString {
        &self.value
    }

    pub fn expiration_date(&self) -> Option<DateTime<Utc>> {
        self.expiration_date
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn is_placeholder(&self) -> bool {
        self.tags.get(TAG_DRY_RUN).is_some_and(|v| v == "true")
    }
}

/// Last known persisted state of a rotation plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretState {
    /// Fingerprint of the value, never the plaintext
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,

    /// Set on retired states: when the value may be revoked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoke_after: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
}

impl SecretState {
    /// State recorded after `value` has been written to every consumer
    pub fn from_value(value: &SecretValue, operation_id: impl Into<String>) -> Self {
        Self {
            value: Some(value.value().fingerprint()),
            operation_id: Some(operation_id.into()),
            expiration_date: value.expiration_date(),
            revoke_after: None,
            tags: value.tags().clone(),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Whether the state has entered its warning window
    pub fn is_expiring(&self, now: DateTime<Utc>, warning_window: Duration) -> bool {
        self.expiration_date.is_some_and(|expires| {
            expires.checked_sub_signed(warning_window).map_or(true, |start| now >= start)
        })
    }

    /// Whether a retired state may now be revoked
    pub fn is_revocable(&self, now: DateTime<Utc>) -> bool {
        self.revoke_after.map_or(true, |after| now >= after)
    }

    pub fn retired(mut self, revoke_after: DateTime<Utc>) -> Self {
        self.revoke_after = Some(revoke_after);
        self
    }
}

/// Durable record kept by a plan's primary store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<SecretState>,

    /// Previous states still awaiting revocation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<SecretState>,

    /// Values originated by runs that failed to distribute them. Revoked once
    /// a later run has distributed its own value everywhere.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abandoned: Vec<SecretState>,
}

impl RotationRecord {
    /// Values that still need revoking
    pub fn pending_revocations(&self) -> usize {
        self.retired.len() + self.abandoned.len()
    }
}
