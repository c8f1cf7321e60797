//! Secret store trait and capability model
//!
//! A store adapts one backing technology. Stores declare what they can do
//! through [`Capabilities`] so a plan's store graph can be validated before
//! any I/O happens; operations outside a store's capabilities return
//! [`Error::Unsupported`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::value::{RotationRecord, SecretState, SecretValue};
use crate::errors::{Error, Result};

/// Kind of secret store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Random string generator
    Generator,
    /// Credentials issued by an identity directory
    DirectoryCredential,
    /// Key vault secret
    Vault,
    /// CI/build pipeline variable
    CiVariable,
    /// Source repository secret
    RepositorySecret,
    /// Operator performs the step by hand
    ManualAction,
}

impl StoreKind {
    pub const ALL: [StoreKind; 6] = [
        Self::Generator,
        Self::DirectoryCredential,
        Self::Vault,
        Self::CiVariable,
        Self::RepositorySecret,
        Self::ManualAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generator => "generator",
            Self::DirectoryCredential => "directory_credential",
            Self::Vault => "vault",
            Self::CiVariable => "ci_variable",
            Self::RepositorySecret => "repository_secret",
            Self::ManualAction => "manual_action",
        }
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown secret store type: {}", s))
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a store is able to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub can_originate: bool,
    pub can_write: bool,
    pub can_revoke: bool,
    /// Can hold the plan's [`RotationRecord`]
    pub can_persist_state: bool,
    /// Requires a human operator to complete its steps
    pub needs_operator: bool,
}

impl Capabilities {
    pub const fn none() -> Self {
        Self {
            can_originate: false,
            can_write: false,
            can_revoke: false,
            can_persist_state: false,
            needs_operator: false,
        }
    }

    pub const fn originate(mut self) -> Self {
        self.can_originate = true;
        self
    }

    pub const fn write(mut self) -> Self {
        self.can_write = true;
        self
    }

    pub const fn revoke(mut self) -> Self {
        self.can_revoke = true;
        self
    }

    pub const fn persist_state(mut self) -> Self {
        self.can_persist_state = true;
        self
    }

    pub const fn operator(mut self) -> Self {
        self.needs_operator = true;
        self
    }
}

/// Input to [`SecretStore::originate`].
#[derive(Debug, Clone, Copy)]
pub struct OriginateRequest<'a> {
    pub current_state: Option<&'a SecretState>,
    pub expiration_date: DateTime<Utc>,
    pub dry_run: bool,
}

/// Input to [`SecretStore::write`].
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub current_state: Option<&'a SecretState>,
    /// When the value being replaced may be revoked, if ever
    pub revoke_after: Option<DateTime<Utc>>,
    pub operation_id: &'a str,
    pub dry_run: bool,
}

/// Deferred invalidation of a previous credential.
///
/// Executing it against a backend that reports the credential as already
/// gone must succeed.
pub type RevocationAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Adapter over one backing technology that can originate, distribute
/// and/or revoke credential material.
///
/// Implementations MUST NOT log or persist `SecretValue::value`.
#[async_trait]
pub trait SecretStore: Send + Sync + fmt::Debug {
    /// Name of this store within its plan
    fn name(&self) -> &str;

    fn kind(&self) -> StoreKind;

    fn capabilities(&self) -> Capabilities;

    /// Produce a brand-new credential value.
    ///
    /// In dry-run mode no external mutation happens and a placeholder value
    /// is returned so downstream steps can be previewed.
    async fn originate(&self, _request: OriginateRequest<'_>) -> Result<SecretValue> {
        Err(Error::unsupported(self.name(), "origination"))
    }

    /// Deliver `value` to wherever it is consumed. Must be idempotent.
    async fn write(&self, _value: &SecretValue, _request: WriteRequest<'_>) -> Result<()> {
        Err(Error::unsupported(self.name(), "writing"))
    }

    /// Build the action that invalidates the credential identified by
    /// `state`, or `None` when this store cannot revoke it.
    fn revocation_action(&self, _state: &SecretState, _dry_run: bool) -> Option<RevocationAction> {
        None
    }

    /// Read the plan's durable record, `None` on first run.
    async fn read_state(&self) -> Result<Option<RotationRecord>> {
        Err(Error::unsupported(self.name(), "state persistence"))
    }

    async fn save_state(&self, _record: &RotationRecord, _dry_run: bool) -> Result<()> {
        Err(Error::unsupported(self.name(), "state persistence"))
    }
}
