//! # External collaborators
//!
//! Interfaces to the systems the rotation engine and the access reconciler
//! act on. Concrete API clients live outside this crate except for the Vault
//! KV client; [`memory`] provides in-memory implementations that record every
//! call.
//!
//! Every method that mutates a backend is idempotent where the backend
//! allows it, and deletions report an absent resource as
//! [`Error::NotFound`](crate::errors::Error::NotFound) so callers can treat
//! it as already satisfied.

pub mod memory;
pub mod operator;
#[cfg(feature = "vault")]
pub mod vault;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::domain::{
    Application, FederatedIdentityCredential, IssuedCredential, RepositoryRef,
    RoleBasedAccessControl, ServicePrincipal,
};
use crate::errors::Result;
use crate::secrets::SecretString;

pub use operator::{ConsolePrompt, OperatorPrompt, OperatorRequest, UnattendedPrompt};

/// Identity directory: applications, service principals, federated
/// credentials, role assignments and issued password credentials.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn find_application(&self, display_name: &str) -> Result<Option<Application>>;

    async fn create_application(&self, display_name: &str) -> Result<Application>;

    async fn find_service_principal(&self, app_id: &str) -> Result<Option<ServicePrincipal>>;

    async fn create_service_principal(&self, app_id: &str) -> Result<ServicePrincipal>;

    async fn list_federated_credentials(
        &self,
        application_object_id: &str,
    ) -> Result<Vec<FederatedIdentityCredential>>;

    async fn create_federated_credential(
        &self,
        application_object_id: &str,
        credential: &FederatedIdentityCredential,
    ) -> Result<()>;

    async fn delete_federated_credential(
        &self,
        application_object_id: &str,
        credential_name: &str,
    ) -> Result<()>;

    /// Create-if-not-exists; assigning the same role twice is a no-op.
    async fn create_role_assignment(
        &self,
        principal_object_id: &str,
        assignment: &RoleBasedAccessControl,
    ) -> Result<()>;

    async fn add_password(
        &self,
        application_object_id: &str,
        display_name: &str,
        end_date_time: DateTime<Utc>,
    ) -> Result<IssuedCredential>;

    async fn remove_password(&self, application_object_id: &str, key_id: &str) -> Result<()>;
}

/// A secret as stored in a vault, with its metadata.
#[derive(Debug, Clone)]
pub struct VaultSecret {
    pub value: SecretString,
    pub expires_on: Option<DateTime<Utc>>,
    pub tags: BTreeMap<String, String>,
}

/// Key-vault-like store of named secrets with expiration metadata.
#[async_trait]
pub trait VaultClient: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<Option<VaultSecret>>;

    async fn set_secret(&self, name: &str, secret: &VaultSecret) -> Result<()>;
}

/// CI/build system variables.
#[async_trait]
pub trait CiVariableClient: Send + Sync {
    async fn set_variable(
        &self,
        resource: &str,
        name: &str,
        value: &SecretString,
        is_secret: bool,
    ) -> Result<()>;
}

/// Repository-level CI secrets.
#[async_trait]
pub trait RepositorySecretClient: Send + Sync {
    async fn set_secret(
        &self,
        repository: &RepositoryRef,
        name: &str,
        value: &SecretString,
    ) -> Result<()>;
}
