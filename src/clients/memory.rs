//! In-memory collaborators
//!
//! Each client keeps its state behind a `tokio::sync::Mutex`, records every
//! call by operation name, and can be told to fail specific operations.
//! They back the integration tests and make dry demonstrations possible
//! without live backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CiVariableClient, DirectoryClient, RepositorySecretClient, VaultClient, VaultSecret};
use crate::domain::{
    Application, FederatedIdentityCredential, IssuedCredential, RepositoryRef,
    RoleBasedAccessControl, ServicePrincipal,
};
use crate::errors::{Error, Result};
use crate::secrets::SecretString;

/// Operation names counted as mutations by [`CallLog::mutations`].
const MUTATING_PREFIXES: [&str; 5] = ["create_", "delete_", "set_", "add_", "remove_"];

/// Ordered record of calls plus failure injection.
#[derive(Debug, Default)]
struct CallLog {
    calls: Vec<String>,
    failing: HashSet<String>,
}

impl CallLog {
    fn record(&mut self, operation: &str) -> Result<()> {
        self.calls.push(operation.to_string());
        if self.failing.contains(operation) {
            return Err(Error::backend(operation, "injected failure"));
        }
        Ok(())
    }

    fn count(&self, operation: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == operation).count()
    }

    fn mutations(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| MUTATING_PREFIXES.iter().any(|prefix| c.starts_with(prefix)))
            .count()
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    log: CallLog,
    applications: Vec<Application>,
    service_principals: Vec<ServicePrincipal>,
    federated_credentials: HashMap<String, Vec<FederatedIdentityCredential>>,
    role_assignments: Vec<(String, RoleBasedAccessControl)>,
    passwords: HashMap<String, Vec<String>>,
    failing_scopes: HashSet<String>,
}

/// Identity directory held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application (and its service principal) directly.
    pub async fn seed_application(&self, display_name: &str) -> Application {
        let mut state = self.state.lock().await;
        let application = new_application(display_name);
        state.service_principals.push(ServicePrincipal {
            object_id: Uuid::new_v4().to_string(),
            app_id: application.app_id.clone(),
        });
        state.applications.push(application.clone());
        application
    }

    pub async fn seed_federated_credential(
        &self,
        application_object_id: &str,
        credential: FederatedIdentityCredential,
    ) {
        let mut state = self.state.lock().await;
        state
            .federated_credentials
            .entry(application_object_id.to_string())
            .or_default()
            .push(credential);
    }

    pub async fn seed_password(&self, application_object_id: &str, key_id: &str) {
        let mut state = self.state.lock().await;
        state
            .passwords
            .entry(application_object_id.to_string())
            .or_default()
            .push(key_id.to_string());
    }

    /// Make every call of `operation` fail.
    pub async fn fail_operation(&self, operation: &str) {
        self.state.lock().await.log.failing.insert(operation.to_string());
    }

    /// Undo [`fail_operation`](Self::fail_operation).
    pub async fn restore_operation(&self, operation: &str) {
        self.state.lock().await.log.failing.remove(operation);
    }

    /// Make role assignments on `scope` fail.
    pub async fn fail_role_assignments_on(&self, scope: &str) {
        self.state.lock().await.failing_scopes.insert(scope.to_string());
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.state.lock().await.log.count(operation)
    }

    pub async fn mutation_count(&self) -> usize {
        self.state.lock().await.log.mutations()
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.log.calls.clone()
    }

    pub async fn application(&self, display_name: &str) -> Option<Application> {
        let state = self.state.lock().await;
        state.applications.iter().find(|a| a.display_name == display_name).cloned()
    }

    pub async fn federated_credentials(
        &self,
        application_object_id: &str,
    ) -> Vec<FederatedIdentityCredential> {
        let state = self.state.lock().await;
        state.federated_credentials.get(application_object_id).cloned().unwrap_or_default()
    }

    pub async fn role_assignments(&self) -> Vec<(String, RoleBasedAccessControl)> {
        self.state.lock().await.role_assignments.clone()
    }

    pub async fn passwords(&self, application_object_id: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state.passwords.get(application_object_id).cloned().unwrap_or_default()
    }
}

fn new_application(display_name: &str) -> Application {
    Application {
        object_id: Uuid::new_v4().to_string(),
        app_id: Uuid::new_v4().to_string(),
        display_name: display_name.to_string(),
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn find_application(&self, display_name: &str) -> Result<Option<Application>> {
        let mut state = self.state.lock().await;
        state.log.record("find_application")?;
        Ok(state.applications.iter().find(|a| a.display_name == display_name).cloned())
    }

    async fn create_application(&self, display_name: &str) -> Result<Application> {
        let mut state = self.state.lock().await;
        state.log.record("create_application")?;
        let application = new_application(display_name);
        state.applications.push(application.clone());
        Ok(application)
    }

    async fn find_service_principal(&self, app_id: &str) -> Result<Option<ServicePrincipal>> {
        let mut state = self.state.lock().await;
        state.log.record("find_service_principal")?;
        Ok(state.service_principals.iter().find(|sp| sp.app_id == app_id).cloned())
    }

    async fn create_service_principal(&self, app_id: &str) -> Result<ServicePrincipal> {
        let mut state = self.state.lock().await;
        state.log.record("create_service_principal")?;
        let principal =
            ServicePrincipal { object_id: Uuid::new_v4().to_string(), app_id: app_id.to_string() };
        state.service_principals.push(principal.clone());
        Ok(principal)
    }

    async fn list_federated_credentials(
        &self,
        application_object_id: &str,
    ) -> Result<Vec<FederatedIdentityCredential>> {
        let mut state = self.state.lock().await;
        state.log.record("list_federated_credentials")?;
        Ok(state.federated_credentials.get(application_object_id).cloned().unwrap_or_default())
    }

    async fn create_federated_credential(
        &self,
        application_object_id: &str,
        credential: &FederatedIdentityCredential,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.log.record("create_federated_credential")?;
        let existing =
            state.federated_credentials.entry(application_object_id.to_string()).or_default();
        if existing.iter().any(|c| c.name == credential.name) {
            return Err(Error::backend(
                "create_federated_credential",
                format!("credential '{}' already exists", credential.name),
            ));
        }
        existing.push(credential.clone());
        Ok(())
    }

    async fn delete_federated_credential(
        &self,
        application_object_id: &str,
        credential_name: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.log.record("delete_federated_credential")?;
        let existing =
            state.federated_credentials.entry(application_object_id.to_string()).or_default();
        let before = existing.len();
        existing.retain(|c| c.name != credential_name);
        if existing.len() == before {
            return Err(Error::not_found("federated credential", credential_name));
        }
        Ok(())
    }

    async fn create_role_assignment(
        &self,
        principal_object_id: &str,
        assignment: &RoleBasedAccessControl,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.log.record("create_role_assignment")?;
        if state.failing_scopes.contains(&assignment.scope) {
            return Err(Error::backend(
                "create_role_assignment",
                format!("forbidden on scope '{}'", assignment.scope),
            ));
        }
        let entry = (principal_object_id.to_string(), assignment.clone());
        if !state.role_assignments.contains(&entry) {
            state.role_assignments.push(entry);
        }
        Ok(())
    }

    async fn add_password(
        &self,
        application_object_id: &str,
        _display_name: &str,
        end_date_time: DateTime<Utc>,
    ) -> Result<IssuedCredential> {
        let mut state = self.state.lock().await;
        state.log.record("add_password")?;
        let key_id = Uuid::new_v4().to_string();
        state
            .passwords
            .entry(application_object_id.to_string())
            .or_default()
            .push(key_id.clone());
        Ok(IssuedCredential {
            key_id,
            secret: SecretString::new(Uuid::new_v4().simple().to_string()),
            end_date_time,
        })
    }

    async fn remove_password(&self, application_object_id: &str, key_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.log.record("remove_password")?;
        let keys = state.passwords.entry(application_object_id.to_string()).or_default();
        let before = keys.len();
        keys.retain(|k| k != key_id);
        if keys.len() == before {
            return Err(Error::not_found("password credential", key_id));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct VaultState {
    log: CallLog,
    secrets: HashMap<String, VaultSecret>,
}

/// Key vault held in memory.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    state: Mutex<VaultState>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_operation(&self, operation: &str) {
        self.state.lock().await.log.failing.insert(operation.to_string());
    }

    /// Undo [`fail_operation`](Self::fail_operation).
    pub async fn restore_operation(&self, operation: &str) {
        self.state.lock().await.log.failing.remove(operation);
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.state.lock().await.log.count(operation)
    }

    pub async fn mutation_count(&self) -> usize {
        self.state.lock().await.log.mutations()
    }

    /// Inspect a stored secret without recording a call.
    pub async fn peek(&self, name: &str) -> Option<VaultSecret> {
        self.state.lock().await.secrets.get(name).cloned()
    }
}

#[async_trait]
impl VaultClient for InMemoryVault {
    async fn get_secret(&self, name: &str) -> Result<Option<VaultSecret>> {
        let mut state = self.state.lock().await;
        state.log.record("get_secret")?;
        Ok(state.secrets.get(name).cloned())
    }

    async fn set_secret(&self, name: &str, secret: &VaultSecret) -> Result<()> {
        let mut state = self.state.lock().await;
        state.log.record("set_secret")?;
        state.secrets.insert(name.to_string(), secret.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct VariableState {
    log: CallLog,
    variables: BTreeMap<(String, String), SecretString>,
}

/// CI variable store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCiVariables {
    state: Mutex<VariableState>,
}

impl InMemoryCiVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_operation(&self, operation: &str) {
        self.state.lock().await.log.failing.insert(operation.to_string());
    }

    /// Undo [`fail_operation`](Self::fail_operation).
    pub async fn restore_operation(&self, operation: &str) {
        self.state.lock().await.log.failing.remove(operation);
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.state.lock().await.log.count(operation)
    }

    pub async fn variable(&self, resource: &str, name: &str) -> Option<SecretString> {
        let state = self.state.lock().await;
        state.variables.get(&(resource.to_string(), name.to_string())).cloned()
    }
}

#[async_trait]
impl CiVariableClient for InMemoryCiVariables {
    async fn set_variable(
        &self,
        resource: &str,
        name: &str,
        value: &SecretString,
        _is_secret: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.log.record("set_variable")?;
        state.variables.insert((resource.to_string(), name.to_string()), value.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RepositoryState {
    log: CallLog,
    secrets: BTreeMap<(RepositoryRef, String), SecretString>,
}

/// Repository secret store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRepositorySecrets {
    state: Mutex<RepositoryState>,
}

impl InMemoryRepositorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_operation(&self, operation: &str) {
        self.state.lock().await.log.failing.insert(operation.to_string());
    }

    /// Undo [`fail_operation`](Self::fail_operation).
    pub async fn restore_operation(&self, operation: &str) {
        self.state.lock().await.log.failing.remove(operation);
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.state.lock().await.log.count(operation)
    }

    pub async fn secret(&self, repository: &str, name: &str) -> Option<SecretString> {
        let repository: RepositoryRef = repository.parse().ok()?;
        let state = self.state.lock().await;
        state.secrets.get(&(repository, name.to_string())).cloned()
    }
}

#[async_trait]
impl RepositorySecretClient for InMemoryRepositorySecrets {
    async fn set_secret(
        &self,
        repository: &RepositoryRef,
        name: &str,
        value: &SecretString,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.log.record("set_secret")?;
        state.secrets.insert((repository.clone(), name.to_string()), value.clone());
        Ok(())
    }
}
