//! Access reconciler
//!
//! Brings the directory and the repository secret stores in line with a set
//! of access documents, one identity at a time. A failing identity does not
//! stop the others, and neither does a document that fails to load; all
//! failures are raised together after the valid documents have been saved.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

use super::document::AccessConfigDocument;
use super::store::ConfigStore;
use crate::clients::{DirectoryClient, RepositorySecretClient};
use crate::domain::{Application, FederatedIdentityCredential, RepositoryRef, ServicePrincipal};
use crate::errors::{BatchError, Error, ItemFailure, Result};
use crate::identity_span;
use crate::rate_limit::{keys, RateLimiter};
use crate::secrets::SecretString;

/// Application id used in dry runs for applications that do not exist yet.
pub const DRY_RUN_APPLICATION_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Read only; log intended mutations and skip saving documents
    pub dry_run: bool,
    pub cancel: CancellationToken,
}

/// Federated credentials split by what reconciliation does with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialDiff {
    pub unchanged: Vec<FederatedIdentityCredential>,
    /// Live entries with no equal desired entry
    pub removed: Vec<FederatedIdentityCredential>,
    /// Desired entries with no equal live entry
    pub created: Vec<FederatedIdentityCredential>,
}

/// Compare live and desired credentials. Desired duplicates count once.
pub fn diff_credentials(
    live: &[FederatedIdentityCredential],
    desired: &[FederatedIdentityCredential],
) -> CredentialDiff {
    let mut unique: Vec<&FederatedIdentityCredential> = Vec::with_capacity(desired.len());
    for credential in desired {
        if !unique.contains(&credential) {
            unique.push(credential);
        }
    }

    let mut diff = CredentialDiff::default();
    for credential in live {
        if !unique.contains(&credential) {
            diff.removed.push(credential.clone());
        }
    }
    for credential in unique {
        if live.contains(credential) {
            diff.unchanged.push(credential.clone());
        } else {
            diff.created.push(credential.clone());
        }
    }
    diff
}

/// What happened to one identity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    pub display_name: String,
    pub application_id: String,
    pub application_created: bool,
    pub role_assignments: usize,
    pub credentials_unchanged: usize,
    pub credentials_removed: usize,
    pub credentials_created: usize,
    pub secrets_pushed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub identities: Vec<IdentitySummary>,
    /// Documents written back by the config store
    pub saved: usize,
}

pub struct AccessReconciler {
    directory: Arc<dyn DirectoryClient>,
    repository_secrets: Arc<dyn RepositorySecretClient>,
    limiter: RateLimiter,
}

impl std::fmt::Debug for AccessReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessReconciler").field("limiter", &self.limiter).finish_non_exhaustive()
    }
}

impl AccessReconciler {
    pub fn new(
        directory: Arc<dyn DirectoryClient>,
        repository_secrets: Arc<dyn RepositorySecretClient>,
        limiter: RateLimiter,
    ) -> Self {
        Self { directory, repository_secrets, limiter }
    }

    /// Reconcile every document of `store`.
    pub async fn reconcile(
        &self,
        store: &dyn ConfigStore,
        options: &ReconcileOptions,
    ) -> Result<ReconcileReport> {
        let loaded = store.load().await?;
        let mut documents = loaded.documents;
        let mut failures = loaded.invalid;
        info!(
            identities = documents.len(),
            invalid = failures.len(),
            dry_run = options.dry_run,
            "Starting access reconciliation"
        );

        let mut report = ReconcileReport::default();

        for document in documents.iter_mut() {
            let name = document.display_name().to_string();

            if options.cancel.is_cancelled() {
                failures.push(ItemFailure::new(name, Error::Cancelled));
                continue;
            }

            let span = identity_span!(name, source = %document.source());
            match self.reconcile_identity(document, options.dry_run).instrument(span).await {
                Ok(summary) => report.identities.push(summary),
                Err(e) => {
                    error!(identity = %name, error = %e, "Identity failed");
                    failures.push(ItemFailure::new(name, e));
                }
            }
        }

        let mut changed = 0;
        for document in documents.iter_mut() {
            if document.fold_identifiers_into_raw() {
                changed += 1;
            }
        }

        if options.dry_run {
            debug!(changed, "Dry run, documents not saved");
        } else {
            report.saved = store.save(&documents).await?;
        }

        info!(
            succeeded = report.identities.len(),
            failed = failures.len(),
            saved = report.saved,
            "Access reconciliation finished"
        );

        if failures.is_empty() {
            Ok(report)
        } else {
            let succeeded = report.identities.iter().map(|s| s.display_name.clone()).collect();
            Err(BatchError::new("identities", succeeded, failures).into())
        }
    }

    async fn reconcile_identity(
        &self,
        document: &mut AccessConfigDocument,
        dry_run: bool,
    ) -> Result<IdentitySummary> {
        let display_name = document.display_name().to_string();

        let (application, application_created) = self
            .ensure_application(&display_name, dry_run)
            .await
            .map_err(|e| Error::step("application", &display_name, e))?;
        Span::current().record("application_id", application.app_id.as_str());

        let principal = self
            .ensure_service_principal(&application, dry_run)
            .await
            .map_err(|e| Error::step("service principal", &display_name, e))?;

        document.set_application_id(&application.app_id);
        document.render()?;
        document.require_resolved()?;

        let config = document.config().clone();

        for assignment in &config.role_based_access_controls {
            let Some(principal) = principal.as_ref().filter(|_| !dry_run) else {
                info!(role = %assignment.role, scope = %assignment.scope, "Would assign role");
                continue;
            };
            self.limiter.acquire(keys::DIRECTORY).await;
            self.directory
                .create_role_assignment(&principal.object_id, assignment)
                .await
                .map_err(|e| Error::step("role assignment", &display_name, e))?;
            debug!(role = %assignment.role, scope = %assignment.scope, "Role assigned");
        }

        let diff = self
            .sync_credentials(&application, &config.federated_identity_credentials, dry_run)
            .await
            .map_err(|e| Error::step("federated credentials", &display_name, e))?;

        let secrets_pushed = self
            .push_repository_secrets(document, dry_run)
            .await
            .map_err(|e| Error::step("repository secrets", &display_name, e))?;

        info!(
            application_created,
            roles = config.role_based_access_controls.len(),
            credentials_created = diff.created.len(),
            credentials_removed = diff.removed.len(),
            secrets_pushed,
            "Identity reconciled"
        );

        Ok(IdentitySummary {
            display_name,
            application_id: application.app_id,
            application_created,
            role_assignments: config.role_based_access_controls.len(),
            credentials_unchanged: diff.unchanged.len(),
            credentials_removed: diff.removed.len(),
            credentials_created: diff.created.len(),
            secrets_pushed,
        })
    }

    async fn ensure_application(
        &self,
        display_name: &str,
        dry_run: bool,
    ) -> Result<(Application, bool)> {
        self.limiter.acquire(keys::DIRECTORY).await;
        if let Some(application) = self.directory.find_application(display_name).await? {
            return Ok((application, false));
        }

        if dry_run {
            info!("Would create application");
            return Ok((
                Application {
                    object_id: DRY_RUN_APPLICATION_ID.to_string(),
                    app_id: DRY_RUN_APPLICATION_ID.to_string(),
                    display_name: display_name.to_string(),
                },
                true,
            ));
        }

        self.limiter.acquire(keys::DIRECTORY).await;
        let application = self.directory.create_application(display_name).await?;
        info!(app_id = %application.app_id, "Created application");
        Ok((application, true))
    }

    /// `None` only in dry runs, when the principal would have been created.
    async fn ensure_service_principal(
        &self,
        application: &Application,
        dry_run: bool,
    ) -> Result<Option<ServicePrincipal>> {
        if application.app_id != DRY_RUN_APPLICATION_ID {
            self.limiter.acquire(keys::DIRECTORY).await;
            if let Some(principal) =
                self.directory.find_service_principal(&application.app_id).await?
            {
                return Ok(Some(principal));
            }
        }

        if dry_run {
            info!("Would create service principal");
            return Ok(None);
        }

        self.limiter.acquire(keys::DIRECTORY).await;
        let principal = self.directory.create_service_principal(&application.app_id).await?;
        info!(principal = %principal.object_id, "Created service principal");
        Ok(Some(principal))
    }

    async fn sync_credentials(
        &self,
        application: &Application,
        desired: &[FederatedIdentityCredential],
        dry_run: bool,
    ) -> Result<CredentialDiff> {
        let live = if application.object_id == DRY_RUN_APPLICATION_ID {
            Vec::new()
        } else {
            self.limiter.acquire(keys::DIRECTORY).await;
            self.directory.list_federated_credentials(&application.object_id).await?
        };

        let diff = diff_credentials(&live, desired);

        if dry_run {
            for credential in &diff.removed {
                info!(credential = %credential.name, "Would delete federated credential");
            }
            for credential in &diff.created {
                info!(credential = %credential.name, "Would create federated credential");
            }
            return Ok(diff);
        }

        // Deletes first: a changed credential keeps its name.
        for credential in &diff.removed {
            self.limiter.acquire(keys::DIRECTORY).await;
            match self
                .directory
                .delete_federated_credential(&application.object_id, &credential.name)
                .await
            {
                Ok(()) => info!(credential = %credential.name, "Deleted federated credential"),
                Err(e) if e.is_not_found() => {
                    debug!(credential = %credential.name, "Federated credential already gone")
                }
                Err(e) => return Err(e),
            }
        }

        for credential in &diff.created {
            self.limiter.acquire(keys::DIRECTORY).await;
            self.directory.create_federated_credential(&application.object_id, credential).await?;
            info!(credential = %credential.name, "Created federated credential");
        }

        Ok(diff)
    }

    async fn push_repository_secrets(
        &self,
        document: &AccessConfigDocument,
        dry_run: bool,
    ) -> Result<usize> {
        let mut pushed = 0;

        for group in &document.config().github_repository_secrets {
            for repository in &group.repositories {
                let repository: RepositoryRef = repository.parse().map_err(Error::config)?;

                for (name, value) in &group.secrets {
                    if value.is_empty() {
                        warn!(repository = %repository, secret = %name, "Pushing empty secret value");
                    }
                    if dry_run {
                        info!(repository = %repository, secret = %name, "Would set repository secret");
                        continue;
                    }

                    let value = SecretString::new(value.clone());
                    self.limiter.acquire(keys::REPOSITORY_SECRETS).await;
                    self.repository_secrets.set_secret(&repository, name, &value).await?;
                    debug!(
                        repository = %repository,
                        secret = %name,
                        fingerprint = %value.fingerprint(),
                        "Repository secret set"
                    );
                    pushed += 1;
                }
            }
        }

        Ok(pushed)
    }
}
