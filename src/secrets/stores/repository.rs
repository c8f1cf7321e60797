//! Source repository secret store.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::clients::RepositorySecretClient;
use crate::domain::RepositoryRef;
use crate::errors::{Error, Result};
use crate::rate_limit::{keys, RateLimiter};
use crate::secrets::registry::StoreDefinition;
use crate::secrets::store::{Capabilities, SecretStore, StoreKind, WriteRequest};
use crate::secrets::value::SecretValue;

pub struct RepositorySecretStore {
    name: String,
    repository: RepositoryRef,
    secret_name: String,
    client: Arc<dyn RepositorySecretClient>,
    limiter: RateLimiter,
}

impl std::fmt::Debug for RepositorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositorySecretStore")
            .field("name", &self.name)
            .field("repository", &self.repository)
            .field("secret_name", &self.secret_name)
            .finish()
    }
}

impl RepositorySecretStore {
    pub fn from_definition(
        definition: &StoreDefinition,
        client: Arc<dyn RepositorySecretClient>,
        limiter: RateLimiter,
    ) -> Result<Self> {
        let repository = definition
            .required_param("repository")?
            .parse()
            .map_err(|e: String| Error::config(format!("Store '{}': {}", definition.name, e)))?;

        Ok(Self {
            name: definition.name.clone(),
            repository,
            secret_name: definition.required_param("secretName")?,
            client,
            limiter,
        })
    }
}

#[async_trait]
impl SecretStore for RepositorySecretStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::RepositorySecret
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().write()
    }

    async fn write(&self, value: &SecretValue, request: WriteRequest<'_>) -> Result<()> {
        if request.dry_run {
            info!(
                store = %self.name,
                repository = %self.repository,
                secret = %self.secret_name,
                "Dry run: would set repository secret"
            );
            return Ok(());
        }

        self.limiter.acquire(keys::REPOSITORY_SECRETS).await;
        self.client.set_secret(&self.repository, &self.secret_name, value.value()).await?;
        info!(
            store = %self.name,
            repository = %self.repository,
            secret = %self.secret_name,
            "Set repository secret"
        );
        Ok(())
    }
}
