//! CI/build pipeline variable store.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::clients::CiVariableClient;
use crate::errors::Result;
use crate::rate_limit::{keys, RateLimiter};
use crate::secrets::registry::StoreDefinition;
use crate::secrets::store::{Capabilities, SecretStore, StoreKind, WriteRequest};
use crate::secrets::value::SecretValue;

pub struct CiVariableStore {
    name: String,
    resource: String,
    variable: String,
    client: Arc<dyn CiVariableClient>,
    limiter: RateLimiter,
}

impl std::fmt::Debug for CiVariableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiVariableStore")
            .field("name", &self.name)
            .field("resource", &self.resource)
            .field("variable", &self.variable)
            .finish()
    }
}

impl CiVariableStore {
    pub fn from_definition(
        definition: &StoreDefinition,
        client: Arc<dyn CiVariableClient>,
        limiter: RateLimiter,
    ) -> Result<Self> {
        Ok(Self {
            name: definition.name.clone(),
            resource: definition.required_param("resource")?,
            variable: definition.required_param("variable")?,
            client,
            limiter,
        })
    }
}

#[async_trait]
impl SecretStore for CiVariableStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::CiVariable
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().write()
    }

    async fn write(&self, value: &SecretValue, request: WriteRequest<'_>) -> Result<()> {
        if request.dry_run {
            info!(
                store = %self.name,
                resource = %self.resource,
                variable = %self.variable,
                "Dry run: would set variable"
            );
            return Ok(());
        }

        self.limiter.acquire(keys::CI).await;
        self.client.set_variable(&self.resource, &self.variable, value.value(), true).await?;
        info!(store = %self.name, resource = %self.resource, variable = %self.variable, "Set variable");
        Ok(())
    }
}
