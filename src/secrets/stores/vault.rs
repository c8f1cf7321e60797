//! Vault secret store.
//!
//! Writes the value to `secretName` and keeps the plan's rotation record as
//! JSON in a sibling secret, `stateName` (default `<secretName>-rotation-state`).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::{VaultClient, VaultSecret};
use crate::errors::{Error, Result};
use crate::rate_limit::{keys, RateLimiter};
use crate::secrets::registry::StoreDefinition;
use crate::secrets::store::{Capabilities, SecretStore, StoreKind, WriteRequest};
use crate::secrets::types::SecretString;
use crate::secrets::value::{RotationRecord, SecretValue};

const STATE_SUFFIX: &str = "-rotation-state";
const TAG_OPERATION_ID: &str = "operationId";

pub struct VaultStore {
    name: String,
    secret_name: String,
    state_name: String,
    client: Arc<dyn VaultClient>,
    limiter: RateLimiter,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("name", &self.name)
            .field("secret_name", &self.secret_name)
            .field("state_name", &self.state_name)
            .finish()
    }
}

impl VaultStore {
    pub fn from_definition(
        definition: &StoreDefinition,
        client: Arc<dyn VaultClient>,
        limiter: RateLimiter,
    ) -> Result<Self> {
        let secret_name = definition.required_param("secretName")?;
        let state_name = definition
            .optional_param("stateName")?
            .unwrap_or_else(|| format!("{}{}", secret_name, STATE_SUFFIX));

        if state_name == secret_name {
            return Err(Error::config(format!(
                "Store '{}': stateName must differ from secretName",
                definition.name
            )));
        }

        Ok(Self { name: definition.name.clone(), secret_name, state_name, client, limiter })
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Vault
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().write().persist_state()
    }

    async fn write(&self, value: &SecretValue, request: WriteRequest<'_>) -> Result<()> {
        if request.dry_run {
            info!(store = %self.name, secret = %self.secret_name, "Dry run: would write secret");
            return Ok(());
        }

        let mut tags = value.tags().clone();
        tags.insert(TAG_OPERATION_ID.to_string(), request.operation_id.to_string());
        let secret = VaultSecret {
            value: value.value().clone(),
            expires_on: value.expiration_date(),
            tags,
        };

        self.limiter.acquire(keys::VAULT).await;
        self.client.set_secret(&self.secret_name, &secret).await?;
        info!(
            store = %self.name,
            secret = %self.secret_name,
            fingerprint = %value.value().fingerprint(),
            "Wrote secret"
        );
        Ok(())
    }

    async fn read_state(&self) -> Result<Option<RotationRecord>> {
        self.limiter.acquire(keys::VAULT).await;
        let Some(secret) = self.client.get_secret(&self.state_name).await? else {
            debug!(store = %self.name, state = %self.state_name, "No rotation record yet");
            return Ok(None);
        };

        let record = serde_json::from_str(secret.value.expose_secret()).map_err(|e| {
            Error::serialization(e, format!("rotation record in '{}'", self.state_name))
        })?;
        Ok(Some(record))
    }

    async fn save_state(&self, record: &RotationRecord, dry_run: bool) -> Result<()> {
        if dry_run {
            info!(store = %self.name, state = %self.state_name, "Dry run: would save rotation record");
            return Ok(());
        }

        let json = serde_json::to_string(record).map_err(|e| {
            Error::serialization(e, format!("rotation record for '{}'", self.state_name))
        })?;
        let secret = VaultSecret {
            value: SecretString::new(json),
            expires_on: record.current.as_ref().and_then(|state| state.expiration_date),
            tags: BTreeMap::new(),
        };

        self.limiter.acquire(keys::VAULT).await;
        self.client.set_secret(&self.state_name, &secret).await?;
        debug!(store = %self.name, state = %self.state_name, "Saved rotation record");
        Ok(())
    }
}
