//! Manual action store.
//!
//! For consumers no API can reach: the operator is shown the new value with
//! instructions and confirms once done. Revocation prompts are optional.

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use tracing::info;

use crate::clients::{OperatorPrompt, OperatorRequest};
use crate::errors::Result;
use crate::secrets::registry::StoreDefinition;
use crate::secrets::store::{
    Capabilities, RevocationAction, SecretStore, StoreKind, WriteRequest,
};
use crate::secrets::value::{SecretState, SecretValue};

pub struct ManualActionStore {
    name: String,
    prompt: String,
    revoke_prompt: Option<String>,
    operator: Arc<dyn OperatorPrompt>,
}

impl std::fmt::Debug for ManualActionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualActionStore")
            .field("name", &self.name)
            .field("revocable", &self.revoke_prompt.is_some())
            .finish()
    }
}

impl ManualActionStore {
    pub fn from_definition(
        definition: &StoreDefinition,
        operator: Arc<dyn OperatorPrompt>,
    ) -> Result<Self> {
        Ok(Self {
            name: definition.name.clone(),
            prompt: definition.required_param("prompt")?,
            revoke_prompt: definition.optional_param("revokePrompt")?,
            operator,
        })
    }
}

#[async_trait]
impl SecretStore for ManualActionStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::ManualAction
    }

    fn capabilities(&self) -> Capabilities {
        let capabilities = Capabilities::none().write().operator();
        if self.revoke_prompt.is_some() {
            capabilities.revoke()
        } else {
            capabilities
        }
    }

    async fn write(&self, value: &SecretValue, request: WriteRequest<'_>) -> Result<()> {
        if request.dry_run {
            info!(store = %self.name, "Dry run: would ask the operator to apply the new value");
            return Ok(());
        }

        self.operator
            .prompt(OperatorRequest {
                store: &self.name,
                message: &self.prompt,
                value: Some(value.value()),
            })
            .await?;
        info!(store = %self.name, "Operator confirmed manual update");
        Ok(())
    }

    fn revocation_action(&self, _state: &SecretState, dry_run: bool) -> Option<RevocationAction> {
        let message = self.revoke_prompt.clone()?;
        let store = self.name.clone();
        let operator = self.operator.clone();

        Some(Box::new(move || {
            async move {
                if dry_run {
                    info!(store = %store, "Dry run: would ask the operator to revoke the old value");
                    return Ok(());
                }
                operator.prompt(OperatorRequest { store: &store, message: &message, value: None }).await?;
                info!(store = %store, "Operator confirmed manual revocation");
                Ok(())
            }
            .boxed()
        }))
    }
}
