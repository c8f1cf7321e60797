//! Password credentials issued by the identity directory.
//!
//! Originates by adding a password credential to an application and revokes
//! by removing it again. The key id travels in the value's tags so the
//! credential can be found at revocation time.

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::DirectoryClient;
use crate::errors::Result;
use crate::rate_limit::{keys, RateLimiter};
use crate::secrets::registry::StoreDefinition;
use crate::secrets::store::{
    Capabilities, OriginateRequest, RevocationAction, SecretStore, StoreKind,
};
use crate::secrets::value::{
    SecretState, SecretValue, TAG_APPLICATION_OBJECT_ID, TAG_CREDENTIAL_ID,
};

pub struct DirectoryCredentialStore {
    name: String,
    application_object_id: String,
    display_name: String,
    client: Arc<dyn DirectoryClient>,
    limiter: RateLimiter,
}

impl std::fmt::Debug for DirectoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryCredentialStore")
            .field("name", &self.name)
            .field("application_object_id", &self.application_object_id)
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl DirectoryCredentialStore {
    pub fn from_definition(
        definition: &StoreDefinition,
        client: Arc<dyn DirectoryClient>,
        limiter: RateLimiter,
    ) -> Result<Self> {
        let application_object_id = definition.required_param("applicationObjectId")?;
        let display_name =
            definition.optional_param("displayName")?.unwrap_or_else(|| definition.name.clone());

        Ok(Self {
            name: definition.name.clone(),
            application_object_id,
            display_name,
            client,
            limiter,
        })
    }
}

#[async_trait]
impl SecretStore for DirectoryCredentialStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::DirectoryCredential
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().originate().revoke()
    }

    async fn originate(&self, request: OriginateRequest<'_>) -> Result<SecretValue> {
        if request.dry_run {
            info!(
                store = %self.name,
                application = %self.application_object_id,
                "Dry run: would add a password credential"
            );
            return Ok(SecretValue::placeholder(&self.name, Some(request.expiration_date))
                .with_tag(TAG_APPLICATION_OBJECT_ID, self.application_object_id.as_str()));
        }

        self.limiter.acquire(keys::DIRECTORY).await;
        let issued = self
            .client
            .add_password(&self.application_object_id, &self.display_name, request.expiration_date)
            .await?;

        info!(
            store = %self.name,
            application = %self.application_object_id,
            key_id = %issued.key_id,
            "Issued password credential"
        );

        Ok(SecretValue::new(issued.secret, Some(issued.end_date_time))
            .with_tag(TAG_CREDENTIAL_ID, issued.key_id)
            .with_tag(TAG_APPLICATION_OBJECT_ID, self.application_object_id.as_str()))
    }

    fn revocation_action(&self, state: &SecretState, dry_run: bool) -> Option<RevocationAction> {
        let key_id = state.tag(TAG_CREDENTIAL_ID)?.to_string();
        let application_object_id = state
            .tag(TAG_APPLICATION_OBJECT_ID)
            .unwrap_or(&self.application_object_id)
            .to_string();
        let store = self.name.clone();
        let client = self.client.clone();
        let limiter = self.limiter.clone();

        Some(Box::new(move || {
            async move {
                if dry_run {
                    info!(store = %store, key_id = %key_id, "Dry run: would remove password credential");
                    return Ok(());
                }

                limiter.acquire(keys::DIRECTORY).await;
                match client.remove_password(&application_object_id, &key_id).await {
                    Ok(()) => {
                        info!(store = %store, key_id = %key_id, "Removed password credential");
                        Ok(())
                    }
                    Err(e) if e.is_not_found() => {
                        debug!(store = %store, key_id = %key_id, "Password credential already removed");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            .boxed()
        }))
    }
}
