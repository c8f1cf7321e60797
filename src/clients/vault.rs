//! HashiCorp Vault KV v2 client
//!
//! Each secret is stored as a flat map: `value` holds the credential,
//! `expiresOn` an RFC 3339 timestamp and `tags` a JSON object.
//!
//! Configuration comes from the environment:
//! - `KEYWARD_VAULT_ADDR` (falls back to `VAULT_ADDR`)
//! - `KEYWARD_VAULT_TOKEN` (falls back to `VAULT_TOKEN`)
//! - `KEYWARD_VAULT_NAMESPACE`: optional Enterprise namespace
//! - `KEYWARD_VAULT_KV_MOUNT`: KV v2 mount path (default: "secret")

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use vaultrs::client::{VaultClient as VaultHttpClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use super::{VaultClient, VaultSecret};
use crate::errors::{Error, Result};
use crate::secrets::SecretString;

const FIELD_VALUE: &str = "value";
const FIELD_EXPIRES_ON: &str = "expiresOn";
const FIELD_TAGS: &str = "tags";

/// Connection settings for [`VaultKvClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultKvConfig {
    pub address: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub namespace: Option<String>,
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
}

fn default_mount_path() -> String {
    "secret".to_string()
}

fn env_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary).or_else(|_| std::env::var(fallback)).ok().filter(|v| !v.is_empty())
}

impl VaultKvConfig {
    /// `None` when no Vault address is configured.
    pub fn from_env() -> Option<Self> {
        let address = env_with_fallback("KEYWARD_VAULT_ADDR", "VAULT_ADDR")?;
        let token = env_with_fallback("KEYWARD_VAULT_TOKEN", "VAULT_TOKEN");
        let namespace = std::env::var("KEYWARD_VAULT_NAMESPACE").ok();
        let mount_path =
            std::env::var("KEYWARD_VAULT_KV_MOUNT").unwrap_or_else(|_| default_mount_path());

        Some(Self { address, token, namespace, mount_path })
    }
}

/// [`VaultClient`] backed by a Vault KV v2 engine.
pub struct VaultKvClient {
    client: VaultHttpClient,
    mount_path: String,
}

impl std::fmt::Debug for VaultKvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKvClient").field("mount_path", &self.mount_path).finish()
    }
}

impl VaultKvClient {
    pub fn new(config: VaultKvConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(Error::config("Vault address cannot be empty"));
        }

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);

        if let Some(ref token) = config.token {
            settings_builder.token(token);
        }

        if let Some(namespace) = config.namespace {
            settings_builder.namespace(Some(namespace));
        }

        let settings = settings_builder
            .build()
            .map_err(|e| Error::config(format!("Invalid Vault configuration: {}", e)))?;

        let client = VaultHttpClient::new(settings)
            .map_err(|e| Error::backend("vault.connect", format!("{}", e)))?;

        tracing::debug!(address = %config.address, mount_path = %config.mount_path, "Vault client configured");
        Ok(Self { client, mount_path: config.mount_path })
    }

    pub fn from_env() -> Result<Option<Self>> {
        VaultKvConfig::from_env().map(Self::new).transpose()
    }
}

fn is_missing(error: &ClientError) -> bool {
    matches!(error, ClientError::APIError { code: 404, .. })
}

fn decode(name: &str, mut data: HashMap<String, String>) -> Result<VaultSecret> {
    let value = data.remove(FIELD_VALUE).ok_or_else(|| {
        Error::backend("vault.read", format!("Secret '{}' has no '{}' field", name, FIELD_VALUE))
    })?;

    let expires_on = data
        .get(FIELD_EXPIRES_ON)
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw).map(|d| d.with_timezone(&Utc)).map_err(|e| {
                Error::backend("vault.read", format!("Secret '{}' has invalid expiresOn: {}", name, e))
            })
        })
        .transpose()?;

    let tags = match data.get(FIELD_TAGS) {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::serialization(e, format!("tags of secret '{}'", name)))?,
        None => BTreeMap::new(),
    };

    Ok(VaultSecret { value: SecretString::new(value), expires_on, tags })
}

fn encode(name: &str, secret: &VaultSecret) -> Result<HashMap<String, String>> {
    let mut data = HashMap::new();
    data.insert(FIELD_VALUE.to_string(), secret.value.expose_secret().to_string());
    if let Some(expires_on) = secret.expires_on {
        data.insert(FIELD_EXPIRES_ON.to_string(), expires_on.to_rfc3339());
    }
    if !secret.tags.is_empty() {
        let tags = serde_json::to_string(&secret.tags)
            .map_err(|e| Error::serialization(e, format!("tags of secret '{}'", name)))?;
        data.insert(FIELD_TAGS.to_string(), tags);
    }
    Ok(data)
}

#[async_trait]
impl VaultClient for VaultKvClient {
    async fn get_secret(&self, name: &str) -> Result<Option<VaultSecret>> {
        match kv2::read::<HashMap<String, String>>(&self.client, &self.mount_path, name).await {
            Ok(data) => decode(name, data).map(Some),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => {
                tracing::error!(error = %e, secret = %name, "Failed to read secret from Vault");
                Err(Error::backend("vault.read", format!("Secret '{}': {}", name, e)))
            }
        }
    }

    async fn set_secret(&self, name: &str, secret: &VaultSecret) -> Result<()> {
        let data = encode(name, secret)?;
        kv2::set(&self.client, &self.mount_path, name, &data).await.map_err(|e| {
            tracing::error!(error = %e, secret = %name, "Failed to write secret to Vault");
            Error::backend("vault.write", format!("Secret '{}': {}", name, e))
        })?;

        tracing::info!(secret = %name, mount_path = %self.mount_path, "Stored secret in Vault");
        Ok(())
    }
}
