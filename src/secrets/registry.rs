//! Store registry
//!
//! Maps each [`StoreKind`] to a factory that turns a [`StoreDefinition`]
//! from plan configuration into a live [`SecretStore`]. Kinds are registered
//! explicitly; nothing is discovered at runtime.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::store::{SecretStore, StoreKind};
use super::stores::{
    CiVariableStore, DirectoryCredentialStore, GeneratorStore, ManualActionStore,
    RepositorySecretStore, VaultStore,
};
use crate::clients::{
    CiVariableClient, DirectoryClient, OperatorPrompt, RepositorySecretClient, UnattendedPrompt,
    VaultClient,
};
use crate::errors::{Error, Result};
use crate::rate_limit::RateLimiter;

/// One store entry in a plan document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: StoreKind,

    /// Produces new values for the plan
    #[serde(default)]
    pub origin: bool,

    /// Persists the plan's rotation record
    #[serde(default)]
    pub primary: bool,

    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl StoreDefinition {
    pub fn new(name: impl Into<String>, kind: StoreKind) -> Self {
        Self { name: name.into(), kind, origin: false, primary: false, parameters: Map::new() }
    }

    pub fn origin(mut self) -> Self {
        self.origin = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    /// String parameter; numbers and booleans are accepted as their text form.
    pub fn optional_param(&self, key: &str) -> Result<Option<String>> {
        match self.parameters.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(Error::config(format!(
                "Store '{}': parameter '{}' must be a string",
                self.name, key
            ))),
        }
    }

    pub fn required_param(&self, key: &str) -> Result<String> {
        self.optional_param(key)?.ok_or_else(|| {
            Error::config(format!(
                "Store '{}' ({}) is missing required parameter '{}'",
                self.name, self.kind, key
            ))
        })
    }

    pub fn usize_param(&self, key: &str, default: usize) -> Result<usize> {
        match self.optional_param(key)? {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                Error::config(format!(
                    "Store '{}': parameter '{}' must be a positive integer, got '{}'",
                    self.name, key, raw
                ))
            }),
        }
    }
}

/// Builds a store from its definition.
pub type StoreFactory = Arc<dyn Fn(&StoreDefinition) -> Result<Arc<dyn SecretStore>> + Send + Sync>;

/// Wrap a closure as a [`StoreFactory`].
pub fn factory<F, S>(build: F) -> StoreFactory
where
    F: Fn(&StoreDefinition) -> Result<Arc<S>> + Send + Sync + 'static,
    S: SecretStore + 'static,
{
    Arc::new(move |definition: &StoreDefinition| {
        let store: Arc<dyn SecretStore> = build(definition)?;
        Ok(store)
    })
}

/// Backends the built-in stores talk to. Absent collaborators leave the
/// matching store kinds unregistered.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Option<Arc<dyn DirectoryClient>>,
    pub vault: Option<Arc<dyn VaultClient>>,
    pub ci: Option<Arc<dyn CiVariableClient>>,
    pub repository_secrets: Option<Arc<dyn RepositorySecretClient>>,
    pub operator: Arc<dyn OperatorPrompt>,
    pub limiter: RateLimiter,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            directory: None,
            vault: None,
            ci: None,
            repository_secrets: None,
            operator: Arc::new(UnattendedPrompt),
            limiter: RateLimiter::default(),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("directory", &self.directory.is_some())
            .field("vault", &self.vault.is_some())
            .field("ci", &self.ci.is_some())
            .field("repository_secrets", &self.repository_secrets.is_some())
            .field("interactive", &self.operator.is_interactive())
            .finish()
    }
}

impl Collaborators {
    pub fn with_directory(mut self, client: Arc<dyn DirectoryClient>) -> Self {
        self.directory = Some(client);
        self
    }

    pub fn with_vault(mut self, client: Arc<dyn VaultClient>) -> Self {
        self.vault = Some(client);
        self
    }

    pub fn with_ci(mut self, client: Arc<dyn CiVariableClient>) -> Self {
        self.ci = Some(client);
        self
    }

    pub fn with_repository_secrets(mut self, client: Arc<dyn RepositorySecretClient>) -> Self {
        self.repository_secrets = Some(client);
        self
    }

    pub fn with_operator(mut self, operator: Arc<dyn OperatorPrompt>) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }
}

/// Registry of store factories keyed by kind.
#[derive(Default)]
pub struct StoreRegistry {
    factories: HashMap<StoreKind, StoreFactory>,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry").field("kinds", &self.registered_kinds()).finish()
    }
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every built-in kind whose collaborator is available.
    pub fn with_collaborators(collaborators: &Collaborators) -> Self {
        let mut registry = Self::new();

        registry.register(
            StoreKind::Generator,
            factory(|d| Ok(Arc::new(GeneratorStore::from_definition(d)?))),
        );

        let operator = collaborators.operator.clone();
        registry.register(
            StoreKind::ManualAction,
            factory(move |d| {
                Ok(Arc::new(ManualActionStore::from_definition(d, operator.clone())?))
            }),
        );

        let limiter = collaborators.limiter.clone();

        if let Some(client) = collaborators.directory.clone() {
            let limiter = limiter.clone();
            registry.register(
                StoreKind::DirectoryCredential,
                factory(move |d| {
                    Ok(Arc::new(DirectoryCredentialStore::from_definition(
                        d,
                        client.clone(),
                        limiter.clone(),
                    )?))
                }),
            );
        } else {
            debug!(kind = %StoreKind::DirectoryCredential, "Directory client not configured");
        }

        if let Some(client) = collaborators.vault.clone() {
            let limiter = limiter.clone();
            registry.register(
                StoreKind::Vault,
                factory(move |d| {
                    Ok(Arc::new(VaultStore::from_definition(d, client.clone(), limiter.clone())?))
                }),
            );
        } else {
            debug!(kind = %StoreKind::Vault, "Vault client not configured");
        }

        if let Some(client) = collaborators.ci.clone() {
            let limiter = limiter.clone();
            registry.register(
                StoreKind::CiVariable,
                factory(move |d| {
                    Ok(Arc::new(CiVariableStore::from_definition(
                        d,
                        client.clone(),
                        limiter.clone(),
                    )?))
                }),
            );
        } else {
            debug!(kind = %StoreKind::CiVariable, "CI variable client not configured");
        }

        if let Some(client) = collaborators.repository_secrets.clone() {
            registry.register(
                StoreKind::RepositorySecret,
                factory(move |d| {
                    Ok(Arc::new(RepositorySecretStore::from_definition(
                        d,
                        client.clone(),
                        limiter.clone(),
                    )?))
                }),
            );
        } else {
            debug!(kind = %StoreKind::RepositorySecret, "Repository secret client not configured");
        }

        registry
    }

    pub fn register(&mut self, kind: StoreKind, factory: StoreFactory) {
        info!(store_kind = %kind, "Registering secret store");
        self.factories.insert(kind, factory);
    }

    pub fn has_factory(&self, kind: StoreKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Registered kinds in declaration order
    pub fn registered_kinds(&self) -> Vec<StoreKind> {
        StoreKind::ALL.into_iter().filter(|kind| self.has_factory(*kind)).collect()
    }

    pub fn build(&self, definition: &StoreDefinition) -> Result<Arc<dyn SecretStore>> {
        let factory = self.factories.get(&definition.kind).ok_or_else(|| {
            Error::config(format!(
                "Store '{}' has type '{}' which is not available in this environment",
                definition.name, definition.kind
            ))
        })?;
        factory(definition)
    }
}
