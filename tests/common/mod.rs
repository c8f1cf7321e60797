//! Common test utilities for all integration tests.
//!
//! Provides in-memory backends wired into a store registry, plan document
//! builders, and a recording store that logs every step it performs.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keyward::clients::memory::{
    InMemoryCiVariables, InMemoryDirectory, InMemoryRepositorySecrets, InMemoryVault,
};
use keyward::rate_limit::RateLimiter;
use keyward::rotation::{LoadedPlans, PlanDocument, RevocationPolicy, RotationOrchestrator};
use keyward::secrets::{
    factory, Capabilities, Collaborators, OriginateRequest, RevocationAction, SecretState,
    SecretStore, SecretValue, StoreDefinition, StoreKind, StoreRegistry, WriteRequest,
};
use keyward::{Error, Result};

pub const WARNING_WINDOW: Duration = Duration::from_secs(7 * 24 * 3600);

/// In-memory backends behind a registry with every store kind.
pub struct Backends {
    pub directory: Arc<InMemoryDirectory>,
    pub vault: Arc<InMemoryVault>,
    pub ci: Arc<InMemoryCiVariables>,
    pub repositories: Arc<InMemoryRepositorySecrets>,
    pub registry: StoreRegistry,
}

pub fn backends() -> Backends {
    let directory = Arc::new(InMemoryDirectory::new());
    let vault = Arc::new(InMemoryVault::new());
    let ci = Arc::new(InMemoryCiVariables::new());
    let repositories = Arc::new(InMemoryRepositorySecrets::new());

    let registry = StoreRegistry::with_collaborators(
        &Collaborators::default()
            .with_directory(directory.clone())
            .with_vault(vault.clone())
            .with_ci(ci.clone())
            .with_repository_secrets(repositories.clone())
            .with_limiter(RateLimiter::unlimited()),
    );

    Backends { directory, vault, ci, repositories, registry }
}

/// Directory credential distributed to a vault secret and a CI variable.
pub fn service_principal_plan(name: &str, revocation: RevocationPolicy) -> PlanDocument {
    let revocation = serde_json::to_value(&revocation).unwrap();
    serde_json::from_value(serde_json::json!({
        "name": name,
        "tags": ["service-principal"],
        "rotationPeriod": "30d",
        "warningWindow": "5d",
        "revocation": revocation,
        "stores": [
            {
                "name": "directory",
                "type": "directory_credential",
                "origin": true,
                "parameters": { "applicationObjectId": format!("{}-app", name) }
            },
            {
                "name": "kv",
                "type": "vault",
                "parameters": { "secretName": name }
            },
            {
                "name": "pipeline",
                "type": "ci_variable",
                "parameters": { "resource": "deploy-group", "variable": name.to_uppercase() }
            }
        ]
    }))
    .unwrap()
}

/// Generated password written to a vault secret.
pub fn generated_plan(name: &str) -> PlanDocument {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "stores": [
            { "name": "gen", "type": "generator", "origin": true, "parameters": { "length": 24 } },
            { "name": "kv", "type": "vault", "parameters": { "secretName": name } }
        ]
    }))
    .unwrap()
}

pub fn loaded(documents: Vec<PlanDocument>) -> LoadedPlans {
    LoadedPlans { documents, invalid: Vec::new() }
}

pub fn orchestrator(backends: &Backends, documents: Vec<PlanDocument>) -> RotationOrchestrator {
    RotationOrchestrator::new(loaded(documents), &backends.registry, WARNING_WINDOW)
}

/// Shared, ordered log of store events such as `write:pipeline`.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

/// Store that originates serial values, accepts writes and revokes, logging
/// every call. `failWrite: true` makes writes fail.
#[derive(Debug)]
pub struct RecordingStore {
    name: String,
    kind: StoreKind,
    fail_write: bool,
    serial: AtomicUsize,
    log: EventLog,
}

impl RecordingStore {
    pub fn from_definition(definition: &StoreDefinition, log: EventLog) -> Result<Self> {
        Ok(Self {
            name: definition.name.clone(),
            kind: definition.kind,
            fail_write: definition.optional_param("failWrite")?.as_deref() == Some("true"),
            serial: AtomicUsize::new(0),
            log,
        })
    }
}

#[async_trait]
impl SecretStore for RecordingStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().originate().write().revoke()
    }

    async fn originate(&self, request: OriginateRequest<'_>) -> Result<SecretValue> {
        let serial = self.serial.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.push(format!("originate:{}:{}", self.name, serial));
        Ok(SecretValue::new(format!("value-{}", serial), Some(request.expiration_date))
            .with_tag("serial", serial.to_string()))
    }

    async fn write(&self, _value: &SecretValue, _request: WriteRequest<'_>) -> Result<()> {
        self.log.push(format!("write:{}", self.name));
        if self.fail_write {
            return Err(Error::backend("write", "injected failure"));
        }
        Ok(())
    }

    fn revocation_action(&self, state: &SecretState, dry_run: bool) -> Option<RevocationAction> {
        let serial = state.tag("serial")?.to_string();
        let event = format!("revoke:{}:{}", self.name, serial);
        let log = self.log.clone();
        Some(Box::new(move || {
            async move {
                if !dry_run {
                    log.push(event);
                }
                Ok(())
            }
            .boxed()
        }))
    }
}

/// Registry of [`backends`] where the `generator` and `ci_variable` kinds
/// build [`RecordingStore`]s instead.
pub fn recording_backends(log: &EventLog) -> Backends {
    let mut backends = backends();
    for kind in [StoreKind::Generator, StoreKind::CiVariable] {
        let log = log.clone();
        backends.registry.register(
            kind,
            factory(move |d| Ok(Arc::new(RecordingStore::from_definition(d, log.clone())?))),
        );
    }
    backends
}
