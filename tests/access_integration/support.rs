//! Access document builders and a reconciler wired to in-memory backends.

#![allow(dead_code)]

use serde_json::{json, Value};

use keyward::access::AccessReconciler;
use keyward::domain::FederatedIdentityCredential;
use keyward::rate_limit::RateLimiter;

use crate::common::Backends;

pub const ISSUER: &str = "https://token.actions.githubusercontent.com";
pub const AUDIENCE: &str = "api://AzureADTokenExchange";

pub fn reconciler(backends: &Backends) -> AccessReconciler {
    AccessReconciler::new(
        backends.directory.clone(),
        backends.repositories.clone(),
        RateLimiter::unlimited(),
    )
}

/// Deployment identity for `service`, pushing its client id to the
/// service's repository.
pub fn document(service: &str) -> Value {
    json!({
        "appDisplayName": "{{service}}-deployer",
        "properties": {
            "service": service,
            "org": "acme",
            "subscription": "sub-1"
        },
        "federatedIdentityCredentials": [
            {
                "audiences": [AUDIENCE],
                "description": "Deploy from main",
                "issuer": ISSUER,
                "name": "main",
                "subject": "repo:{{org}}/{{service}}:ref:refs/heads/main"
            },
            {
                "audiences": [AUDIENCE],
                "issuer": ISSUER,
                "name": "production",
                "subject": "repo:{{org}}/{{service}}:environment:production"
            }
        ],
        "roleBasedAccessControls": [
            { "role": "Contributor", "scope": "/subscriptions/{{subscription}}/resourceGroups/{{service}}" }
        ],
        "githubRepositorySecrets": [
            {
                "repositories": ["{{org}}/{{service}}"],
                "secrets": {
                    "AZURE_CLIENT_ID": "{{applicationId}}",
                    "AZURE_SUBSCRIPTION_ID": "{{subscription}}"
                }
            }
        ]
    })
}

pub fn scope(service: &str) -> String {
    format!("/subscriptions/sub-1/resourceGroups/{}", service)
}

pub fn credential(name: &str, subject: &str) -> FederatedIdentityCredential {
    FederatedIdentityCredential {
        audiences: vec![AUDIENCE.to_string()],
        description: String::new(),
        issuer: ISSUER.to_string(),
        name: name.to_string(),
        subject: subject.to_string(),
    }
}
