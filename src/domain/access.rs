//! Declarative access configuration for one identity.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Property key the reconciler fills in once the application exists.
pub const APPLICATION_ID_PROPERTY: &str = "applicationId";

/// Desired state for one identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationAccessConfig {
    pub app_display_name: String,

    /// Values substituted for `{{key}}` tokens in every other field
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    pub federated_identity_credentials: Vec<FederatedIdentityCredential>,

    #[serde(default)]
    pub role_based_access_controls: Vec<RoleBasedAccessControl>,

    #[serde(default)]
    pub github_repository_secrets: Vec<GithubRepositorySecretConfig>,
}

impl ApplicationAccessConfig {
    pub fn application_id(&self) -> Option<&str> {
        self.properties.get(APPLICATION_ID_PROPERTY).map(String::as_str)
    }
}

/// Trust binding letting an external issuer/subject pair act as the
/// application. Audiences compare as a set.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedIdentityCredential {
    #[serde(default)]
    pub audiences: Vec<String>,
    #[serde(default)]
    pub description: String,
    pub issuer: String,
    pub name: String,
    pub subject: String,
}

impl FederatedIdentityCredential {
    fn audience_set(&self) -> BTreeSet<&str> {
        self.audiences.iter().map(String::as_str).collect()
    }
}

impl PartialEq for FederatedIdentityCredential {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description
            && self.issuer == other.issuer
            && self.name == other.name
            && self.subject == other.subject
            && self.audience_set() == other.audience_set()
    }
}

/// Role assignment for the identity's service principal on a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBasedAccessControl {
    pub role: String,
    pub scope: String,
}

/// Secrets to push to each listed repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubRepositorySecretConfig {
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

/// `owner/repo` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepositoryRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self { owner: owner.to_string(), name: name.to_string() })
            }
            _ => Err(format!("Repository '{}' must have the form owner/repo", s)),
        }
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
