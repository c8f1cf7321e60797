//! Objects observed in the identity directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::secrets::SecretString;

/// Directory application registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Directory object id, used to address the application itself
    pub object_id: String,
    /// Client id, the identifier other systems reference
    pub app_id: String,
    pub display_name: String,
}

/// Service principal backing an application in a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    pub object_id: String,
    pub app_id: String,
}

/// Password credential issued by the directory.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub key_id: String,
    pub secret: SecretString,
    pub end_date_time: DateTime<Utc>,
}
