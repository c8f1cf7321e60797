//! Domain layer
//!
//! Plain data types shared by the access reconciler, the store adapters and
//! the collaborator clients. No I/O lives here.

pub mod access;
pub mod directory;

pub use access::{
    ApplicationAccessConfig, FederatedIdentityCredential, GithubRepositorySecretConfig,
    RepositoryRef, RoleBasedAccessControl, APPLICATION_ID_PROPERTY,
};
pub use directory::{Application, IssuedCredential, ServicePrincipal};
