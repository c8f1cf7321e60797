//! Secret stores and credential values.
//!
//! Everything that produces, delivers or revokes credential material goes
//! through the [`SecretStore`] trait. A store adapts one backing technology
//! and advertises what it can do through [`Capabilities`]:
//!
//! | kind                   | originate | write | revoke | state |
//! |------------------------|-----------|-------|--------|-------|
//! | `generator`            | yes       |       |        |       |
//! | `directory_credential` | yes       |       | yes    |       |
//! | `vault`                |           | yes   |        | yes   |
//! | `ci_variable`          |           | yes   |        |       |
//! | `repository_secret`    |           | yes   |        |       |
//! | `manual_action`        |           | yes   | opt.   |       |
//!
//! Stores are built from plan configuration by the [`StoreRegistry`], which
//! only knows the kinds explicitly registered with it.
//!
//! # Example
//!
//! ```rust,ignore
//! use keyward::secrets::{Collaborators, StoreDefinition, StoreKind, StoreRegistry};
//!
//! let registry = StoreRegistry::with_collaborators(&Collaborators::default());
//! let store = registry.build(
//!     &StoreDefinition::new("gen", StoreKind::Generator).origin().with_param("length", 48),
//! )?;
//! assert!(store.capabilities().can_originate);
//! ```
//!
//! # Handling plaintext
//!
//! Plaintext only lives in [`SecretValue`], wrapped in a [`SecretString`]
//! that redacts itself in `Debug`, `Display` and `Serialize` output. What
//! gets persisted is a [`SecretState`] carrying a fingerprint.

pub mod registry;
pub mod store;
pub mod stores;
pub mod types;
pub mod value;

pub use registry::{factory, Collaborators, StoreDefinition, StoreFactory, StoreRegistry};
pub use store::{
    Capabilities, OriginateRequest, RevocationAction, SecretStore, StoreKind, WriteRequest,
};
pub use types::SecretString;
pub use value::{
    RotationRecord, SecretState, SecretValue, Tags, TAG_APPLICATION_OBJECT_ID, TAG_CREDENTIAL_ID,
    TAG_DRY_RUN,
};
