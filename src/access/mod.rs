//! # Access configuration
//!
//! Declarative identity access: one JSON document per identity listing its
//! federated credentials, role assignments and repository secrets, with
//! `{{token}}` placeholders filled from the document's `properties`.
//!
//! - [`template`]: token rendering over JSON trees
//! - [`document`]: raw and rendered views of one document
//! - [`store`]: loading and saving documents
//! - [`reconciler`]: applies documents to the directory and repositories

pub mod document;
pub mod reconciler;
pub mod store;
pub mod template;

pub use document::AccessConfigDocument;
pub use reconciler::{
    diff_credentials, AccessReconciler, CredentialDiff, IdentitySummary, ReconcileOptions,
    ReconcileReport, DRY_RUN_APPLICATION_ID,
};
pub use store::{ConfigStore, FileConfigStore, LoadedDocuments, MemoryConfigStore};
