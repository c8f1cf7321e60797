//! # Error Handling
//!
//! Error types for keyward, defined with `thiserror`.
//!
//! Errors fall into three classes:
//!
//! - **Configuration**: a missing parameter, unresolved template token or
//!   malformed document. Scoped to the plan or identity that referenced it.
//! - **Backend**: a directory, vault, CI or repository API failure. A
//!   "not found" on delete or revoke is treated as already satisfied.
//! - **Batch**: raised once after a full pass, wrapping every per-item
//!   failure while every successful item has still been applied.

mod batch;
mod types;

pub use batch::{BatchError, ItemFailure};
pub use types::Error;

/// Custom result type for keyward operations
pub type Result<T> = std::result::Result<T, Error>;
