//! # Keyward
//!
//! Keyward rotates credentials across the systems that hold them and keeps
//! identity access in line with declarative documents.
//!
//! ## Architecture
//!
//! ```text
//! Plan files ──→ Orchestrator ──→ Rotation Engine ──→ Secret Stores ──→ Backends
//!                                        │
//!                                   Rate Limiter
//!                                        │
//! Access docs ─→ Access Reconciler ──────┴──────────────────────────→ Directory / Repositories
//! ```
//!
//! ## Core Components
//!
//! - **Secret stores** ([`secrets`]): capability-tagged adapters over vaults,
//!   directories, CI variables, repository secrets and manual steps
//! - **Rotation** ([`rotation`]): plans, the per-plan engine and the batch
//!   orchestrator behind `list`, `status` and `rotate`
//! - **Access** ([`access`]): templated access documents and the reconciler
//! - **Clients** ([`clients`]): backend interfaces and in-memory fakes
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use keyward::rotation::{load_plans, RotateOptions, RotationOrchestrator, Selection};
//! use keyward::secrets::{Collaborators, StoreRegistry};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> keyward::Result<()> {
//!     let registry = StoreRegistry::with_collaborators(&Collaborators::default());
//!     let plans = load_plans(Path::new("plans/"))?;
//!     let orchestrator =
//!         RotationOrchestrator::new(plans, &registry, Duration::from_secs(7 * 86_400));
//!
//!     let report = orchestrator.rotate(&RotateOptions::new(Selection::All)).await?;
//!     println!("{} plans rotated", report.rotated().count());
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod cli;
pub mod clients;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod rate_limit;
pub mod rotation;
pub mod secrets;

// Re-export commonly used types and traits
pub use config::RuntimeConfig;
pub use errors::{BatchError, Error, ItemFailure, Result};
pub use observability::{init_logging, LogFormat};
pub use rate_limit::RateLimiter;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
