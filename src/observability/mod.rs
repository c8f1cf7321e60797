//! # Observability
//!
//! Structured logging through `tracing`. See [`logging`] for the subscriber
//! setup and the `plan_span!` / `identity_span!` macros.

pub mod logging;

pub use logging::{init_logging, LogFormat};
