//! # Configuration Management
//!
//! Runtime settings come from the environment (after `.env` is loaded by the
//! binary). Rotation plans and access documents are separate JSON inputs,
//! see [`crate::rotation::config`] and [`crate::access::store`].

pub mod settings;

pub use settings::{
    RuntimeConfig, LOG_FORMAT_ENV, RATE_LIMIT_BURST_ENV, RATE_LIMIT_PER_SECOND_ENV,
    WARNING_WINDOW_ENV,
};
