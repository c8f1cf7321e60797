//! # Credential rotation
//!
//! - [`config`]: plan documents and the loader for configuration paths
//! - [`plan`]: plans built from documents and validated against store capabilities
//! - [`engine`]: runs one plan (originate, distribute, revoke, persist)
//! - [`orchestrator`]: `list`, `status` and `rotate` over a set of plans

pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod plan;

pub use config::{load_plans, LoadedPlans, PlanDocument};
pub use engine::{PlanOutcome, RotationEngine, RotationMode, RunOptions};
pub use orchestrator::{
    BatchReport, PlanHealth, PlanStatus, PlanSummary, RotateOptions, RotateRun,
    RotationOrchestrator, Selection,
};
pub use plan::{RevocationPolicy, RotationPlan, MAX_PERIOD};
