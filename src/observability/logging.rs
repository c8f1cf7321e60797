//! # Structured Logging
//!
//! Subscriber setup and span macros. Every rotation plan run and every
//! reconciled identity gets its own span carrying an operation id, so all
//! log lines of one unit of work can be correlated.
//!
//! Secret values never appear as span or event fields; log a
//! [`SecretString::fingerprint`](crate::secrets::SecretString::fingerprint)
//! when a value has to be identified.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt as subscriber_fmt, EnvFilter};

/// Output format of log lines written to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown log format '{}', expected pretty or json", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `verbose`. Installing twice is not an error; the
/// first subscriber stays in place (integration tests rely on this).
pub fn init_logging(format: LogFormat, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let builder = subscriber_fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Pretty => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };

    if installed.is_err() {
        // Subscriber already set elsewhere
    }
}

/// Span for one rotation plan run.
///
/// ```rust,ignore
/// let span = plan_span!("db-password", operation_id);
/// let span = plan_span!("db-password", operation_id, dry_run = true);
/// ```
#[macro_export]
macro_rules! plan_span {
    ($plan:expr, $operation_id:expr) => {
        tracing::info_span!(
            "rotation_plan",
            plan = %$plan,
            operation_id = %$operation_id
        )
    };
    ($plan:expr, $operation_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "rotation_plan",
            plan = %$plan,
            operation_id = %$operation_id,
            $($field)*
        )
    };
}

/// Span for reconciling one identity; generates its operation id.
#[macro_export]
macro_rules! identity_span {
    ($display_name:expr) => {
        tracing::info_span!(
            "identity",
            identity = %$display_name,
            operation_id = %uuid::Uuid::new_v4(),
            application_id = tracing::field::Empty
        )
    };
    ($display_name:expr, $($field:tt)*) => {
        tracing::info_span!(
            "identity",
            identity = %$display_name,
            operation_id = %uuid::Uuid::new_v4(),
            application_id = tracing::field::Empty,
            $($field)*
        )
    };
}
