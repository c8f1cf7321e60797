//! Aggregate error for batch runs.

use std::fmt;

use super::types::Error;

/// One failed unit of work (a rotation plan or an identity).
#[derive(Debug)]
pub struct ItemFailure {
    pub name: String,
    pub error: Error,
}

impl ItemFailure {
    pub fn new<S: Into<String>>(name: S, error: Error) -> Self {
        Self { name: name.into(), error }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

/// Raised once after every item of a batch has been attempted.
#[derive(Debug)]
pub struct BatchError {
    /// What the items are, in plural: "plans", "identities"
    pub kind: &'static str,
    pub succeeded: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

impl BatchError {
    pub fn new(kind: &'static str, succeeded: Vec<String>, failures: Vec<ItemFailure>) -> Self {
        Self { kind, succeeded, failures }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }

    /// Look up the failure recorded for an item
    pub fn failure(&self, name: &str) -> Option<&ItemFailure> {
        self.failures.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} {} failed: {}",
            self.failures.len(),
            self.total(),
            self.kind,
            self.failed_names().join(", ")
        )
    }
}

impl std::error::Error for BatchError {}
