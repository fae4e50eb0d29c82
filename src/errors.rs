//! Shared error-chain type used across the engine's typed error enums.
//!
//! Grounded on the teacher's `channels::errors` module: a `LadderError` is a
//! small, serializable cause chain that survives crossing the ledger/event
//! boundary (unlike `anyhow::Error`, which doesn't implement `Serialize`).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A serializable error with an optional boxed cause chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LadderError {
    pub message: String,
    pub cause: Option<Box<LadderError>>,
    #[serde(default)]
    pub details: Value,
}

impl LadderError {
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            details: Value::Null,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: LadderError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for LadderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for LadderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl<E: std::error::Error> From<&E> for LadderError {
    fn from(err: &E) -> Self {
        LadderError::msg(err.to_string())
    }
}
