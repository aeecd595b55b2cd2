//! Error types for the leadflow engine.
//!
//! Data gaps (unknown pipelines, missing users, empty timelines) are never
//! errors: they surface through [`crate::events::DiagnosticSink`]. The types
//! here cover configuration defects, fetch-layer failures and run control.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for leadflow operations.
#[derive(Debug, Error)]
pub enum LeadflowError {
    /// Tenant or funnel configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The lead source failed past its retry budget.
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// The batch run was cancelled.
    #[error("Batch cancelled: {0}")]
    Cancelled(String),

    /// No tenant is registered under the requested identifier.
    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),

    /// The global tracing subscriber could not be installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// A worker task panicked or was aborted.
    #[error("Worker task failed: {0}")]
    Join(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration defects detected when a tenant is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A funnel has no stages at all.
    #[error("Funnel '{model}' has no stages")]
    EmptyFunnel {
        /// Funnel name.
        model: String,
    },

    /// Two stages of one funnel share a priority.
    #[error("Funnel '{model}' has duplicate priority {priority} ('{first}' and '{second}')")]
    DuplicatePriority {
        /// Funnel name.
        model: String,
        /// The clashing priority.
        priority: u32,
        /// First stage key.
        first: String,
        /// Second stage key.
        second: String,
    },

    /// Two stages of one funnel share a key.
    #[error("Funnel '{model}' has duplicate stage key '{key}'")]
    DuplicateStageKey {
        /// Funnel name.
        model: String,
        /// The clashing key.
        key: String,
    },

    /// A non-root stage has neither status nor field criteria.
    #[error("Stage '{stage}' of funnel '{model}' has no inclusion criteria")]
    MissingCriteria {
        /// Funnel name.
        model: String,
        /// Stage key.
        stage: String,
    },

    /// A stage purchase rate is outside `0..=1`.
    #[error("Stage '{stage}' has purchase rate {rate} outside 0..=1")]
    InvalidPurchaseRate {
        /// Stage key.
        stage: String,
        /// Offending rate.
        rate: String,
    },

    /// The UTC offset is not a real-world offset.
    #[error("UTC offset {0}h is out of range")]
    InvalidOffset(i32),

    /// A duty window ends before it starts or names a bad weekday.
    #[error("Invalid duty window for weekday {weekday}: {reason}")]
    InvalidSchedule {
        /// Weekday, Monday = 0.
        weekday: u8,
        /// What is wrong.
        reason: String,
    },

    /// A tenant references a stage key its funnel does not define.
    #[error("Unknown stage '{key}' referenced by {context}")]
    UnknownStage {
        /// The stage key.
        key: String,
        /// Where it was referenced.
        context: String,
    },

    /// A tenant rule references a field it does not declare.
    #[error("Unknown field '{key}' referenced by {context}")]
    UnknownField {
        /// The field key.
        key: String,
        /// Where it was referenced.
        context: String,
    },

    /// A tenant has no funnel models.
    #[error("Tenant '{0}' defines no funnels")]
    NoFunnels(String),

    /// A configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// How a transient fetch failure came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    /// Connection refused, reset or timed out.
    Connection,
    /// The API answered with an expired-token payload.
    Unauthorized,
    /// The body was not valid JSON.
    MalformedBody,
    /// Rate limited by the API.
    Throttled,
    /// The request was too large for the API.
    Oversized,
    /// Upstream server error.
    Upstream,
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connection => "connection",
            Self::Unauthorized => "unauthorized",
            Self::MalformedBody => "malformed_body",
            Self::Throttled => "throttled",
            Self::Oversized => "oversized",
            Self::Upstream => "upstream",
        };
        write!(f, "{s}")
    }
}

/// A failure worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Transient fetch error ({kind}) on '{path}': {message}")]
pub struct TransientFetchError {
    /// Failure class.
    pub kind: TransientKind,
    /// Request path.
    pub path: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status, if any.
    pub status: Option<u16>,
}

impl TransientFetchError {
    /// Creates a new transient error.
    #[must_use]
    pub fn new(kind: TransientKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Sets the HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind));
        map.insert("path".to_string(), serde_json::json!(self.path));
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(status) = self.status {
            map.insert("status".to_string(), serde_json::json!(status));
        }
        map
    }
}

/// A failure that retrying cannot fix.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Fatal fetch error on '{path}': {message}")]
pub struct FatalFetchError {
    /// Request path.
    pub path: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status, if any.
    pub status: Option<u16>,
}

impl FatalFetchError {
    /// Creates a new fatal error.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Sets the HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Errors raised at the fetch boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Retryable failure.
    #[error("{0}")]
    Transient(#[from] TransientFetchError),

    /// Non-retryable failure.
    #[error("{0}")]
    Fatal(#[from] FatalFetchError),

    /// The retry budget ran out.
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made, including the first.
        attempts: usize,
        /// The last transient failure.
        last: TransientFetchError,
    },
}

impl FetchError {
    /// Returns true if the error may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns true if the error is an expired-token condition.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Transient(e) if e.kind == TransientKind::Unauthorized)
    }
}

/// Result alias used across the crate.
pub type Result<T, E = LeadflowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::DuplicatePriority {
            model: "sm".to_string(),
            priority: 3,
            first: "a".to_string(),
            second: "b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Funnel 'sm' has duplicate priority 3 ('a' and 'b')"
        );
    }

    #[test]
    fn test_fetch_error_classification() {
        let transient: FetchError =
            TransientFetchError::new(TransientKind::Connection, "leads", "reset").into();
        let unauthorized: FetchError =
            TransientFetchError::new(TransientKind::Unauthorized, "leads", "401").into();
        let fatal: FetchError = FatalFetchError::new("leads", "bad request")
            .with_status(400)
            .into();

        assert!(transient.is_transient());
        assert!(!transient.is_unauthorized());
        assert!(unauthorized.is_unauthorized());
        assert!(!fatal.is_transient());
    }

    #[test]
    fn test_transient_to_dict() {
        let err = TransientFetchError::new(TransientKind::Throttled, "events", "slow down")
            .with_status(429);
        let dict = err.to_dict();

        assert_eq!(dict.get("kind"), Some(&serde_json::json!("throttled")));
        assert_eq!(dict.get("status"), Some(&serde_json::json!(429)));
    }

    #[test]
    fn test_leadflow_error_from_config() {
        let err: LeadflowError = ConfigError::InvalidOffset(20).into();
        assert!(matches!(err, LeadflowError::Config(ConfigError::InvalidOffset(20))));
        assert_eq!(err.to_string(), "UTC offset 20h is out of range");
    }
}
