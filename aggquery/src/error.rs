//! Error types for the aggregate query pipeline.
//!
//! This module defines one error type per layer:
//!
//! - [`ConfigError`] - Executor configuration errors
//! - [`PayloadError`] - Loading and unwrapping payload documents
//! - [`FieldError`] / [`ValidationResult`] - Local structural violations
//! - [`TransportError`] - Connectivity failures reported by the executor
//! - [`FlattenError`] - Malformed cell sets
//! - [`QueryError`] - One query run (validation, remote status, flattening)
//! - [`OrchestratorError`] - Multi-metric runs
//! - [`OutputError`] - Writing result tables
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while building an [`crate::config::ApiConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required variables are unset.
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingVars(Vec<String>),

    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

// =============================================================================
// Payload Loading Errors
// =============================================================================

/// Errors while reading or unwrapping a payload document.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Failed to read file.
    #[error("Failed to read payload file: {0}")]
    Io(#[from] std::io::Error),

    /// File content is not JSON.
    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document (or its `payload` envelope) is not an object.
    #[error("{what} must be a JSON object")]
    NotAnObject { what: String },
}

// =============================================================================
// Validation Errors
// =============================================================================

/// A single structural violation found by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{path}: {message}")]
pub struct FieldError {
    /// Dotted path to the offending field, e.g. `query.axes[0].dimensionLevelSelection.levelIds`.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Outcome of [`crate::validation::validate`]: every violation found in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    /// `true` when no violation was found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors whose path starts with `prefix`.
    pub fn errors_at<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.errors.iter().filter(move |e| e.path.starts_with(prefix))
    }

    /// Turn a failed result into an error, keeping a passing one as `Ok`.
    pub fn into_result(self) -> Result<(), QueryError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(QueryError::Validation(self))
        }
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "valid");
        }
        let lines: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", lines.join("; "))
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Connectivity failures from the request executor. Never retried by the core.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or no response arrived.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The request exceeded the executor's timeout.
    #[error("Request timed out")]
    Timeout,

    /// The response body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(String),
}

// =============================================================================
// Flatten Errors
// =============================================================================

/// A cell set whose cells do not line up with its axes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlattenError {
    /// A cell carries the wrong number of coordinates.
    #[error("cell {cell}: expected {expected} coordinates (one per axis), found {found}")]
    CoordinateCount {
        cell: usize,
        expected: usize,
        found: usize,
    },

    /// A coordinate points past the end of its axis.
    #[error("cell {cell}: coordinate {index} is out of range for axis {axis} with {len} positions")]
    CoordinateOutOfRange {
        cell: usize,
        axis: usize,
        index: usize,
        len: usize,
    },

    /// A multi-metric cell does not carry one value per measure.
    #[error("cell {cell}: expected {expected} measure values, found {found}")]
    ValueCount {
        cell: usize,
        expected: usize,
        found: usize,
    },
}

// =============================================================================
// Query Errors
// =============================================================================

/// Errors from a single validate → execute → flatten cycle.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Local structural violations; nothing was sent.
    #[error("Payload failed validation with {count} error(s): {0}", count = .0.errors.len())]
    Validation(ValidationResult),

    /// Connectivity failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// HTTP 400: the service rejected the query semantics.
    #[error("Query rejected (400): {message}")]
    SemanticQuery { message: String },

    /// HTTP 401.
    #[error("Authentication failed (401): {message}")]
    Auth { message: String },

    /// HTTP 404.
    #[error("Not found (404): {message}")]
    NotFound { message: String },

    /// HTTP 5xx.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-success status.
    #[error("Unexpected HTTP status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// A successful response carrying an `error` object.
    #[error("Query failed: {message}")]
    Remote { message: String },

    /// A successful response that is not a cell set.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The cell set is internally inconsistent.
    #[error("Malformed cell set: {0}")]
    Flatten(#[from] FlattenError),
}

impl QueryError {
    /// HTTP status associated with a remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            QueryError::SemanticQuery { .. } => Some(400),
            QueryError::Auth { .. } => Some(401),
            QueryError::NotFound { .. } => Some(404),
            QueryError::Server { status, .. } | QueryError::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

// =============================================================================
// Orchestrator Errors
// =============================================================================

/// Errors that end a multi-metric run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The configuration lists no metrics.
    #[error("No metrics defined in config")]
    NoMetrics,

    /// An entry's payload failed local validation; no request was sent.
    #[error("Metric entry {index} ({metric}) is invalid: {result}")]
    InvalidEntry {
        index: usize,
        metric: String,
        result: ValidationResult,
    },

    /// An entry failed remotely or while flattening.
    #[error("Metric entry {index} ({label}, id {metric}) failed: {source}")]
    EntryFailed {
        index: usize,
        metric: String,
        label: String,
        #[source]
        source: QueryError,
    },

    /// An entry returned columns that differ from the merged table's.
    #[error(
        "Metric entry {index} ({metric}) returned columns [{got}], merged table has [{want}]",
        got = .found.join(", "),
        want = .expected.join(", ")
    )]
    LayoutMismatch {
        index: usize,
        metric: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors while writing a result table.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for payload loading.
pub type PayloadResult<T> = Result<T, PayloadError>;

/// Result type for flattening.
pub type FlattenResult<T> = Result<T, FlattenError>;

/// Result type for a single query run.
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type for multi-metric runs.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Result type for output writers.
pub type OutputResult<T> = Result<T, OutputError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let transport = TransportError::Timeout;
        let query_err: QueryError = transport.into();
        assert!(query_err.to_string().contains("timed out"));

        let flatten = FlattenError::CoordinateCount {
            cell: 3,
            expected: 2,
            found: 1,
        };
        let query_err: QueryError = flatten.into();
        assert!(query_err.to_string().contains("cell 3"));
    }

    #[test]
    fn test_validation_result_format() {
        let result = ValidationResult {
            errors: vec![
                FieldError::new("query.axes", "at least one axis is required"),
                FieldError::new("query.source", "missing"),
            ],
        };
        assert!(!result.is_ok());
        let msg = QueryError::Validation(result).to_string();
        assert!(msg.contains("2 error(s)"));
        assert!(msg.contains("query.axes: at least one axis is required"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(QueryError::Auth { message: "no".into() }.status(), Some(401));
        assert_eq!(
            QueryError::Server { status: 503, message: "down".into() }.status(),
            Some(503)
        );
        assert_eq!(QueryError::InvalidResponse("x".into()).status(), None);
    }

    #[test]
    fn test_entry_failure_names_metric() {
        let err = OrchestratorError::EntryFailed {
            index: 1,
            metric: "headcount".into(),
            label: "Headcount".into(),
            source: QueryError::NotFound { message: "metric".into() },
        };
        let msg = err.to_string();
        assert!(msg.contains("entry 1"));
        assert!(msg.contains("headcount"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn test_missing_vars_lists_all() {
        let err = ConfigError::MissingVars(vec!["A".into(), "B".into()]);
        assert_eq!(err.to_string(), "Missing required environment variables: A, B");
    }
}
