//! Error types
//!
//! One error enum for the whole library. Not-found and operation-not-done are
//! distinguished outcomes that the reconcile driver and retry loops inspect
//! through [`Error::is_not_found`] and [`Error::is_retryable`].

use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required field is missing or a mutually exclusive group has more
    /// than one member set. Raised before any network call.
    #[error("invalid resource at {path}: {reason}")]
    Validation { path: String, reason: String },

    #[error("schema error: {0}")]
    Schema(String),

    /// A value's runtime shape contradicts the schema.
    #[error("value at {path} does not match the schema, expected {expected}")]
    Shape { path: String, expected: String },

    /// An engine-internal contract was violated.
    #[error("programming error: {0}")]
    Programming(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("{method} {url} failed with status {status}: {message}")]
    Http {
        status: u16,
        method: String,
        url: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation {0} is not done")]
    OperationNotDone(String),

    #[error("operation {name} failed with code {code}: {message}")]
    OperationFailed {
        name: String,
        code: i32,
        message: String,
    },

    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    #[error("resource {0} still exists after delete")]
    NotDeleted(String),

    #[error("change to {field} requires recreating the resource, which is not allowed")]
    RecreateBlocked { field: String },

    /// Failure while executing an operation group, naming the first field
    /// that triggered it.
    #[error("{operation} failed for change to {field}")]
    Operation {
        operation: String,
        field: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{} deletion(s) failed:\n{}", errors.len(), errors.join("\n"))]
    DeleteAll { errors: Vec<String> },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Http { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// Transient failures: throttling, server errors, connection problems and
    /// long-running operations that have not reached a terminal state.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Transport(_) | Self::OperationNotDone(_) => true,
            _ => false,
        }
    }

    /// An operation or deletion that has not settled yet; the only error
    /// operation polling waits out.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::OperationNotDone(_))
    }

    /// Attach the operation name and triggering field to an execution error.
    pub fn in_operation(self, operation: &str, field: &str) -> Self {
        Self::Operation {
            operation: operation.to_string(),
            field: field.to_string(),
            source: Box::new(self),
        }
    }

    pub(crate) fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(path: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::Shape {
            path: path.into(),
            expected: expected.into(),
        }
    }
}

/// Walk the full error chain and join all causes into one string.
pub fn format_err_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_from_http_status() {
        let err = Error::Http {
            status: 404,
            method: "GET".into(),
            url: "https://example.test/x".into(),
            message: "missing".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [429u16, 500, 502, 503, 504] {
            let err = Error::Http {
                status,
                method: "POST".into(),
                url: "u".into(),
                message: String::new(),
            };
            assert!(err.is_retryable(), "{status} should be retryable");
        }
        assert!(Error::OperationNotDone("op".into()).is_retryable());
        assert!(!Error::NotDeleted("x".into()).is_retryable());
    }

    #[test]
    fn test_err_chain_includes_operation_source() {
        let err = Error::NotFound("pipe".into()).in_operation("updateDeliveryPipeline", "Suspended");
        let msg = format_err_chain(&err);
        assert_eq!(
            msg,
            "updateDeliveryPipeline failed for change to Suspended: resource not found: pipe"
        );
    }

    #[test]
    fn test_delete_all_joins_errors() {
        let err = Error::DeleteAll {
            errors: vec!["a failed".into(), "b failed".into()],
        };
        assert_eq!(err.to_string(), "2 deletion(s) failed:\na failed\nb failed");
    }
}
