//! Error taxonomy shared by the HTTP surface and the CLI.
//!
//! Every failure that can reach a caller is one of the [`PortalError`]
//! variants. Each variant maps to exactly one HTTP status; the JSON body is
//! always `{ "error": "...", "details": "..." }` with `details` omitted when
//! it would leak information (authentication) or carry nothing useful.

use axum::http::StatusCode;
use thiserror::Error;

use crate::index::IndexError;

/// Result alias used by handlers and services.
pub type PortalResult<T> = std::result::Result<T, PortalError>;

#[derive(Debug, Error)]
pub enum PortalError {
    /// Client-caused input problem: malformed URL, missing field, bad number.
    #[error("{0}")]
    Validation(String),

    /// The index rejected the filter expression.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Missing, invalid or expired credential, or insufficient role.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The search index service or the relational store failed.
    #[error("{message}")]
    Upstream { message: String, details: String },

    /// A bounded wait on an index task ran out.
    #[error("Search index did not respond in time")]
    Timeout(String),
}

impl PortalError {
    pub fn validation(message: impl Into<String>) -> Self {
        PortalError::Validation(message.into())
    }

    pub fn upstream(message: impl Into<String>, details: impl ToString) -> Self {
        PortalError::Upstream {
            message: message.into(),
            details: details.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PortalError::Validation(_) | PortalError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            PortalError::Unauthorized => StatusCode::UNAUTHORIZED,
            PortalError::NotFound(_) => StatusCode::NOT_FOUND,
            PortalError::Conflict(_) => StatusCode::CONFLICT,
            PortalError::Upstream { .. } | PortalError::Timeout(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Operator-facing detail string, if this variant carries one.
    pub fn details(&self) -> Option<&str> {
        match self {
            PortalError::Upstream { details, .. } => Some(details),
            PortalError::Timeout(details) => Some(details),
            _ => None,
        }
    }
}

impl From<IndexError> for PortalError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::IndexNotFound(name) => {
                PortalError::NotFound(format!("Index '{}' not found", name))
            }
            IndexError::IndexAlreadyExists(name) => PortalError::Conflict(format!(
                "Index '{}' already exists. Delete it first to reinitialize.",
                name
            )),
            IndexError::InvalidFilter(msg) => PortalError::InvalidFilter(msg),
            IndexError::InvalidRequest(msg) => PortalError::Validation(msg),
            err @ IndexError::Timeout { .. } => PortalError::Timeout(err.to_string()),
            err @ (IndexError::TaskFailed { .. } | IndexError::Unavailable(_)) => {
                PortalError::upstream("Search service unavailable", err)
            }
        }
    }
}

impl From<sqlx::Error> for PortalError {
    fn from(err: sqlx::Error) -> Self {
        PortalError::upstream("Database unavailable", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PortalError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PortalError::InvalidFilter("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(PortalError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            PortalError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            PortalError::Timeout("slow".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_index_error_mapping() {
        let err: PortalError = IndexError::IndexNotFound("sites".into()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: PortalError = IndexError::InvalidFilter("bad token".into()).into();
        assert!(matches!(err, PortalError::InvalidFilter(_)));

        let err: PortalError = IndexError::Timeout {
            uid: 7,
            waited_ms: 5000,
        }
        .into();
        assert!(matches!(err, PortalError::Timeout(_)));
        assert!(err.details().unwrap().contains("7"));

        let err: PortalError = IndexError::Unavailable("connection refused".into()).into();
        assert_eq!(err.to_string(), "Search service unavailable");
        assert!(err.details().unwrap().contains("connection refused"));
    }

    #[test]
    fn test_unauthorized_has_no_details() {
        assert!(PortalError::Unauthorized.details().is_none());
    }
}
