//! Error taxonomy for the routing and execution engine.
//!
//! Every surfaced error carries a machine-readable [`ErrorCode`] and maps to
//! an HTTP status. Errors are rendered as the `error` slot of an API response.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable error codes exposed in response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConfigValidationError,
    RouteNotFound,
    MissingParameter,
    InvalidPagination,
    Unauthorized,
    QueryExecutionError,
    CountDerivationError,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::RouteNotFound => StatusCode::NOT_FOUND,
            ErrorCode::MissingParameter | ErrorCode::InvalidPagination => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ConfigValidationError
            | ErrorCode::QueryExecutionError
            | ErrorCode::CountDerivationError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigValidationError => "CONFIG_VALIDATION_ERROR",
            ErrorCode::RouteNotFound => "ROUTE_NOT_FOUND",
            ErrorCode::MissingParameter => "MISSING_PARAMETER",
            ErrorCode::InvalidPagination => "INVALID_PAGINATION",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::QueryExecutionError => "QUERY_EXECUTION_ERROR",
            ErrorCode::CountDerivationError => "COUNT_DERIVATION_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A route definition failed validation. Fatal at startup.
    #[error("configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("invalid pagination parameters: {0}")]
    PaginationInvalid(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Driver-level failure running the primary statement.
    #[error("query execution failed: {message}")]
    QueryExecution {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The count statement could not be derived. Never surfaced to clients.
    #[error("cannot derive count query: {0}")]
    CountDerivation(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::ConfigValidation(_) => ErrorCode::ConfigValidationError,
            EngineError::RouteNotFound { .. } => ErrorCode::RouteNotFound,
            EngineError::MissingParameter(_) => ErrorCode::MissingParameter,
            EngineError::PaginationInvalid(_) => ErrorCode::InvalidPagination,
            EngineError::Unauthorized(_) => ErrorCode::Unauthorized,
            EngineError::QueryExecution { .. } => ErrorCode::QueryExecutionError,
            EngineError::CountDerivation(_) => ErrorCode::CountDerivationError,
            EngineError::Unavailable(_) => ErrorCode::ServiceUnavailable,
            EngineError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code().status_code()
    }

    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::ConfigValidation(msg.into())
    }

    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            EngineError::QueryExecution { details, .. } => details.as_ref(),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = EngineError::RouteNotFound {
            method: "GET".into(),
            path: "/nope".into(),
        };
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            EngineError::MissingParameter("id".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::PaginationInvalid("page".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::Unauthorized("no key".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            EngineError::Unavailable("db down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let exec = EngineError::QueryExecution {
            message: "boom".into(),
            details: None,
        };
        assert_eq!(exec.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::MissingParameter).unwrap();
        assert_eq!(json, "\"MISSING_PARAMETER\"");
        assert_eq!(ErrorCode::RouteNotFound.to_string(), "ROUTE_NOT_FOUND");
    }

    #[test]
    fn test_query_execution_keeps_original_message() {
        let err = EngineError::QueryExecution {
            message: "relation \"users\" does not exist".into(),
            details: None,
        };
        assert!(err.to_string().contains("relation \"users\" does not exist"));
    }
}
