//! HTTP error types for the VSM server.
//!
//! Maps domain errors from `vsm-core` into HTTP responses. Every error
//! variant produces a JSON body with a machine-readable `error` field and a
//! human-readable `message`; messages never carry secret material because
//! the core's error types never do.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use vsm_core::error::{AuthzDenied, DataStoreError, NamespaceError, SecretError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid input.
    BadRequest(String),
    /// Missing or unknown credentials.
    Unauthenticated(String),
    /// The authorization manager denied the operation.
    Forbidden(String),
    /// Requested resource not found.
    NotFound(String),
    /// Duplicate path or id, or a namespace that still has children.
    Conflict(String),
    /// Internal server error.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<SecretError> for AppError {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::InputValidation { .. } | SecretError::UnknownType { .. } => {
                Self::BadRequest(err.to_string())
            }
            SecretError::Unauthorized(_) => Self::Forbidden(err.to_string()),
            SecretError::Store(DataStoreError::NotFound { .. }) => Self::NotFound(err.to_string()),
            SecretError::Store(DataStoreError::AlreadyExists { .. })
            | SecretError::AlreadyRegistered { .. } => Self::Conflict(err.to_string()),
            SecretError::Store(DataStoreError::Backend { .. })
            | SecretError::ConfigMissing { .. }
            | SecretError::Canceled
            | SecretError::Crypto(_)
            | SecretError::Vks(_)
            | SecretError::Internal { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<NamespaceError> for AppError {
    fn from(err: NamespaceError) -> Self {
        match err {
            NamespaceError::InvalidPath { .. } => Self::BadRequest(err.to_string()),
            NamespaceError::AlreadyExists { .. } | NamespaceError::HasChildren { .. } => {
                Self::Conflict(err.to_string())
            }
            NamespaceError::NotFound { .. } | NamespaceError::ParentNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            NamespaceError::Store(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<AuthzDenied> for AppError {
    fn from(err: AuthzDenied) -> Self {
        Self::Forbidden(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use vsm_core::error::VksError;
    use vsm_core::model::Operation;

    use super::*;

    #[test]
    fn input_validation_maps_to_bad_request() {
        let err = AppError::from(SecretError::InputValidation {
            reason: "missing field".to_owned(),
        });
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn authz_denial_maps_to_forbidden() {
        let err = AppError::from(SecretError::Unauthorized(AuthzDenied {
            operation: Operation::Read,
            path: "secrets".to_owned(),
        }));
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn missing_entry_maps_to_not_found() {
        let err = AppError::from(SecretError::Store(DataStoreError::NotFound {
            path: "secrets/x".to_owned(),
        }));
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn duplicate_entry_maps_to_conflict() {
        let err = AppError::from(SecretError::Store(DataStoreError::AlreadyExists {
            path: "secrets/x".to_owned(),
        }));
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn vks_failures_map_to_internal() {
        let err = AppError::from(SecretError::Vks(VksError::Unavailable {
            path: "secrets/x".to_owned(),
            available: 1,
            required: 2,
        }));
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn namespace_children_map_to_conflict() {
        let err = AppError::from(NamespaceError::HasChildren {
            path: "/".to_owned(),
        });
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn namespace_missing_parent_maps_to_not_found() {
        let err = AppError::from(NamespaceError::ParentNotFound {
            parent: "/".to_owned(),
        });
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
