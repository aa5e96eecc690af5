//! The emulator-wide error taxonomy.
//!
//! The propagation policy is uniform across services: a *missing*
//! resource is an expected cheap path and travels as `Ok(None)` /
//! `NotFound` outcomes, never as a panic; a *corrupted* resource is an
//! error that aborts the current operation with a 500 and nothing
//! else; an uncaught error crossing the endpoint boundary reaches the
//! wire as a generic envelope carrying only its message — never a
//! stack trace.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use nimbus_resource::{ConversionError, IdError};
use nimbus_store::StoreError;

/// Errors crossing control-plane and endpoint boundaries.
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// A resource or one of its ancestor scopes does not exist.
    #[error("{message}")]
    NotFound {
        /// Human-readable description.
        message: String,
    },

    /// Strict create against an id that already exists.
    #[error("{message}")]
    Conflict {
        /// Human-readable description.
        message: String,
    },

    /// Malformed or missing required request fields.
    #[error("{message}")]
    Validation {
        /// Human-readable description.
        message: String,
    },

    /// A stored document exists but cannot be parsed. Fatal to the
    /// current operation only.
    #[error("{message}")]
    StorageCorruption {
        /// Human-readable description.
        message: String,
    },

    /// No endpoint template matched the request.
    #[error("no endpoint registered for {message}")]
    Routing {
        /// The unmatched `(method, path)` description.
        message: String,
    },

    /// Anything else escaping a handler.
    #[error("{message}")]
    Unhandled {
        /// The underlying error's message.
        message: String,
    },
}

impl EmulatorError {
    /// A [`Self::NotFound`] with the given message.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// A [`Self::Conflict`] with the given message.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// A [`Self::Validation`] with the given message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// A [`Self::Unhandled`] with the given message.
    #[must_use]
    pub fn unhandled(message: impl Into<String>) -> Self {
        Self::Unhandled {
            message: message.into(),
        }
    }

    /// The stable error code written into the response envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "ResourceNotFound",
            Self::Conflict { .. } => "Conflict",
            Self::Validation { .. } => "ValidationError",
            Self::StorageCorruption { .. } => "StorageCorruption",
            Self::Routing { .. } => "EndpointNotFound",
            Self::Unhandled { .. } => "InternalError",
        }
    }

    /// The HTTP status this error renders as.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::Routing { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::StorageCorruption { .. } | Self::Unhandled { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Builds the `{error:{code,message}}` wire envelope.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorBody {
                code: self.code().to_owned(),
                message: self.to_string(),
            },
        }
    }
}

impl From<StoreError> for EmulatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists { id } => Self::Conflict {
                message: format!("resource '{id}' already exists"),
            },
            StoreError::Corrupt { .. } => Self::StorageCorruption {
                message: err.to_string(),
            },
            StoreError::InvalidSegment { .. } => Self::Validation {
                message: err.to_string(),
            },
            // Io, Serialize and UndeclaredSubresource are emulator
            // bugs or host failures, not client conditions.
            other => Self::Unhandled {
                message: other.to_string(),
            },
        }
    }
}

impl From<IdError> for EmulatorError {
    fn from(err: IdError) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}

impl From<ConversionError> for EmulatorError {
    fn from(err: ConversionError) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}

/// The `{error:{code,message}}` JSON envelope returned by every HTTP
/// endpoint on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error payload.
    pub error: ErrorBody,
}

/// Code and message inside an [`ErrorEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message. Never a stack trace.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(EmulatorError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(EmulatorError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(EmulatorError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            EmulatorError::unhandled("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            EmulatorError::Routing { message: "GET /x".into() }.status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = EmulatorError::validation("location is required").to_envelope();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"]["code"], "ValidationError");
        assert_eq!(json["error"]["message"], "location is required");
    }

    #[test]
    fn test_store_error_conversion() {
        let err: EmulatorError = StoreError::AlreadyExists { id: "rg1".into() }.into();
        assert!(matches!(err, EmulatorError::Conflict { .. }));

        let err: EmulatorError = StoreError::InvalidSegment { segment: "..".into() }.into();
        assert!(matches!(err, EmulatorError::Validation { .. }));

        let err: EmulatorError = StoreError::UndeclaredSubresource {
            service: "eventhub".into(),
            kind: "topics".into(),
        }
        .into();
        assert!(matches!(err, EmulatorError::Unhandled { .. }));
    }
}
