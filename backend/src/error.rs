//! Error types for mediator operations
//!
//! Three layers:
//! - [`ValidationError`] - caller input rejected before any backend call
//! - [`BackendError`] - failures reported by the persistence backend
//! - [`MediatorError`] - what a caller of [`crate::mediator::Mediator`] sees

use thiserror::Error;

use crate::schema::SchemaError;

/// Caller input rejected against an entity descriptor. Never retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid filter on {field} ({operator}): {reason}")]
    InvalidFilter {
        field: String,
        operator: String,
        reason: String,
    },

    #[error("Type mismatch for {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Required field missing: {field}")]
    MissingRequiredField { field: String },

    #[error("Incomplete identity for {entity}: {reason}")]
    IdentityIncomplete { entity: String, reason: String },

    #[error("Invalid pagination: {reason}")]
    InvalidPagination { reason: String },

    #[error("Unknown field {field} on {entity}")]
    UnknownField { entity: String, field: String },

    #[error("Update on {entity} changes no fields")]
    EmptyUpdate { entity: String },

    #[error("Invalid {operation} on {field}: {reason}")]
    InvalidFieldOperation {
        field: String,
        operation: String,
        reason: String,
    },

    #[error("Invalid orderBy on {field}: {reason}")]
    InvalidOrderBy { field: String, reason: String },

    #[error("Invalid aggregate {selector} on {field}: {reason}")]
    InvalidAggregate {
        selector: String,
        field: String,
        reason: String,
    },

    #[error("Invalid arguments: {reason}")]
    InvalidArguments { reason: String },
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::InvalidFilter { .. } => "InvalidFilter",
            ValidationError::TypeMismatch { .. } => "TypeMismatch",
            ValidationError::MissingRequiredField { .. } => "MissingRequiredField",
            ValidationError::IdentityIncomplete { .. } => "IdentityIncomplete",
            ValidationError::InvalidPagination { .. } => "InvalidPagination",
            ValidationError::UnknownField { .. } => "UnknownField",
            ValidationError::EmptyUpdate { .. } => "EmptyUpdate",
            ValidationError::InvalidFieldOperation { .. } => "InvalidFieldOperation",
            ValidationError::InvalidOrderBy { .. } => "InvalidOrderBy",
            ValidationError::InvalidAggregate { .. } => "InvalidAggregate",
            ValidationError::InvalidArguments { .. } => "InvalidArguments",
        }
    }

    pub(crate) fn arguments(reason: impl Into<String>) -> Self {
        ValidationError::InvalidArguments {
            reason: reason.into(),
        }
    }

    pub(crate) fn pagination(reason: impl Into<String>) -> Self {
        ValidationError::InvalidPagination {
            reason: reason.into(),
        }
    }
}

/// Failures reported by a [`crate::backend::Backend`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Unique constraint violated on {field}")]
    UniqueConstraintViolation { field: String },

    #[error("Record not found in {entity}")]
    RecordNotFound { entity: String },

    #[error("Backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Backend query failed: {reason}")]
    Query { reason: String },
}

impl BackendError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        BackendError::RecordNotFound {
            entity: entity.into(),
        }
    }

    pub fn query(reason: impl Into<String>) -> Self {
        BackendError::Query {
            reason: reason.into(),
        }
    }
}

/// Error returned by the mediator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediatorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Unknown entity: {entity}")]
    UnknownEntity { entity: String },

    #[error("Operation cancelled before dispatch")]
    Cancelled,

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl MediatorError {
    /// Flat name of the failure, stable across layers
    pub fn kind(&self) -> &'static str {
        match self {
            MediatorError::Validation(e) => e.kind(),
            MediatorError::Backend(BackendError::UniqueConstraintViolation { .. }) => {
                "UniqueConstraintViolation"
            }
            MediatorError::Backend(BackendError::RecordNotFound { .. }) => "RecordNotFound",
            MediatorError::Backend(BackendError::Unavailable { .. }) => "BackendUnavailable",
            MediatorError::Backend(BackendError::Query { .. }) => "BackendQuery",
            MediatorError::UnknownEntity { .. } => "UnknownEntity",
            MediatorError::Cancelled => "Cancelled",
            MediatorError::Internal { .. } => "Internal",
        }
    }

    /// Only an unavailable backend is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, MediatorError::Backend(BackendError::Unavailable { .. }))
    }
}

impl From<SchemaError> for MediatorError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::NotFound { entity } => MediatorError::UnknownEntity { entity },
            other => MediatorError::Internal {
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T, E = MediatorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_flat() {
        let err = MediatorError::from(ValidationError::TypeMismatch {
            field: "Readonly".into(),
            expected: "int".into(),
            actual: "string".into(),
        });
        assert_eq!(err.kind(), "TypeMismatch");
        assert!(!err.is_retryable());

        let err = MediatorError::from(BackendError::Unavailable {
            reason: "pool closed".into(),
        });
        assert_eq!(err.kind(), "BackendUnavailable");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_schema_not_found_maps_to_unknown_entity() {
        let err = MediatorError::from(SchemaError::NotFound {
            entity: "Cameras".into(),
        });
        assert_eq!(
            err,
            MediatorError::UnknownEntity {
                entity: "Cameras".into()
            }
        );
    }

    #[test]
    fn test_messages() {
        let err = ValidationError::MissingRequiredField {
            field: "Value".into(),
        };
        assert_eq!(err.to_string(), "Required field missing: Value");
    }
}
