//! # Engine Error Types
//!
//! Every service operation fails with an [`EngineError`].
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  BEFORE ANY LOCK              UNDER LOCK              AFTER COMMIT      │
//! │  ───────────────              ──────────              ────────────      │
//! │  Validation                   Conflict                ExternalService   │
//! │  (payments, fields)           (lost the race)         (logged only,     │
//! │  Precondition                 Precondition             never returned   │
//! │  (paid, cancelled,            (closed register)        by settle)       │
//! │   fiscal customer)                                                      │
//! │  NotFound                     NotFound                                  │
//! │                                                                         │
//! │  Database: infrastructure failures at any point                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;

use mesa_core::{CoreError, ValidationError};
use mesa_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type.
///
/// `Display` is the human-readable reason shown to the cashier
/// ("Insufficient payment: ...", "Order ... is paid and cannot be settled").
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or mismatched input. Raised before a transaction opens.
    #[error(transparent)]
    Validation(ValidationError),

    /// The entity is in the wrong state for the operation.
    ///
    /// ## When This Occurs
    /// - Order already paid or cancelled (optimistic check)
    /// - Electronic invoice for a customer without fiscal data
    /// - Employee already holds an open register
    /// - Register or sale in a terminal state
    #[error("{0}")]
    Precondition(String),

    /// Lost a race under the row lock: someone else committed first.
    #[error("{0}")]
    Conflict(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Invoice issuer, printer or exporter failure.
    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(DbError),
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        EngineError::Precondition(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict(message.into())
    }

    /// Machine-readable classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Precondition(_) => ErrorKind::Precondition,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::ExternalService(_) => ErrorKind::ExternalService,
            EngineError::Database(_) => ErrorKind::Database,
        }
    }
}

/// Error codes for callers that branch on the failure class.
///
/// Serialized as `VALIDATION`, `PRECONDITION`, `CONFLICT`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Precondition,
    Conflict,
    NotFound,
    ExternalService,
    Database,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::Busy => {
                EngineError::conflict("another transaction holds the lock, try again")
            }
            other => EngineError::Database(other),
        }
    }
}

/// An unknown payment method is reported as a missing entity.
impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::UnknownPaymentMethod { payment_method_id } => {
                EngineError::not_found("Payment method", payment_method_id)
            }
            other => EngineError::Validation(other),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::from(DbError::from(err))
    }
}

/// Business rule violations become preconditions.
impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => EngineError::from(v),
            other => EngineError::Precondition(other.to_string()),
        }
    }
}

impl From<CollaboratorError> for EngineError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Database(db) => EngineError::from(db),
            other => EngineError::ExternalService(other.to_string()),
        }
    }
}

// =============================================================================
// Collaborator Errors
// =============================================================================

/// Failure reported by an external collaborator (invoice issuer, printer,
/// spreadsheet exporter, inventory).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The service could not be reached or timed out.
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    /// The service answered and refused the request.
    #[error("{service} rejected the request: {reason}")]
    Rejected { service: String, reason: String },

    /// Inventory bookkeeping failed inside the caller's transaction.
    #[error(transparent)]
    Database(#[from] DbError),
}

impl CollaboratorError {
    pub fn unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        CollaboratorError::Unavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(service: impl Into<String>, reason: impl Into<String>) -> Self {
        CollaboratorError::Rejected {
            service: service.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mesa_core::Money;

    #[test]
    fn test_db_not_found_keeps_entity() {
        let err = EngineError::from(DbError::not_found("Order", "ord-9"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Order not found: ord-9");
    }

    #[test]
    fn test_db_failures_are_infrastructure() {
        let err = EngineError::from(DbError::duplicate("sales.sale_number", "x"));
        assert_eq!(err.kind(), ErrorKind::Database);

        let err = EngineError::from(DbError::PoolExhausted);
        assert_eq!(err.kind(), ErrorKind::Database);
    }

    #[test]
    fn test_lock_timeout_is_conflict() {
        assert_eq!(EngineError::from(DbError::Busy).kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_core_rule_becomes_precondition() {
        let err = EngineError::from(CoreError::OrderNotSettleable {
            order_id: "ord-1".into(),
            status: "paid".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().contains("paid"));
    }

    #[test]
    fn test_validation_passes_through() {
        let err = EngineError::from(CoreError::Validation(ValidationError::InsufficientPayment {
            total: Money::from_minor(44_500),
            paid: Money::from_minor(44_000),
            missing: Money::from_minor(500),
        }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().starts_with("Insufficient payment"));
    }

    #[test]
    fn test_unknown_payment_method_is_not_found() {
        let err = EngineError::from(ValidationError::UnknownPaymentMethod {
            payment_method_id: "crypto".into(),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Payment method not found: crypto");
    }

    #[test]
    fn test_collaborator_conversion() {
        let err = EngineError::from(CollaboratorError::unavailable("printer", "offline"));
        assert_eq!(err.kind(), ErrorKind::ExternalService);

        let err = EngineError::from(CollaboratorError::Database(DbError::not_found(
            "Product", "p-1",
        )));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::ExternalService).unwrap();
        assert_eq!(json, "\"EXTERNAL_SERVICE\"");
    }
}
