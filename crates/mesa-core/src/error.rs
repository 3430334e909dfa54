//! # Error Types
//!
//! Domain-specific error types for mesa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mesa-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations (state, fiscal data)  │
//! │  └── ValidationError  - Malformed or mismatched input                  │
//! │                                                                         │
//! │  mesa-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  mesa-engine errors                                                    │
//! │  └── EngineError      - What callers see (validation / precondition /  │
//! │                         conflict / not found / external service)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule violations.
///
/// These are raised by the pure state checks on domain types and translated
/// to precondition failures by the engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Order is already paid or cancelled.
    ///
    /// ## When This Occurs
    /// - A second settlement attempt after the first one committed
    /// - Trying to charge a ticket the kitchen cancelled
    #[error("Order {order_id} is {status} and cannot be settled")]
    OrderNotSettleable { order_id: String, status: String },

    /// Sale status cannot move in the requested direction.
    #[error("Sale {sale_id} is already {status}")]
    InvalidSaleTransition { sale_id: String, status: String },

    /// Cash register session is closed.
    #[error("Cash register {register_id} is closed")]
    RegisterClosed { register_id: String },

    /// Electronic invoice requested for a customer without fiscal data.
    #[error("Electronic invoice requires the customer {field}")]
    FiscalCustomerIncomplete { field: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any lock is taken or transaction is opened.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Settlement attempted without any tender line.
    #[error("At least one payment is required")]
    NoPayments,

    /// A tender line carries a zero or negative amount.
    #[error("Payment #{index} ({payment_method_id}) must be positive, got {amount}")]
    NonPositivePayment {
        index: usize,
        payment_method_id: String,
        amount: Money,
    },

    /// Payment method id does not exist.
    #[error("Payment method not found: {payment_method_id}")]
    UnknownPaymentMethod { payment_method_id: String },

    /// Payment method exists but has been deactivated.
    #[error("Payment method '{name}' is inactive")]
    InactivePaymentMethod {
        payment_method_id: String,
        name: String,
    },

    /// Tendered amounts do not cover the sale total.
    #[error("Insufficient payment: total {total}, paid {paid}, missing {missing}")]
    InsufficientPayment {
        total: Money,
        paid: Money,
        missing: Money,
    },

    /// Tendered amounts add up to more than a money amount can hold.
    #[error("Payment amounts are too large to add up")]
    AmountOverflow,

    /// Tendered amounts exceed the sale total (change is handled outside).
    #[error("Payments exceed the total: total {total}, paid {paid}, excess {excess}")]
    Overpayment {
        total: Money,
        paid: Money,
        excess: Money,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::OrderNotSettleable {
            order_id: "ord-1".to_string(),
            status: "paid".to_string(),
        };
        assert_eq!(err.to_string(), "Order ord-1 is paid and cannot be settled");
    }

    #[test]
    fn test_payment_mismatch_messages() {
        let err = ValidationError::InsufficientPayment {
            total: Money::from_minor(44_500),
            paid: Money::from_minor(44_000),
            missing: Money::from_minor(500),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient payment: total $44,500, paid $44,000, missing $500"
        );

        let err = ValidationError::InactivePaymentMethod {
            payment_method_id: "pm-1".to_string(),
            name: "Voucher".to_string(),
        };
        assert_eq!(err.to_string(), "Payment method 'Voucher' is inactive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::NoPayments.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
