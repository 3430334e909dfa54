//! # Validation Module
//!
//! Input validation for Mesa POS, including the payment validator that
//! guards settlement.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request types (serde)                                        │
//! │  └── Shape of the input                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Amounts positive                                                  │
//! │  ├── Payment methods known and active                                  │
//! │  └── Σ payments ≈ total (±1 minor unit)                                │
//! │           │            ← runs BEFORE the order lock is taken           │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE / FOREIGN KEY constraints                       │
//! │  └── One open register per employee (partial unique index)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{CustomerInput, PaymentMethod, ProposedPayment};
use crate::PAYMENT_TOLERANCE;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length for free-text notes, reasons and references.
pub const MAX_TEXT_LEN: usize = 500;

// =============================================================================
// Payment Validator
// =============================================================================

/// Validates a proposed payment set against a sale total.
///
/// ## Rules
/// 1. At least one tender line
/// 2. Every amount strictly positive
/// 3. Every payment method exists in `methods` and is active
/// 4. `|Σ amounts − total| ≤ PAYMENT_TOLERANCE` (one minor unit)
///
/// The first violation wins; errors name the offending line or the
/// mismatch magnitude.
///
/// ## Example
/// ```rust
/// use std::collections::HashMap;
/// use mesa_core::{Money, PaymentKind, PaymentMethod, ProposedPayment};
/// use mesa_core::validation::validate_payments;
///
/// let cash = PaymentMethod {
///     id: "cash".into(),
///     name: "Cash".into(),
///     kind: PaymentKind::Cash,
///     is_active: true,
/// };
/// let methods = HashMap::from([(cash.id.clone(), cash)]);
///
/// let total = Money::from_minor(44_500);
/// let exact = [ProposedPayment::new("cash", Money::from_minor(44_500))];
/// let short = [ProposedPayment::new("cash", Money::from_minor(44_000))];
///
/// assert!(validate_payments(total, &exact, &methods).is_ok());
/// assert!(validate_payments(total, &short, &methods).is_err());
/// ```
pub fn validate_payments(
    total: Money,
    payments: &[ProposedPayment],
    methods: &HashMap<String, PaymentMethod>,
) -> ValidationResult<()> {
    if payments.is_empty() {
        return Err(ValidationError::NoPayments);
    }

    for (index, payment) in payments.iter().enumerate() {
        if !payment.amount.is_positive() {
            return Err(ValidationError::NonPositivePayment {
                index,
                payment_method_id: payment.payment_method_id.clone(),
                amount: payment.amount,
            });
        }

        let method = methods.get(&payment.payment_method_id).ok_or_else(|| {
            ValidationError::UnknownPaymentMethod {
                payment_method_id: payment.payment_method_id.clone(),
            }
        })?;

        if !method.is_active {
            return Err(ValidationError::InactivePaymentMethod {
                payment_method_id: method.id.clone(),
                name: method.name.clone(),
            });
        }

        if let Some(reference) = &payment.reference {
            validate_text("payment reference", reference)?;
        }
    }

    let paid = payments
        .iter()
        .try_fold(Money::zero(), |acc, p| acc.checked_add(p.amount))
        .ok_or(ValidationError::AmountOverflow)?;

    if paid.within(total, PAYMENT_TOLERANCE) {
        return Ok(());
    }

    if paid < total {
        Err(ValidationError::InsufficientPayment {
            total,
            paid,
            missing: total - paid,
        })
    } else {
        Err(ValidationError::Overpayment {
            total,
            paid,
            excess: paid - total,
        })
    }
}

// =============================================================================
// Amount Validators
// =============================================================================

/// Validates an amount that must be strictly positive (refunds, deposits,
/// withdrawals).
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an amount that may be zero but not negative (opening float,
/// counted cash).
pub fn validate_non_negative_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not be negative".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required identifier.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates optional free text (notes, reasons, references).
pub fn validate_text(field: &str, value: &str) -> ValidationResult<()> {
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LEN,
        });
    }
    Ok(())
}

/// Validates customer data supplied with a settlement.
///
/// ## Rules
/// - Identification number: required, digits/letters/hyphens only, ≤ 20
/// - Name: required, ≤ 200
/// - Email: if present, must contain `@`
pub fn validate_customer_input(input: &CustomerInput) -> ValidationResult<()> {
    let id = input.identification_number.trim();
    validate_required("identification number", id)?;

    if id.len() > 20 {
        return Err(ValidationError::TooLong {
            field: "identification number".to_string(),
            max: 20,
        });
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "identification number".to_string(),
            reason: "must contain only letters, digits and hyphens".to_string(),
        });
    }

    validate_required("customer name", &input.name)?;
    if input.name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "customer name".to_string(),
            max: 200,
        });
    }

    if let Some(email) = input.email.as_deref().filter(|e| !e.trim().is_empty()) {
        if !email.contains('@') {
            return Err(ValidationError::InvalidFormat {
                field: "email".to_string(),
                reason: "must be a valid email address".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentKind;

    fn methods() -> HashMap<String, PaymentMethod> {
        let cash = PaymentMethod {
            id: "cash".to_string(),
            name: "Cash".to_string(),
            kind: PaymentKind::Cash,
            is_active: true,
        };
        let card = PaymentMethod {
            id: "card".to_string(),
            name: "Card".to_string(),
            kind: PaymentKind::Card,
            is_active: true,
        };
        let voucher = PaymentMethod {
            id: "voucher".to_string(),
            name: "Voucher".to_string(),
            kind: PaymentKind::Other,
            is_active: false,
        };
        [cash, card, voucher]
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect()
    }

    fn pay(method: &str, amount: i64) -> ProposedPayment {
        ProposedPayment::new(method, Money::from_minor(amount))
    }

    #[test]
    fn test_exact_payment_passes() {
        let total = Money::from_minor(44_500);
        assert!(validate_payments(total, &[pay("cash", 44_500)], &methods()).is_ok());
    }

    #[test]
    fn test_split_tender_passes() {
        let total = Money::from_minor(44_500);
        let payments = [pay("cash", 20_000), pay("card", 24_500)];
        assert!(validate_payments(total, &payments, &methods()).is_ok());
    }

    #[test]
    fn test_one_unit_tolerance() {
        let total = Money::from_minor(44_500);
        assert!(validate_payments(total, &[pay("cash", 44_499)], &methods()).is_ok());
        assert!(validate_payments(total, &[pay("cash", 44_501)], &methods()).is_ok());
        assert!(validate_payments(total, &[pay("cash", 44_498)], &methods()).is_err());
        assert!(validate_payments(total, &[pay("cash", 44_502)], &methods()).is_err());
    }

    #[test]
    fn test_insufficient_payment_reports_magnitude() {
        let total = Money::from_minor(44_500);
        let err = validate_payments(total, &[pay("cash", 44_000)], &methods()).unwrap_err();
        match err {
            ValidationError::InsufficientPayment { missing, .. } => {
                assert_eq!(missing, Money::from_minor(500));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_overpayment_rejected() {
        let total = Money::from_minor(44_500);
        let err = validate_payments(total, &[pay("cash", 50_000)], &methods()).unwrap_err();
        assert!(matches!(err, ValidationError::Overpayment { .. }));
    }

    #[test]
    fn test_huge_amounts_rejected_without_wrapping() {
        let total = Money::from_minor(44_500);
        let payments = [
            pay("cash", i64::MAX),
            pay("cash", i64::MAX),
            pay("cash", 44_502),
        ];
        let err = validate_payments(total, &payments, &methods()).unwrap_err();
        assert!(matches!(err, ValidationError::AmountOverflow));

        let err = validate_payments(total, &[pay("cash", i64::MAX)], &methods()).unwrap_err();
        assert!(matches!(err, ValidationError::Overpayment { .. }));
    }

    #[test]
    fn test_non_positive_amount_identifies_line() {
        let total = Money::from_minor(10_000);
        let payments = [pay("cash", 10_000), pay("card", 0)];
        let err = validate_payments(total, &payments, &methods()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NonPositivePayment { index: 1, .. }
        ));
    }

    #[test]
    fn test_unknown_and_inactive_methods() {
        let total = Money::from_minor(10_000);
        let err = validate_payments(total, &[pay("bitcoin", 10_000)], &methods()).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownPaymentMethod { .. }));

        let err = validate_payments(total, &[pay("voucher", 10_000)], &methods()).unwrap_err();
        assert!(matches!(err, ValidationError::InactivePaymentMethod { .. }));
    }

    #[test]
    fn test_empty_payment_set() {
        let err = validate_payments(Money::from_minor(1), &[], &methods()).unwrap_err();
        assert!(matches!(err, ValidationError::NoPayments));
    }

    #[test]
    fn test_customer_input() {
        let mut input = CustomerInput {
            identification_number: "900123456-7".to_string(),
            name: "Acme SAS".to_string(),
            email: Some("billing@acme.test".to_string()),
            phone: None,
        };
        assert!(validate_customer_input(&input).is_ok());

        input.email = Some("not-an-email".to_string());
        assert!(validate_customer_input(&input).is_err());

        input.email = None;
        input.identification_number = "90 12".to_string();
        assert!(validate_customer_input(&input).is_err());

        input.identification_number = String::new();
        assert!(validate_customer_input(&input).is_err());
    }

    #[test]
    fn test_amount_validators() {
        assert!(validate_positive_amount("amount", Money::from_minor(1)).is_ok());
        assert!(validate_positive_amount("amount", Money::zero()).is_err());
        assert!(validate_non_negative_amount("opening", Money::zero()).is_ok());
        assert!(validate_non_negative_amount("opening", Money::from_minor(-1)).is_err());
    }

    #[test]
    fn test_text_length() {
        assert!(validate_text("notes", "short").is_ok());
        assert!(validate_text("notes", &"x".repeat(MAX_TEXT_LEN + 1)).is_err());
    }
}
