//! # Reconciliation Module
//!
//! Expected-cash math and report construction for cash-drawer sessions.
//!
//! ## Expected Cash
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   expected =   opening float                                            │
//! │              + Σ deposits        (excluding the OPENING movement)       │
//! │              − Σ withdrawals                                            │
//! │              + Σ cash-tender payments on sales placed in the register   │
//! │                                                                         │
//! │   difference = counted − expected                                       │
//! │     < 0  → Shortfall                                                    │
//! │     > 0  → Overage                                                      │
//! │     = 0  → Balanced                                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sales never appear as cash movements. Cash sales are counted by joining
//! payments to the register, so the two ledgers never double count.
//!
//! The aggregation queries live in mesa-db; this module only does the math
//! on the aggregated [`RegisterLedger`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;
use crate::types::{CashRegister, CashRegisterReport, PaymentKind};

// =============================================================================
// Ledger Aggregate
// =============================================================================

/// Tender totals for one payment kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TenderTally {
    pub kind: PaymentKind,
    pub amount: Money,
    /// Number of payment lines of this kind.
    pub count: i64,
}

/// Aggregated view of everything that happened in a register session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterLedger {
    pub opening_amount: Money,
    /// Manual deposits, the opening float excluded.
    pub deposits_total: Money,
    /// Manual withdrawals, as a positive magnitude.
    pub withdrawals_total: Money,
    /// Refund movements, as a positive magnitude.
    pub refunds_total: Money,
    pub refunds_count: i64,
    /// Cash-tender payments of every sale placed in the register.
    pub cash_tendered: Money,
    /// Totals of the non-refunded sales in the register.
    pub sales_total: Money,
    pub sales_count: i64,
    pub discounts_total: Money,
    pub tax_total: Money,
    /// Tender breakdown of the non-refunded sales.
    pub tenders: Vec<TenderTally>,
}

impl RegisterLedger {
    /// The cash the drawer should hold right now.
    ///
    /// ## Example
    /// ```rust
    /// use mesa_core::{Money, RegisterLedger};
    ///
    /// let ledger = RegisterLedger {
    ///     opening_amount: Money::from_minor(100_000),
    ///     cash_tendered: Money::from_minor(25_000),
    ///     deposits_total: Money::from_minor(5_000),
    ///     withdrawals_total: Money::from_minor(3_000),
    ///     ..Default::default()
    /// };
    /// assert_eq!(ledger.expected_cash(), Money::from_minor(127_000));
    /// ```
    pub fn expected_cash(&self) -> Money {
        self.opening_amount + self.deposits_total - self.withdrawals_total + self.cash_tendered
    }

    /// Totals and line count for one tender kind.
    pub fn tender(&self, kind: PaymentKind) -> (Money, i64) {
        self.tenders
            .iter()
            .filter(|t| t.kind == kind)
            .fold((Money::zero(), 0), |(amount, count), t| {
                (amount + t.amount, count + t.count)
            })
    }
}

// =============================================================================
// Reconciliation Outcome
// =============================================================================

/// Label for the signed drawer difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Less cash counted than expected.
    Shortfall,
    /// More cash counted than expected.
    Overage,
    Balanced,
}

impl ReconciliationOutcome {
    pub fn from_difference(difference: Money) -> Self {
        if difference.is_negative() {
            ReconciliationOutcome::Shortfall
        } else if difference.is_positive() {
            ReconciliationOutcome::Overage
        } else {
            ReconciliationOutcome::Balanced
        }
    }
}

impl fmt::Display for ReconciliationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReconciliationOutcome::Shortfall => "shortfall",
            ReconciliationOutcome::Overage => "overage",
            ReconciliationOutcome::Balanced => "exact match",
        };
        f.write_str(label)
    }
}

impl CashRegisterReport {
    pub fn outcome(&self) -> ReconciliationOutcome {
        ReconciliationOutcome::from_difference(self.difference)
    }
}

// =============================================================================
// Report Builder
// =============================================================================

/// Builds a report for `register` from its aggregated ledger.
///
/// `counted` is the cash counted at close. For a preview of an open
/// register pass `None`: the closing amount is reported as the expected
/// amount and the difference is zero.
pub fn build_report(
    id: String,
    register: &CashRegister,
    ledger: &RegisterLedger,
    counted: Option<Money>,
    generated_by: &str,
    now: DateTime<Utc>,
) -> CashRegisterReport {
    let expected = ledger.expected_cash();
    let closing = counted.unwrap_or(expected);

    let (cash_sales, cash_count) = ledger.tender(PaymentKind::Cash);
    let (card_sales, card_count) = ledger.tender(PaymentKind::Card);
    let (digital_sales, digital_count) = ledger.tender(PaymentKind::Digital);
    let (other_sales, other_count) = ledger.tender(PaymentKind::Other);

    CashRegisterReport {
        id,
        cash_register_id: register.id.clone(),
        opening_amount: ledger.opening_amount,
        closing_amount: closing,
        expected_amount: expected,
        difference: closing - expected,
        total_sales: ledger.sales_total,
        sales_count: ledger.sales_count,
        cash_sales,
        cash_count,
        card_sales,
        card_count,
        digital_sales,
        digital_count,
        other_sales,
        other_count,
        refunds_count: ledger.refunds_count,
        refunds_total: ledger.refunds_total,
        discounts_total: ledger.discounts_total,
        tax_total: ledger.tax_total,
        deposits_total: ledger.deposits_total,
        withdrawals_total: ledger.withdrawals_total,
        generated_by: generated_by.to_string(),
        created_at: now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CashRegisterStatus;

    fn register() -> CashRegister {
        let now = Utc::now();
        CashRegister {
            id: "reg-1".to_string(),
            employee_id: "emp-1".to_string(),
            opening_amount: Money::from_minor(100_000),
            status: CashRegisterStatus::Open,
            opened_at: now,
            closed_at: None,
            closing_amount: None,
            expected_amount: None,
            difference: None,
            notes: None,
            updated_at: now,
        }
    }

    fn ledger() -> RegisterLedger {
        RegisterLedger {
            opening_amount: Money::from_minor(100_000),
            deposits_total: Money::from_minor(5_000),
            withdrawals_total: Money::from_minor(3_000),
            cash_tendered: Money::from_minor(25_000),
            sales_total: Money::from_minor(40_000),
            sales_count: 2,
            tenders: vec![
                TenderTally {
                    kind: PaymentKind::Cash,
                    amount: Money::from_minor(25_000),
                    count: 1,
                },
                TenderTally {
                    kind: PaymentKind::Card,
                    amount: Money::from_minor(15_000),
                    count: 1,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_expected_cash_formula() {
        assert_eq!(ledger().expected_cash(), Money::from_minor(127_000));
    }

    #[test]
    fn test_refunds_do_not_change_expected_cash() {
        let mut l = ledger();
        l.refunds_total = Money::from_minor(10_000);
        l.refunds_count = 1;
        assert_eq!(l.expected_cash(), Money::from_minor(127_000));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(
            ReconciliationOutcome::from_difference(Money::from_minor(-500)),
            ReconciliationOutcome::Shortfall
        );
        assert_eq!(
            ReconciliationOutcome::from_difference(Money::from_minor(500)),
            ReconciliationOutcome::Overage
        );
        assert_eq!(
            ReconciliationOutcome::from_difference(Money::zero()),
            ReconciliationOutcome::Balanced
        );
        assert_eq!(ReconciliationOutcome::Balanced.to_string(), "exact match");
    }

    #[test]
    fn test_build_report_at_close() {
        let report = build_report(
            "rep-1".to_string(),
            &register(),
            &ledger(),
            Some(Money::from_minor(126_000)),
            "emp-1",
            Utc::now(),
        );

        assert_eq!(report.expected_amount, Money::from_minor(127_000));
        assert_eq!(report.closing_amount, Money::from_minor(126_000));
        assert_eq!(report.difference, Money::from_minor(-1_000));
        assert_eq!(report.outcome(), ReconciliationOutcome::Shortfall);
        assert_eq!(report.total_sales, Money::from_minor(40_000));
        assert_eq!(report.cash_sales, Money::from_minor(25_000));
        assert_eq!(report.card_count, 1);
        assert_eq!(report.digital_count, 0);
    }

    #[test]
    fn test_preview_report_is_balanced() {
        let report = build_report(
            "preview".to_string(),
            &register(),
            &ledger(),
            None,
            "emp-1",
            Utc::now(),
        );
        assert_eq!(report.closing_amount, report.expected_amount);
        assert!(report.difference.is_zero());
    }
}
