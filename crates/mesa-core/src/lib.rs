//! # mesa-core: Pure Business Logic for Mesa POS
//!
//! Types and math for sale settlement and cash-drawer reconciliation.
//! Nothing in this crate touches a database, a socket or a file.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Mesa POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 mesa-engine (PosEngine facade)                  │   │
//! │  │   Settle ─ Refund ─ DeleteSale ─ Open/Close register ─ Preview  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ mesa-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐   │   │
//! │  │   │   types   │  │   money   │  │ validation │  │ reconcil-│   │   │
//! │  │   │  Order    │  │   Money   │  │  payments  │  │ iation   │   │   │
//! │  │   │  Sale     │  │ tolerance │  │  customer  │  │ expected │   │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └──────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                mesa-db (SQLite via sqlx)                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, Sale, Payment, CashRegister, ...)
//! - [`money`] - Integer money in minor units
//! - [`error`] - Domain error types
//! - [`validation`] - Payment validator and field checks
//! - [`reconciliation`] - Expected-cash formula and report builder
//!
//! ## Example Usage
//!
//! ```rust
//! use mesa_core::{Money, RegisterLedger, ReconciliationOutcome};
//!
//! let ledger = RegisterLedger {
//!     opening_amount: Money::from_minor(100_000),
//!     cash_tendered: Money::from_minor(25_000),
//!     ..Default::default()
//! };
//!
//! let counted = Money::from_minor(125_000);
//! let difference = counted - ledger.expected_cash();
//! assert_eq!(
//!     ReconciliationOutcome::from_difference(difference),
//!     ReconciliationOutcome::Balanced
//! );
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod reconciliation;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use reconciliation::{build_report, ReconciliationOutcome, RegisterLedger, TenderTally};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Id of the well-known "generic end consumer" customer.
///
/// Seeded by the reference-data migration; every sale settled without
/// customer data points here.
pub const GENERIC_CUSTOMER_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Identification number of the generic end consumer.
pub const GENERIC_CUSTOMER_IDENTIFICATION: &str = "222222222222";

pub const GENERIC_CUSTOMER_NAME: &str = "Consumidor Final";

/// Allowed absolute difference between Σ payments and the sale total.
pub const PAYMENT_TOLERANCE: Money = Money::from_minor(1);

/// Reference tag of the opening-float deposit.
///
/// Excluded from deposit sums, since the float is already counted through
/// `CashRegister::opening_amount`.
pub const OPENING_REFERENCE: &str = "OPENING";
