//! # Domain Types
//!
//! Core domain types used throughout Mesa POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │      Sale       │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  mutable ticket │──►│  immutable      │◄──│  one tender     │       │
//! │  │  pending..paid  │   │  financial rec. │   │  line per sale  │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │ placed in                             │
//! │                                 ▼                                       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  CashMovement   │──►│  CashRegister   │──►│ CashRegister    │       │
//! │  │  deposit/with-  │   │  open → closed  │   │ Report          │       │
//! │  │  drawal/refund  │   │  shift session  │   │ (close/preview) │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::GENERIC_CUSTOMER_ID;

// =============================================================================
// Order
// =============================================================================

/// Status of a kitchen ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Ready,
    Paid,
    Cancelled,
}

impl OrderStatus {
    /// Paid and cancelled orders are immutable.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Ready => "ready",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A work-in-progress ticket of items before payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    /// Human-readable ticket number printed in the kitchen.
    pub order_number: String,
    pub status: OrderStatus,
    pub table_id: Option<String>,
    pub employee_id: Option<String>,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
    /// Set once, in the settlement transaction.
    pub sale_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Fails when the order can no longer be charged.
    pub fn ensure_settleable(&self) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::OrderNotSettleable {
                order_id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }
}

/// A line on an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
    pub notes: Option<String>,
}

/// A modifier attached to an order line ("extra cheese", "no onion").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItemModifier {
    pub id: String,
    pub order_item_id: String,
    pub name: String,
    pub price_change: Money,
    pub quantity: i64,
}

// =============================================================================
// Inventory
// =============================================================================

/// A sellable menu item. `stock` counts whole units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub track_stock: bool,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// A raw ingredient, measured in its own unit (g, ml, unit).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub unit: String,
    pub stock: f64,
    pub updated_at: DateTime<Utc>,
}

/// How much of one ingredient a single unit of a product consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RecipeLine {
    pub product_id: String,
    pub ingredient_id: String,
    pub quantity: f64,
}

impl RecipeLine {
    /// Ingredient quantity consumed by `units` of the product.
    #[inline]
    pub fn consumption_for(&self, units: i64) -> f64 {
        self.quantity * units as f64
    }
}

// =============================================================================
// Dining Table
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Available,
    Occupied,
    Reserved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DiningTable {
    pub id: String,
    pub name: String,
    pub status: TableStatus,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Customer
// =============================================================================

/// A customer record. Sales without an explicit customer point at the
/// generic end consumer ([`GENERIC_CUSTOMER_ID`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    /// Government identification number, the natural business key.
    pub identification_number: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    #[inline]
    pub fn is_generic(&self) -> bool {
        self.id == GENERIC_CUSTOMER_ID
    }

    /// An electronic invoice needs an identification number and a name.
    pub fn ensure_fiscal_ready(&self) -> CoreResult<()> {
        if self.identification_number.trim().is_empty() {
            return Err(CoreError::FiscalCustomerIncomplete {
                field: "identification number".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::FiscalCustomerIncomplete {
                field: "name".to_string(),
            });
        }
        Ok(())
    }
}

/// Customer data supplied with a settlement request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerInput {
    pub identification_number: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

// =============================================================================
// Payment Method
// =============================================================================

/// Tender type used to break down drawer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Physical cash, counted in the drawer.
    Cash,
    /// Card on an external terminal.
    Card,
    /// Bank transfer, wallets, QR.
    Digital,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PaymentMethod {
    pub id: String,
    pub name: String,
    pub kind: PaymentKind,
    pub is_active: bool,
}

// =============================================================================
// Sale
// =============================================================================

/// The status of a settled sale. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Completed,
    Refunded,
    PartialRefund,
}

impl SaleStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::Refunded => "refunded",
            SaleStatus::PartialRefund => "partial_refund",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the customer asked for a plain receipt or a fiscal invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Receipt,
    Electronic,
}

/// The immutable financial record of a settled order.
///
/// Monetary totals are copied from the order at settlement time and never
/// change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    /// Time-derived, unique.
    pub sale_number: String,
    pub order_id: String,
    pub customer_id: String,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
    pub status: SaleStatus,
    pub cash_register_id: Option<String>,
    pub employee_id: String,
    pub invoice_type: InvoiceType,
    pub needs_electronic_invoice: bool,
    pub invoice_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    /// Status a refund of `amount` moves this sale to.
    ///
    /// ```text
    ///   completed ──amount ≥ total──► refunded
    ///   completed ──amount < total──► partial_refund
    ///   partial_refund ──≥ total────► refunded
    ///   refunded ─────────────────► ✗ (error)
    /// ```
    pub fn status_after_refund(&self, amount: Money) -> CoreResult<SaleStatus> {
        if self.status == SaleStatus::Refunded {
            return Err(CoreError::InvalidSaleTransition {
                sale_id: self.id.clone(),
                status: self.status.to_string(),
            });
        }

        if amount >= self.total {
            Ok(SaleStatus::Refunded)
        } else {
            Ok(SaleStatus::PartialRefund)
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

/// One tender line of a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub payment_method_id: String,
    pub amount: Money,
    /// Free text (card auth code, transfer reference).
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A tender line as proposed by the cashier, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedPayment {
    pub payment_method_id: String,
    pub amount: Money,
    #[serde(default)]
    pub reference: Option<String>,
}

impl ProposedPayment {
    pub fn new(payment_method_id: impl Into<String>, amount: Money) -> Self {
        ProposedPayment {
            payment_method_id: payment_method_id.into(),
            amount,
            reference: None,
        }
    }
}

// =============================================================================
// Cash Register
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CashRegisterStatus {
    Open,
    Closed,
}

/// A cash-drawer shift session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashRegister {
    pub id: String,
    pub employee_id: String,
    pub opening_amount: Money,
    pub status: CashRegisterStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closing_amount: Option<Money>,
    pub expected_amount: Option<Money>,
    pub difference: Option<Money>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CashRegister {
    pub fn ensure_open(&self) -> CoreResult<()> {
        if self.status != CashRegisterStatus::Open {
            return Err(CoreError::RegisterClosed {
                register_id: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// Ledger entry type. `Sale` exists for completeness of the ledger
/// vocabulary; settlements are never written as movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CashMovementKind {
    Deposit,
    Withdrawal,
    Sale,
    Refund,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashMovement {
    pub id: String,
    pub cash_register_id: String,
    pub movement_type: CashMovementKind,
    /// Signed: refunds are stored negative.
    pub amount: Money,
    pub description: String,
    /// `OPENING` for the opening float, the sale number for refunds.
    pub reference: Option<String>,
    pub employee_id: String,
    pub created_at: DateTime<Utc>,
}

impl CashMovement {
    #[inline]
    pub fn is_opening(&self) -> bool {
        self.reference.as_deref() == Some(crate::OPENING_REFERENCE)
    }
}

/// End-of-shift (or preview) reconciliation snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashRegisterReport {
    pub id: String,
    pub cash_register_id: String,
    pub opening_amount: Money,
    pub closing_amount: Money,
    pub expected_amount: Money,
    pub difference: Money,
    pub total_sales: Money,
    pub sales_count: i64,
    pub cash_sales: Money,
    pub cash_count: i64,
    pub card_sales: Money,
    pub card_count: i64,
    pub digital_sales: Money,
    pub digital_count: i64,
    pub other_sales: Money,
    pub other_count: i64,
    pub refunds_count: i64,
    pub refunds_total: Money,
    pub discounts_total: Money,
    pub tax_total: Money,
    pub deposits_total: Money,
    pub withdrawals_total: Money,
    pub generated_by: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Invoicing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Issued,
    Failed,
}

/// Local record of a fiscal invoice attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Invoice {
    pub id: String,
    pub sale_id: String,
    pub status: InvoiceStatus,
    /// Reference returned by the invoice issuer.
    pub reference: Option<String>,
    /// Fiscal number assigned by the tax authority.
    pub number: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A sale whose fiscal invoice still has to be obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InvoiceRetryEntry {
    pub id: String,
    pub sale_id: String,
    pub send_email: bool,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Which receipt layout the printer should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptLayout {
    Fiscal,
    NonFiscal,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(status: SaleStatus, total: i64) -> Sale {
        let now = Utc::now();
        Sale {
            id: "sale-1".to_string(),
            sale_number: "V-1".to_string(),
            order_id: "ord-1".to_string(),
            customer_id: GENERIC_CUSTOMER_ID.to_string(),
            subtotal: Money::from_minor(total),
            tax: Money::zero(),
            discount: Money::zero(),
            total: Money::from_minor(total),
            status,
            cash_register_id: None,
            employee_id: "emp-1".to_string(),
            invoice_type: InvoiceType::Receipt,
            needs_electronic_invoice: false,
            invoice_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_order_status_terminal() {
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::InProgress.is_terminal());
        assert!(!OrderStatus::Ready.is_terminal());
    }

    #[test]
    fn test_refund_transitions() {
        let s = sale(SaleStatus::Completed, 10_000);
        assert_eq!(
            s.status_after_refund(Money::from_minor(10_000)).unwrap(),
            SaleStatus::Refunded
        );
        assert_eq!(
            s.status_after_refund(Money::from_minor(12_000)).unwrap(),
            SaleStatus::Refunded
        );
        assert_eq!(
            s.status_after_refund(Money::from_minor(4_000)).unwrap(),
            SaleStatus::PartialRefund
        );

        let partial = sale(SaleStatus::PartialRefund, 10_000);
        assert_eq!(
            partial.status_after_refund(Money::from_minor(10_000)).unwrap(),
            SaleStatus::Refunded
        );

        let refunded = sale(SaleStatus::Refunded, 10_000);
        assert!(refunded.status_after_refund(Money::from_minor(1)).is_err());
    }

    #[test]
    fn test_fiscal_customer_checks() {
        let now = Utc::now();
        let mut customer = Customer {
            id: "c-1".to_string(),
            identification_number: "900123456".to_string(),
            name: "Acme SAS".to_string(),
            email: None,
            phone: None,
            created_at: now,
            updated_at: now,
        };
        assert!(customer.ensure_fiscal_ready().is_ok());
        assert!(!customer.is_generic());

        customer.name = "  ".to_string();
        assert!(matches!(
            customer.ensure_fiscal_ready(),
            Err(CoreError::FiscalCustomerIncomplete { .. })
        ));
    }

    #[test]
    fn test_recipe_consumption_scales_with_quantity() {
        let line = RecipeLine {
            product_id: "burger".to_string(),
            ingredient_id: "beef".to_string(),
            quantity: 150.0,
        };
        assert_eq!(line.consumption_for(3), 450.0);
    }

    #[test]
    fn test_opening_movement_detection() {
        let movement = CashMovement {
            id: "m-1".to_string(),
            cash_register_id: "r-1".to_string(),
            movement_type: CashMovementKind::Deposit,
            amount: Money::from_minor(100_000),
            description: "Opening float".to_string(),
            reference: Some(crate::OPENING_REFERENCE.to_string()),
            employee_id: "emp-1".to_string(),
            created_at: Utc::now(),
        };
        assert!(movement.is_opening());
    }
}
