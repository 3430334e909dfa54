//! # External Collaborators
//!
//! Contracts the engine consumes but does not implement: fiscal invoice
//! issuance, receipt printing, spreadsheet export, and inventory
//! bookkeeping.
//!
//! ```text
//! ┌────────────────────────┬────────────────────────┬──────────────────────┐
//! │ Collaborator           │ Called from            │ Failure handling     │
//! ├────────────────────────┼────────────────────────┼──────────────────────┤
//! │ InvoiceIssuer          │ background task        │ retry queue          │
//! │ Printer                │ background task        │ logged, no retry     │
//! │ SpreadsheetExporter    │ background task        │ logged, no retry     │
//! │ InventoryAdjuster      │ inside the caller's tx │ refund: logged       │
//! │ IngredientRestorer     │ inside the caller's tx │ delete: abort        │
//! └────────────────────────┴────────────────────────┴──────────────────────┘
//! ```
//!
//! The inventory traits take the caller's connection so their writes commit
//! or roll back with the reversal. [`SqliteInventory`] implements both on
//! top of the local stock tables.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::debug;

use mesa_core::{CashRegisterReport, OrderItem, ReceiptLayout, Sale};
use mesa_db::InventoryRepository;

use crate::error::CollaboratorError;

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Reference returned by the tax authority gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedInvoice {
    /// Gateway reference (CUFE, UUID, ...).
    pub reference: String,
    /// Human-facing fiscal number, when the gateway assigns one.
    pub number: Option<String>,
}

/// Submits a sale for electronic invoicing.
///
/// Resubmitting the same sale must not create a second fiscal document; the
/// engine deletes prior failed records before calling again.
#[async_trait]
pub trait InvoiceIssuer: Send + Sync {
    async fn submit(&self, sale: &Sale, send_email: bool) -> CollaboratorResult<IssuedInvoice>;
}

#[async_trait]
pub trait Printer: Send + Sync {
    async fn print_sale(&self, sale: &Sale, layout: ReceiptLayout) -> CollaboratorResult<()>;

    async fn print_report(&self, report: &CashRegisterReport) -> CollaboratorResult<()>;
}

/// Pushes the day's figures to the back-office spreadsheet.
#[async_trait]
pub trait SpreadsheetExporter: Send + Sync {
    async fn sync_now(&self) -> CollaboratorResult<()>;
}

/// Adds `delta` units of a product back to (or out of) stock.
#[async_trait]
pub trait InventoryAdjuster: Send + Sync {
    async fn adjust_stock(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        delta: i64,
        reason: &str,
        employee_id: &str,
    ) -> CollaboratorResult<()>;
}

/// Returns the ingredients consumed by order lines to stock.
#[async_trait]
pub trait IngredientRestorer: Send + Sync {
    async fn restore_for_order_lines(
        &self,
        conn: &mut SqliteConnection,
        lines: &[OrderItem],
        employee_id: &str,
    ) -> CollaboratorResult<()>;
}

// =============================================================================
// SQLite inventory
// =============================================================================

/// Inventory kept in the local `products` / `ingredients` tables, with every
/// change logged to `stock_movements`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteInventory;

#[async_trait]
impl InventoryAdjuster for SqliteInventory {
    async fn adjust_stock(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        delta: i64,
        reason: &str,
        employee_id: &str,
    ) -> CollaboratorResult<()> {
        InventoryRepository::adjust_product_stock(conn, product_id, delta, reason, employee_id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IngredientRestorer for SqliteInventory {
    /// Consumption per line is the recipe quantity times the line quantity.
    async fn restore_for_order_lines(
        &self,
        conn: &mut SqliteConnection,
        lines: &[OrderItem],
        employee_id: &str,
    ) -> CollaboratorResult<()> {
        for line in lines {
            let recipe = InventoryRepository::recipe(conn, &line.product_id).await?;

            for component in &recipe {
                let quantity = component.consumption_for(line.quantity);
                if quantity == 0.0 {
                    continue;
                }

                debug!(
                    product_id = %line.product_id,
                    ingredient_id = %component.ingredient_id,
                    quantity,
                    "Restoring ingredient"
                );

                InventoryRepository::adjust_ingredient_stock(
                    conn,
                    &component.ingredient_id,
                    quantity,
                    "ingredient restore",
                    employee_id,
                )
                .await?;
            }
        }

        Ok(())
    }
}
