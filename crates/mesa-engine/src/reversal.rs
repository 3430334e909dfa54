//! # Reversal Engine
//!
//! Undoes settled sales, either as a refund (the sale stays, its status
//! moves forward) or as a hard delete (the sale and its order disappear).
//!
//! ## Refund vs Delete
//! ```text
//! ┌──────────────────────────┬──────────────────────────┬──────────────────┐
//! │ Step                     │ Refund                   │ Delete           │
//! ├──────────────────────────┼──────────────────────────┼──────────────────┤
//! │ Sale                     │ → refunded/partial       │ removed          │
//! │ Product + ingredient     │ restored on the first    │ restored if the  │
//! │ stock                    │ refund; failure LOGGED   │ sale was         │
//! │                          │ (savepoint rolled back)  │ completed;       │
//! │                          │                          │ failure ABORTS   │
//! │ Cash movement            │ + refund (−amount)       │ movements with   │
//! │                          │                          │ the sale number  │
//! │                          │                          │ removed          │
//! │ Invoice, payments,       │ kept                     │ removed          │
//! │ order, lines, modifiers  │                          │                  │
//! └──────────────────────────┴──────────────────────────┴──────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use mesa_core::validation::{validate_positive_amount, validate_required, validate_text};
use mesa_core::{
    CashMovement, CashMovementKind, Money, OrderItem, Sale, SaleStatus, ValidationError,
};
use mesa_db::{
    CashRegisterRepository, Database, InvoiceRepository, OrderRepository, SaleRepository,
};

use crate::collaborators::{IngredientRestorer, InventoryAdjuster};
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Requests / Responses
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub sale_id: String,
    pub amount: Money,
    pub reason: String,
    pub employee_id: String,
}

impl RefundRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("sale id", &self.sale_id)?;
        validate_positive_amount("refund amount", self.amount)?;
        validate_required("refund reason", &self.reason)?;
        validate_text("refund reason", &self.reason)?;
        validate_required("employee id", &self.employee_id)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    /// The sale after the refund.
    pub sale: Sale,
    /// Cash movement appended to the sale's register, if it has one.
    pub movement: Option<CashMovement>,
    pub stock_restored: bool,
    /// Inventory steps that failed and were skipped.
    pub inventory_failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSaleRequest {
    pub sale_id: String,
    pub employee_id: String,
}

/// Row counts removed by a deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionSummary {
    pub sale_id: String,
    pub order_id: String,
    pub stock_restored: bool,
    pub movements: u64,
    pub invoices: u64,
    pub payments: u64,
    pub modifiers: u64,
    pub lines: u64,
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Clone)]
pub struct ReversalEngine {
    db: Database,
    adjuster: Arc<dyn InventoryAdjuster>,
    restorer: Arc<dyn IngredientRestorer>,
}

impl ReversalEngine {
    pub fn new(
        db: Database,
        adjuster: Arc<dyn InventoryAdjuster>,
        restorer: Arc<dyn IngredientRestorer>,
    ) -> Self {
        ReversalEngine {
            db,
            adjuster,
            restorer,
        }
    }

    /// Refunds `amount` of a sale.
    ///
    /// Inventory restoration runs in savepoints: a failing step is rolled
    /// back, logged and reported in the outcome while the monetary reversal
    /// still commits.
    pub async fn refund(&self, request: &RefundRequest) -> EngineResult<RefundOutcome> {
        request.validate()?;

        let sale_id = request.sale_id.as_str();
        let mut tx = self.db.begin().await?;

        SaleRepository::lock(&mut tx, sale_id).await?;

        let sale = SaleRepository::find(&mut tx, sale_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", sale_id))?;

        let status = sale.status_after_refund(request.amount)?;
        let now = Utc::now();
        let notes = append_refund_note(sale.notes.as_deref(), &request.reason);

        SaleRepository::apply_refund(&mut tx, sale_id, status, &notes, now).await?;

        // Only the first refund returns goods to stock
        let restore_stock = sale.status == SaleStatus::Completed;
        let mut inventory_failures = Vec::new();

        if restore_stock {
            let lines = OrderRepository::find_items(&mut tx, &sale.order_id).await?;
            let reason = format!("refund {}", sale.sale_number);

            for line in &lines {
                let mut savepoint = Connection::begin(&mut *tx).await?;
                match self
                    .adjuster
                    .adjust_stock(
                        &mut savepoint,
                        &line.product_id,
                        line.quantity,
                        &reason,
                        &request.employee_id,
                    )
                    .await
                {
                    Ok(()) => savepoint.commit().await?,
                    Err(e) => {
                        warn!(sale_id = %sale_id, product_id = %line.product_id, error = %e, "Stock restore failed during refund");
                        savepoint.rollback().await?;
                        inventory_failures.push(format!("product {}: {}", line.product_id, e));
                    }
                }
            }

            let mut savepoint = Connection::begin(&mut *tx).await?;
            match self
                .restorer
                .restore_for_order_lines(&mut savepoint, &lines, &request.employee_id)
                .await
            {
                Ok(()) => savepoint.commit().await?,
                Err(e) => {
                    warn!(sale_id = %sale_id, error = %e, "Ingredient restore failed during refund");
                    savepoint.rollback().await?;
                    inventory_failures.push(format!("ingredients: {}", e));
                }
            }
        }

        let movement = match &sale.cash_register_id {
            Some(register_id) => {
                let movement = CashMovement {
                    id: Uuid::new_v4().to_string(),
                    cash_register_id: register_id.clone(),
                    movement_type: CashMovementKind::Refund,
                    amount: -request.amount.min(sale.total),
                    description: format!("Refund: {}", request.reason.trim()),
                    reference: Some(sale.sale_number.clone()),
                    employee_id: request.employee_id.clone(),
                    created_at: now,
                };
                CashRegisterRepository::insert_movement(&mut tx, &movement).await?;
                Some(movement)
            }
            None => None,
        };

        tx.commit().await?;

        info!(
            sale_id = %sale_id,
            amount = %request.amount,
            status = %status,
            stock_restored = restore_stock,
            inventory_failures = inventory_failures.len(),
            "Sale refunded"
        );

        let sale = Sale {
            status,
            notes: Some(notes),
            updated_at: now,
            ..sale
        };

        Ok(RefundOutcome {
            sale,
            movement,
            stock_restored: restore_stock,
            inventory_failures,
        })
    }

    /// Removes a sale and everything hanging off it. All or nothing.
    pub async fn delete(&self, request: &DeleteSaleRequest) -> EngineResult<DeletionSummary> {
        validate_required("sale id", &request.sale_id)?;
        validate_required("employee id", &request.employee_id)?;

        let sale_id = request.sale_id.as_str();
        let mut tx = self.db.begin().await?;

        SaleRepository::lock(&mut tx, sale_id).await?;

        let sale = SaleRepository::find(&mut tx, sale_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", sale_id))?;

        let mut summary = DeletionSummary {
            sale_id: sale.id.clone(),
            order_id: sale.order_id.clone(),
            ..Default::default()
        };

        if sale.status == SaleStatus::Completed {
            let lines = OrderRepository::find_items(&mut tx, &sale.order_id).await?;
            self.restore_all(&mut tx, &sale, &lines, &request.employee_id)
                .await?;
            summary.stock_restored = true;
        }

        summary.movements =
            CashRegisterRepository::delete_movements_by_reference(&mut tx, &sale.sale_number)
                .await?;
        summary.invoices = InvoiceRepository::delete_for_sale(&mut tx, sale_id).await?;
        summary.payments = SaleRepository::delete_payments(&mut tx, sale_id).await?;
        summary.modifiers = OrderRepository::delete_modifiers(&mut tx, &sale.order_id).await?;
        summary.lines = OrderRepository::delete_items(&mut tx, &sale.order_id).await?;
        OrderRepository::delete(&mut tx, &sale.order_id).await?;
        SaleRepository::delete(&mut tx, sale_id).await?;

        tx.commit().await?;

        info!(
            sale_id = %sale_id,
            sale_number = %sale.sale_number,
            order_id = %sale.order_id,
            payments = summary.payments,
            lines = summary.lines,
            employee_id = %request.employee_id,
            "Sale deleted"
        );

        Ok(summary)
    }

    async fn restore_all(
        &self,
        conn: &mut SqliteConnection,
        sale: &Sale,
        lines: &[OrderItem],
        employee_id: &str,
    ) -> EngineResult<()> {
        let reason = format!("delete {}", sale.sale_number);

        for line in lines {
            self.adjuster
                .adjust_stock(conn, &line.product_id, line.quantity, &reason, employee_id)
                .await?;
        }

        self.restorer
            .restore_for_order_lines(conn, lines, employee_id)
            .await?;

        Ok(())
    }
}

fn append_refund_note(existing: Option<&str>, reason: &str) -> String {
    let line = format!("Refund: {}", reason.trim());
    match existing.map(str::trim).filter(|n| !n.is_empty()) {
        Some(notes) => format!("{notes}\n{line}"),
        None => line,
    }
}
