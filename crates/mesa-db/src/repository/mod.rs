//! # Repository Module
//!
//! Database repository implementations for Mesa POS.
//!
//! ## Two Ways In
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Reads / standalone writes          Writes inside a caller transaction  │
//! │  ─────────────────────────          ──────────────────────────────────  │
//! │  db.sales().get_by_id(id)           let mut tx = db.begin().await?;     │
//! │       │                             SaleRepository::lock(&mut tx, id)   │
//! │       ▼                             SaleRepository::insert(&mut tx, ..) │
//! │  &self methods, own pool conn       tx.commit().await?                  │
//! │                                          │                              │
//! │                                          ▼                              │
//! │                                     associated fns taking               │
//! │                                     &mut SqliteConnection               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine decides transaction boundaries; repositories never begin or
//! commit a transaction on their own, except for the small self-contained
//! writes done by background tasks.
//!
//! ## Available Repositories
//!
//! - [`OrderRepository`](order::OrderRepository) - Orders, lines, modifiers, dining tables
//! - [`SaleRepository`](sale::SaleRepository) - Sales and payments
//! - [`CustomerRepository`](customer::CustomerRepository) - Customer upsert
//! - [`PaymentMethodRepository`](payment_method::PaymentMethodRepository) - Tender catalogue
//! - [`CashRegisterRepository`](cash_register::CashRegisterRepository) - Sessions, movements, reports
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Invoice records and retry queue
//! - [`InventoryRepository`](inventory::InventoryRepository) - Stock and recipes

pub mod cash_register;
pub mod customer;
pub mod inventory;
pub mod invoice;
pub mod order;
pub mod payment_method;
pub mod sale;

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::error::{DbError, DbResult};

/// Takes the write lock on behalf of the current transaction by touching
/// `table.id = id`.
///
/// SQLite has no `SELECT ... FOR UPDATE`. A write as the first statement of
/// a transaction acquires the database write lock, which is held until
/// commit or rollback; competing writers wait on the busy timeout and then
/// observe the committed state.
///
/// Fails with `NotFound` when no row has that id.
pub(crate) async fn lock_row(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    id: &str,
) -> DbResult<()> {
    let sql = format!("UPDATE {table} SET updated_at = ?1 WHERE id = ?2");

    let result = sqlx::query(&sql)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found(entity, id));
    }

    Ok(())
}
