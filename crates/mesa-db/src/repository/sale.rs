//! # Sale Repository
//!
//! Database operations for sales and payments.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. SETTLE (one transaction, order locked)                             │
//! │     └── insert() → Sale { status: Completed }                          │
//! │     └── insert_payment() × N                                           │
//! │                                                                         │
//! │  2. INVOICE (background, after commit)                                 │
//! │     └── invoice_id attached by InvoiceRepository::record_issued()      │
//! │                                                                         │
//! │  3. (OPTIONAL) REFUND                                                  │
//! │     └── apply_refund() → Refunded | PartialRefund, notes appended      │
//! │                                                                         │
//! │  4. (OPTIONAL) DELETE                                                  │
//! │     └── delete_payments() → delete()   (inside the deletion cascade)   │
//! │                                                                         │
//! │  Monetary totals are written once in step 1 and never updated.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::lock_row;
use mesa_core::{Payment, Sale, SaleStatus};

const SALE_COLUMNS: &str = "id, sale_number, order_id, customer_id, \
     subtotal, tax, discount, total, status, cash_register_id, employee_id, \
     invoice_type, needs_electronic_invoice, invoice_id, notes, created_at, updated_at";

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Gets all payments for a sale.
    pub async fn payments(&self, sale_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, sale_id, payment_method_id, amount, reference, created_at
            FROM payments
            WHERE sale_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Sales placed in a register, oldest first.
    pub async fn list_by_register(&self, register_id: &str) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE cash_register_id = ?1 ORDER BY created_at, rowid"
        );

        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(register_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(sales)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Transactional operations
    // =========================================================================

    /// Exclusive lock on the sale for the rest of the transaction.
    pub async fn lock(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        lock_row(conn, "sales", "Sale", id).await
    }

    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");

        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(sale)
    }

    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, sale_number = %sale.sale_number, total = %sale.total, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, sale_number, order_id, customer_id,
                subtotal, tax, discount, total,
                status, cash_register_id, employee_id,
                invoice_type, needs_electronic_invoice, invoice_id, notes,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.sale_number)
        .bind(&sale.order_id)
        .bind(&sale.customer_id)
        .bind(sale.subtotal)
        .bind(sale.tax)
        .bind(sale.discount)
        .bind(sale.total)
        .bind(sale.status)
        .bind(&sale.cash_register_id)
        .bind(&sale.employee_id)
        .bind(sale.invoice_type)
        .bind(sale.needs_electronic_invoice)
        .bind(&sale.invoice_id)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Records one tender line for a sale.
    pub async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        debug!(sale_id = %payment.sale_id, amount = %payment.amount, "Recording payment");

        sqlx::query(
            r#"
            INSERT INTO payments (id, sale_id, payment_method_id, amount, reference, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.sale_id)
        .bind(&payment.payment_method_id)
        .bind(payment.amount)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Sets the post-refund status and the new notes.
    pub async fn apply_refund(
        conn: &mut SqliteConnection,
        sale_id: &str,
        status: SaleStatus,
        notes: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = ?2,
                notes = ?3,
                updated_at = ?4
            WHERE id = ?1 AND status <> 'refunded'
            "#,
        )
        .bind(sale_id)
        .bind(status)
        .bind(notes)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale (refundable)", sale_id));
        }

        Ok(())
    }

    pub async fn delete_payments(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM payments WHERE sale_id = ?1")
            .bind(sale_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(sale_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        Ok(())
    }
}

/// Generates a sale number in format: YYYYMMDD-HHMMSS-XXXXXX
///
/// ## Format
/// - YYYYMMDD-HHMMSS: settlement time (UTC)
/// - XXXXXX: 6 hex chars of a random UUID, so two settlements in the same
///   second still get distinct numbers
///
/// ## Example
/// `20260131-194502-9f3a07`
pub fn generate_sale_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &suffix[..6])
}

/// Generates a new payment ID.
pub fn generate_payment_id() -> String {
    Uuid::new_v4().to_string()
}
