//! # Invoice Repository
//!
//! Local records of fiscal invoice attempts and the durable retry queue.
//!
//! ## Retry Queue Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Dispatcher: issuer.submit() fails                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  record_failure()  → invoices (failed) + invoice_retry_queue (pending) │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  InvoiceRetryWorker polls pending(batch, max_attempts)                 │
//! │       │                                                                 │
//! │       ├── delete_failed_for_sale()   (no duplicate fiscal numbers)     │
//! │       ├── issuer.submit()                                              │
//! │       │                                                                 │
//! │       ├── OK  → record_issued() + mark_completed()                     │
//! │       └── ERR → record_attempt_failure()  (attempts += 1)              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use mesa_core::{Invoice, InvoiceRetryEntry, InvoiceStatus};

const INVOICE_COLUMNS: &str = "id, sale_id, status, reference, number, error, created_at";

const RETRY_COLUMNS: &str =
    "id, sale_id, send_email, attempts, last_error, created_at, attempted_at, completed_at";

#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    pub async fn for_sale(&self, sale_id: &str) -> DbResult<Vec<Invoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE sale_id = ?1 ORDER BY rowid");

        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    /// Stores an issued invoice and attaches it to the sale, atomically.
    pub async fn record_issued(
        &self,
        sale_id: &str,
        reference: &str,
        number: Option<&str>,
    ) -> DbResult<Invoice> {
        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            status: InvoiceStatus::Issued,
            reference: Some(reference.to_string()),
            number: number.map(str::to_string),
            error: None,
            created_at: now,
        };

        debug!(sale_id = %sale_id, reference = %reference, "Recording issued invoice");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE sales SET invoice_id = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(sale_id)
            .bind(&invoice.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        Self::insert(&mut tx, &invoice).await?;

        tx.commit().await?;

        Ok(invoice)
    }

    /// Stores a failed attempt and queues the sale for retry, atomically.
    pub async fn record_failure(&self, sale_id: &str, send_email: bool, error: &str) -> DbResult<()> {
        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            status: InvoiceStatus::Failed,
            reference: None,
            number: None,
            error: Some(error.to_string()),
            created_at: now,
        };

        debug!(sale_id = %sale_id, error = %error, "Queueing invoice retry");

        let mut tx = self.pool.begin().await?;

        Self::insert(&mut tx, &invoice).await?;

        sqlx::query(
            r#"
            INSERT INTO invoice_retry_queue (id, sale_id, send_email, attempts, last_error, created_at)
            VALUES (?1, ?2, ?3, 0, ?4, ?5)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(sale_id)
        .bind(send_email)
        .bind(error)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Removes failed invoice records of a sale before resubmission.
    pub async fn delete_failed_for_sale(&self, sale_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM invoices WHERE sale_id = ?1 AND status = 'failed'")
            .bind(sale_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Retry queue
    // =========================================================================

    /// Oldest pending entries still under the attempt limit.
    pub async fn pending(&self, limit: u32, max_attempts: u32) -> DbResult<Vec<InvoiceRetryEntry>> {
        let sql = format!(
            "SELECT {RETRY_COLUMNS} FROM invoice_retry_queue \
             WHERE completed_at IS NULL AND attempts < ?1 \
             ORDER BY created_at, rowid LIMIT ?2"
        );

        let entries = sqlx::query_as::<_, InvoiceRetryEntry>(&sql)
            .bind(max_attempts as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    pub async fn pending_for_sale(&self, sale_id: &str) -> DbResult<Vec<InvoiceRetryEntry>> {
        let sql = format!(
            "SELECT {RETRY_COLUMNS} FROM invoice_retry_queue \
             WHERE sale_id = ?1 AND completed_at IS NULL ORDER BY rowid"
        );

        let entries = sqlx::query_as::<_, InvoiceRetryEntry>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    pub async fn mark_completed(&self, entry_id: &str, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE invoice_retry_queue SET
                attempts = attempts + 1,
                attempted_at = ?2,
                completed_at = ?2,
                last_error = NULL
            WHERE id = ?1
            "#,
        )
        .bind(entry_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn record_attempt_failure(
        &self,
        entry_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE invoice_retry_queue SET
                attempts = attempts + 1,
                attempted_at = ?2,
                last_error = ?3
            WHERE id = ?1
            "#,
        )
        .bind(entry_id)
        .bind(now)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Transactional operations
    // =========================================================================

    pub async fn insert(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invoices (id, sale_id, status, reference, number, error, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.sale_id)
        .bind(invoice.status)
        .bind(&invoice.reference)
        .bind(&invoice.number)
        .bind(&invoice.error)
        .bind(invoice.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Deletes every invoice record and retry entry of a sale. Returns the
    /// number of invoice records removed.
    pub async fn delete_for_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<u64> {
        sqlx::query("DELETE FROM invoice_retry_queue WHERE sale_id = ?1")
            .bind(sale_id)
            .execute(&mut *conn)
            .await?;

        let result = sqlx::query("DELETE FROM invoices WHERE sale_id = ?1")
            .bind(sale_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }
}
