//! # Cash Register Repository
//!
//! Shift sessions, their movement ledger, close-time reports, and the
//! aggregation queries behind reconciliation.
//!
//! ## Where the Numbers Come From
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  cash_registers.opening_amount ─────────────────► opening_amount       │
//! │                                                                         │
//! │  cash_movements (deposit, reference ≠ OPENING) ─► deposits_total       │
//! │  cash_movements (withdrawal) ───────────────────► withdrawals_total    │
//! │  cash_movements (refund) ───────────────────────► refunds_total/count  │
//! │                                                                         │
//! │  payments ⋈ sales ⋈ payment_methods                                    │
//! │     kind = cash, any sale status ───────────────► cash_tendered        │
//! │     sale status ≠ refunded, grouped by kind ────► tenders              │
//! │                                                                         │
//! │  sales (status ≠ refunded) ─────────────────────► sales_total/count,   │
//! │                                                   discounts, tax       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::lock_row;
use mesa_core::{
    CashMovement, CashRegister, CashRegisterReport, Money, RegisterLedger, TenderTally,
    OPENING_REFERENCE,
};

const REGISTER_COLUMNS: &str = "id, employee_id, opening_amount, status, opened_at, closed_at, \
     closing_amount, expected_amount, difference, notes, updated_at";

const MOVEMENT_COLUMNS: &str =
    "id, cash_register_id, movement_type, amount, description, reference, employee_id, created_at";

const REPORT_COLUMNS: &str = "id, cash_register_id, opening_amount, closing_amount, \
     expected_amount, difference, total_sales, sales_count, cash_sales, cash_count, \
     card_sales, card_count, digital_sales, digital_count, other_sales, other_count, \
     refunds_count, refunds_total, discounts_total, tax_total, deposits_total, \
     withdrawals_total, generated_by, created_at";

/// Values written when a register closes.
#[derive(Debug, Clone)]
pub struct RegisterClosing<'a> {
    pub closing_amount: Money,
    pub expected_amount: Money,
    pub difference: Money,
    pub notes: Option<&'a str>,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CashRegisterRepository {
    pool: SqlitePool,
}

impl CashRegisterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CashRegisterRepository { pool }
    }

    // =========================================================================
    // Pool reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CashRegister>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// The open session of an employee, if any.
    pub async fn find_open_for_employee(&self, employee_id: &str) -> DbResult<Option<CashRegister>> {
        let sql = format!(
            "SELECT {REGISTER_COLUMNS} FROM cash_registers WHERE employee_id = ?1 AND status = 'open'"
        );

        let register = sqlx::query_as::<_, CashRegister>(&sql)
            .bind(employee_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(register)
    }

    pub async fn count_for_employee(&self, employee_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cash_registers WHERE employee_id = ?1")
            .bind(employee_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Movement ledger of a register, oldest first.
    pub async fn movements(&self, register_id: &str) -> DbResult<Vec<CashMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM cash_movements WHERE cash_register_id = ?1 \
             ORDER BY created_at, rowid"
        );

        let movements = sqlx::query_as::<_, CashMovement>(&sql)
            .bind(register_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Movements carrying a given reference (a sale number, `OPENING`).
    pub async fn movements_by_reference(&self, reference: &str) -> DbResult<Vec<CashMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM cash_movements WHERE reference = ?1 ORDER BY rowid"
        );

        let movements = sqlx::query_as::<_, CashMovement>(&sql)
            .bind(reference)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// The persisted close-time report of a register.
    pub async fn report_for(&self, register_id: &str) -> DbResult<Option<CashRegisterReport>> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM cash_register_reports WHERE cash_register_id = ?1"
        );

        let report = sqlx::query_as::<_, CashRegisterReport>(&sql)
            .bind(register_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(report)
    }

    /// Aggregates the ledger without locking. Used by previews.
    pub async fn ledger_snapshot(&self, register: &CashRegister) -> DbResult<RegisterLedger> {
        let mut conn = self.pool.acquire().await?;
        Self::ledger(&mut conn, register).await
    }

    // =========================================================================
    // Transactional operations
    // =========================================================================

    /// Exclusive lock on the register for the rest of the transaction.
    pub async fn lock(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        lock_row(conn, "cash_registers", "Cash register", id).await
    }

    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<CashRegister>> {
        let sql = format!("SELECT {REGISTER_COLUMNS} FROM cash_registers WHERE id = ?1");

        let register = sqlx::query_as::<_, CashRegister>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(register)
    }

    /// Inserts a new session. A second open session for the same employee
    /// fails with a UNIQUE violation on `cash_registers.employee_id`.
    pub async fn insert(conn: &mut SqliteConnection, register: &CashRegister) -> DbResult<()> {
        debug!(id = %register.id, employee_id = %register.employee_id, "Inserting cash register");

        sqlx::query(
            r#"
            INSERT INTO cash_registers (
                id, employee_id, opening_amount, status, opened_at,
                closed_at, closing_amount, expected_amount, difference, notes, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&register.id)
        .bind(&register.employee_id)
        .bind(register.opening_amount)
        .bind(register.status)
        .bind(register.opened_at)
        .bind(register.closed_at)
        .bind(register.closing_amount)
        .bind(register.expected_amount)
        .bind(register.difference)
        .bind(&register.notes)
        .bind(register.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Appends a movement to the ledger.
    pub async fn insert_movement(conn: &mut SqliteConnection, movement: &CashMovement) -> DbResult<()> {
        debug!(
            register_id = %movement.cash_register_id,
            kind = ?movement.movement_type,
            amount = %movement.amount,
            "Recording cash movement"
        );

        sqlx::query(
            r#"
            INSERT INTO cash_movements (
                id, cash_register_id, movement_type, amount,
                description, reference, employee_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.cash_register_id)
        .bind(movement.movement_type)
        .bind(movement.amount)
        .bind(&movement.description)
        .bind(&movement.reference)
        .bind(&movement.employee_id)
        .bind(movement.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Terminal `open → closed` transition.
    pub async fn close(
        conn: &mut SqliteConnection,
        id: &str,
        closing: &RegisterClosing<'_>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE cash_registers SET
                status = 'closed',
                closed_at = ?2,
                closing_amount = ?3,
                expected_amount = ?4,
                difference = ?5,
                notes = COALESCE(?6, notes),
                updated_at = ?2
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(closing.closed_at)
        .bind(closing.closing_amount)
        .bind(closing.expected_amount)
        .bind(closing.difference)
        .bind(closing.notes)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Cash register (open)", id));
        }

        Ok(())
    }

    pub async fn insert_report(conn: &mut SqliteConnection, report: &CashRegisterReport) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cash_register_reports (
                id, cash_register_id, opening_amount, closing_amount,
                expected_amount, difference, total_sales, sales_count,
                cash_sales, cash_count, card_sales, card_count,
                digital_sales, digital_count, other_sales, other_count,
                refunds_count, refunds_total, discounts_total, tax_total,
                deposits_total, withdrawals_total, generated_by, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24
            )
            "#,
        )
        .bind(&report.id)
        .bind(&report.cash_register_id)
        .bind(report.opening_amount)
        .bind(report.closing_amount)
        .bind(report.expected_amount)
        .bind(report.difference)
        .bind(report.total_sales)
        .bind(report.sales_count)
        .bind(report.cash_sales)
        .bind(report.cash_count)
        .bind(report.card_sales)
        .bind(report.card_count)
        .bind(report.digital_sales)
        .bind(report.digital_count)
        .bind(report.other_sales)
        .bind(report.other_count)
        .bind(report.refunds_count)
        .bind(report.refunds_total)
        .bind(report.discounts_total)
        .bind(report.tax_total)
        .bind(report.deposits_total)
        .bind(report.withdrawals_total)
        .bind(&report.generated_by)
        .bind(report.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Deletes every movement tagged with `reference`. Returns rows removed.
    pub async fn delete_movements_by_reference(
        conn: &mut SqliteConnection,
        reference: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cash_movements WHERE reference = ?1")
            .bind(reference)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Aggregates everything reconciliation needs for `register`.
    pub async fn ledger(
        conn: &mut SqliteConnection,
        register: &CashRegister,
    ) -> DbResult<RegisterLedger> {
        let id = register.id.as_str();

        let (deposits_total, withdrawals_total, refunds_total, refunds_count): (
            Money,
            Money,
            Money,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN movement_type = 'deposit'
                                   AND (reference IS NULL OR reference <> ?2)
                                  THEN ABS(amount) ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN movement_type = 'withdrawal'
                                  THEN ABS(amount) ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN movement_type = 'refund'
                                  THEN ABS(amount) ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN movement_type = 'refund' THEN 1 ELSE 0 END), 0)
            FROM cash_movements
            WHERE cash_register_id = ?1
            "#,
        )
        .bind(id)
        .bind(OPENING_REFERENCE)
        .fetch_one(&mut *conn)
        .await?;

        let cash_tendered: Money = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(p.amount), 0)
            FROM payments p
            JOIN sales s ON s.id = p.sale_id
            JOIN payment_methods pm ON pm.id = p.payment_method_id
            WHERE s.cash_register_id = ?1 AND pm.kind = 'cash'
            "#,
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        let (sales_count, sales_total, discounts_total, tax_total): (i64, Money, Money, Money) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(total), 0),
                    COALESCE(SUM(discount), 0),
                    COALESCE(SUM(tax), 0)
                FROM sales
                WHERE cash_register_id = ?1 AND status <> 'refunded'
                "#,
            )
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        let tenders = sqlx::query_as::<_, TenderTally>(
            r#"
            SELECT
                pm.kind AS kind,
                COALESCE(SUM(p.amount), 0) AS amount,
                COUNT(*) AS count
            FROM payments p
            JOIN sales s ON s.id = p.sale_id
            JOIN payment_methods pm ON pm.id = p.payment_method_id
            WHERE s.cash_register_id = ?1 AND s.status <> 'refunded'
            GROUP BY pm.kind
            "#,
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(RegisterLedger {
            opening_amount: register.opening_amount,
            deposits_total,
            withdrawals_total,
            refunds_total,
            refunds_count,
            cash_tendered,
            sales_total,
            sales_count,
            discounts_total,
            tax_total,
            tenders,
        })
    }
}
