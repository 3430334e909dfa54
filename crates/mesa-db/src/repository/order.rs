//! # Order Repository
//!
//! Orders are created and edited by the order-taking flow. This repository
//! gives the settlement engine what it needs from them: read, lock, the
//! one terminal `→ paid` transition, table release, and the deletion
//! cascade.
//!
//! ## Order Lifecycle (as seen from here)
//! ```text
//!   pending ─┐
//!   in_progress ─┼──► mark_paid() ──► paid   (terminal, immutable)
//!   ready ───┘
//!   cancelled                                 (terminal, immutable)
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::lock_row;
use mesa_core::{DiningTable, Order, OrderItem, OrderItemModifier, TableStatus};

const ORDER_COLUMNS: &str = "id, order_number, status, table_id, employee_id, \
     subtotal, tax, discount, total, sale_id, created_at, updated_at";

/// Repository for orders, order lines and dining tables.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Pool reads
    // =========================================================================

    /// Gets an order by ID. No lock: callers use this for the optimistic
    /// early exit only.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Gets the lines of an order.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_items(&mut conn, order_id).await
    }

    /// Gets the modifiers of every line of an order.
    pub async fn modifiers(&self, order_id: &str) -> DbResult<Vec<OrderItemModifier>> {
        let modifiers = sqlx::query_as::<_, OrderItemModifier>(
            r#"
            SELECT m.id, m.order_item_id, m.name, m.price_change, m.quantity
            FROM order_item_modifiers m
            JOIN order_items i ON i.id = m.order_item_id
            WHERE i.order_id = ?1
            ORDER BY m.rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(modifiers)
    }

    pub async fn get_table(&self, id: &str) -> DbResult<Option<DiningTable>> {
        let table = sqlx::query_as::<_, DiningTable>(
            "SELECT id, name, status, updated_at FROM dining_tables WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(table)
    }

    // =========================================================================
    // Transactional operations
    // =========================================================================

    /// Exclusive lock on the order for the rest of the transaction.
    pub async fn lock(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        lock_row(conn, "orders", "Order", id).await
    }

    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");

        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(order)
    }

    pub async fn find_items(
        conn: &mut SqliteConnection,
        order_id: &str,
    ) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price, subtotal, notes
            FROM order_items
            WHERE order_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(items)
    }

    /// Moves the order to `paid` and attaches the sale reference.
    ///
    /// The status guard in the WHERE clause makes a second transition a
    /// no-op that reports `NotFound`.
    pub async fn mark_paid(
        conn: &mut SqliteConnection,
        order_id: &str,
        sale_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(order_id = %order_id, sale_id = %sale_id, "Marking order paid");

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'paid',
                sale_id = ?2,
                updated_at = ?3
            WHERE id = ?1 AND status NOT IN ('paid', 'cancelled')
            "#,
        )
        .bind(order_id)
        .bind(sale_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order (open)", order_id));
        }

        Ok(())
    }

    /// Releases a dining table back to `available`.
    pub async fn release_table(
        conn: &mut SqliteConnection,
        table_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(table_id = %table_id, "Releasing table");

        sqlx::query("UPDATE dining_tables SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(table_id)
            .bind(TableStatus::Available)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Deletes the modifiers of every line of the order. Returns rows removed.
    pub async fn delete_modifiers(conn: &mut SqliteConnection, order_id: &str) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM order_item_modifiers
            WHERE order_item_id IN (SELECT id FROM order_items WHERE order_id = ?1)
            "#,
        )
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM order_items WHERE order_id = ?1")
            .bind(order_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ?1")
            .bind(order_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order_id));
        }

        Ok(())
    }

    // =========================================================================
    // Order taking (seed data and tests)
    // =========================================================================

    pub async fn insert(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, order_number = %order.order_number, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, status, table_id, employee_id,
                subtotal, tax, discount, total, sale_id,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(order.status)
        .bind(&order.table_id)
        .bind(&order.employee_id)
        .bind(order.subtotal)
        .bind(order.tax)
        .bind(order.discount)
        .bind(order.total)
        .bind(&order.sale_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, unit_price, subtotal, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.subtotal)
        .bind(&item.notes)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_modifier(
        conn: &mut SqliteConnection,
        modifier: &OrderItemModifier,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_item_modifiers (id, order_item_id, name, price_change, quantity)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&modifier.id)
        .bind(&modifier.order_item_id)
        .bind(&modifier.name)
        .bind(modifier.price_change)
        .bind(modifier.quantity)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_table(conn: &mut SqliteConnection, table: &DiningTable) -> DbResult<()> {
        sqlx::query("INSERT INTO dining_tables (id, name, status, updated_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&table.id)
            .bind(&table.name)
            .bind(table.status)
            .bind(table.updated_at)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
