//! # Inventory Repository
//!
//! Product and ingredient stock, recipes, and the append-only
//! `stock_movements` ledger. Every stock change writes its ledger row in
//! the same transaction.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use mesa_core::{Ingredient, Product, RecipeLine};

#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, name, price, stock, track_stock, is_active, updated_at FROM products WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    pub async fn get_ingredient(&self, id: &str) -> DbResult<Option<Ingredient>> {
        let ingredient = sqlx::query_as::<_, Ingredient>(
            "SELECT id, name, unit, stock, updated_at FROM ingredients WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ingredient)
    }

    pub async fn count_products(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Transactional operations
    // =========================================================================

    /// Adds `delta` units to a product's stock and logs the movement.
    ///
    /// Products with `track_stock = 0` only get the ledger row.
    pub async fn adjust_product_stock(
        conn: &mut SqliteConnection,
        product_id: &str,
        delta: i64,
        reason: &str,
        employee_id: &str,
    ) -> DbResult<()> {
        let now = Utc::now();

        debug!(product_id = %product_id, delta, reason = %reason, "Adjusting product stock");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                stock = CASE WHEN track_stock = 1 THEN stock + ?2 ELSE stock END,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(product_id)
        .bind(delta)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id));
        }

        sqlx::query(
            r#"
            INSERT INTO stock_movements (id, product_id, ingredient_id, quantity, reason, employee_id, created_at)
            VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(product_id)
        .bind(delta as f64)
        .bind(reason)
        .bind(employee_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Adds `delta` (in the ingredient's unit) to an ingredient's stock and
    /// logs the movement.
    pub async fn adjust_ingredient_stock(
        conn: &mut SqliteConnection,
        ingredient_id: &str,
        delta: f64,
        reason: &str,
        employee_id: &str,
    ) -> DbResult<()> {
        let now = Utc::now();

        debug!(ingredient_id = %ingredient_id, delta, reason = %reason, "Adjusting ingredient stock");

        let result = sqlx::query("UPDATE ingredients SET stock = stock + ?2, updated_at = ?3 WHERE id = ?1")
            .bind(ingredient_id)
            .bind(delta)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Ingredient", ingredient_id));
        }

        sqlx::query(
            r#"
            INSERT INTO stock_movements (id, product_id, ingredient_id, quantity, reason, employee_id, created_at)
            VALUES (?1, NULL, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(ingredient_id)
        .bind(delta)
        .bind(reason)
        .bind(employee_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Recipe of a product. Empty for products without ingredients.
    pub async fn recipe(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Vec<RecipeLine>> {
        let lines = sqlx::query_as::<_, RecipeLine>(
            "SELECT product_id, ingredient_id, quantity FROM product_ingredients WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(lines)
    }

    // =========================================================================
    // Catalogue setup (seed data and tests)
    // =========================================================================

    pub async fn insert_product(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price, stock, track_stock, is_active, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.track_stock)
        .bind(product.is_active)
        .bind(product.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_ingredient(conn: &mut SqliteConnection, ingredient: &Ingredient) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO ingredients (id, name, unit, stock, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&ingredient.id)
        .bind(&ingredient.name)
        .bind(&ingredient.unit)
        .bind(ingredient.stock)
        .bind(ingredient.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_recipe_line(conn: &mut SqliteConnection, line: &RecipeLine) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO product_ingredients (product_id, ingredient_id, quantity) VALUES (?1, ?2, ?3)",
        )
        .bind(&line.product_id)
        .bind(&line.ingredient_id)
        .bind(line.quantity)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
