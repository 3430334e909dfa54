//! # Payment Method Repository
//!
//! The tender catalogue. The payment validator needs the full set, active
//! and inactive, to tell "unknown" from "deactivated".

use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;

use crate::error::{DbError, DbResult};
use mesa_core::PaymentMethod;

#[derive(Debug, Clone)]
pub struct PaymentMethodRepository {
    pool: SqlitePool,
}

impl PaymentMethodRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentMethodRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<PaymentMethod>> {
        let methods = sqlx::query_as::<_, PaymentMethod>(
            "SELECT id, name, kind, is_active FROM payment_methods ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    /// All payment methods keyed by id.
    pub async fn catalogue(&self) -> DbResult<HashMap<String, PaymentMethod>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect())
    }

    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE payment_methods SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Payment method", id));
        }

        Ok(())
    }

    pub async fn insert(conn: &mut SqliteConnection, method: &PaymentMethod) -> DbResult<()> {
        sqlx::query("INSERT INTO payment_methods (id, name, kind, is_active) VALUES (?1, ?2, ?3, ?4)")
            .bind(&method.id)
            .bind(&method.name)
            .bind(method.kind)
            .bind(method.is_active)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
