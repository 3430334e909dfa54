//! # Customer Repository
//!
//! Customers are keyed by their government identification number. A
//! settlement carrying customer data creates the customer the first time
//! and refreshes name/contact details afterwards.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use mesa_core::{Customer, CustomerInput, GENERIC_CUSTOMER_ID};

const CUSTOMER_COLUMNS: &str =
    "id, identification_number, name, email, phone, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");

        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    pub async fn find_by_identification(&self, identification: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE identification_number = ?1");

        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(identification)
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    /// The well-known generic end consumer seeded by the migrations.
    pub async fn generic(&self) -> DbResult<Customer> {
        self.get_by_id(GENERIC_CUSTOMER_ID)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", GENERIC_CUSTOMER_ID))
    }

    /// Creates or updates a customer by identification number.
    ///
    /// ## Merge Rules
    /// - `name` always takes the new value
    /// - `email` / `phone` keep the stored value when the input omits them
    pub async fn upsert(&self, input: &CustomerInput) -> DbResult<Customer> {
        let identification = input.identification_number.trim();
        let now = Utc::now();

        debug!(identification = %identification, "Upserting customer");

        let email = input.email.as_deref().filter(|e| !e.trim().is_empty());
        let phone = input.phone.as_deref().filter(|p| !p.trim().is_empty());

        sqlx::query(
            r#"
            INSERT INTO customers (id, identification_number, name, email, phone, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(identification_number) DO UPDATE SET
                name = excluded.name,
                email = COALESCE(excluded.email, customers.email),
                phone = COALESCE(excluded.phone, customers.phone),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(identification)
        .bind(input.name.trim())
        .bind(email)
        .bind(phone)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_identification(identification)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", identification))
    }
}
