//! Common fixtures for mesa-engine integration tests.
//!
//! Each test builds its own database, seeds the rows it needs, and wires a
//! [`PosEngine`] to recording fakes for the external collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use mesa_core::{
    CashRegisterReport, DiningTable, Ingredient, Money, Order, OrderItem, OrderStatus, Product,
    ProposedPayment, ReceiptLayout, RecipeLine, Sale, TableStatus,
};
use mesa_db::{Database, DbConfig, InventoryRepository, OrderRepository};
use mesa_engine::{
    CollaboratorError, CollaboratorResult, Collaborators, EngineConfig, InvoiceIssuer,
    IssuedInvoice, OpenRegisterRequest, PosEngine, Printer, SettleRequest, SpreadsheetExporter,
};

pub const EMPLOYEE: &str = "emp-7";

/// Installs a test subscriber once. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mesa_engine=debug,mesa_db=info")
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Recording collaborators
// =============================================================================

#[derive(Default)]
pub struct RecordingIssuer {
    failing: AtomicBool,
    submissions: Mutex<Vec<(String, bool)>>,
}

impl RecordingIssuer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `(sale_id, send_email)` per submission, in call order.
    pub fn submissions(&self) -> Vec<(String, bool)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvoiceIssuer for RecordingIssuer {
    async fn submit(&self, sale: &Sale, send_email: bool) -> CollaboratorResult<IssuedInvoice> {
        self.submissions
            .lock()
            .unwrap()
            .push((sale.id.clone(), send_email));

        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::unavailable("invoice gateway", "connection refused"));
        }

        Ok(IssuedInvoice {
            reference: format!("CUFE-{}", sale.sale_number),
            number: Some("SETP-990001".to_string()),
        })
    }
}

#[derive(Default)]
pub struct RecordingPrinter {
    sales: Mutex<Vec<(String, ReceiptLayout)>>,
    reports: Mutex<Vec<String>>,
}

impl RecordingPrinter {
    pub fn printed_sales(&self) -> Vec<(String, ReceiptLayout)> {
        self.sales.lock().unwrap().clone()
    }

    pub fn printed_reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl Printer for RecordingPrinter {
    async fn print_sale(&self, sale: &Sale, layout: ReceiptLayout) -> CollaboratorResult<()> {
        self.sales.lock().unwrap().push((sale.id.clone(), layout));
        Ok(())
    }

    async fn print_report(&self, report: &CashRegisterReport) -> CollaboratorResult<()> {
        self.reports
            .lock()
            .unwrap()
            .push(report.cash_register_id.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingExporter {
    syncs: AtomicUsize,
}

impl RecordingExporter {
    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpreadsheetExporter for RecordingExporter {
    async fn sync_now(&self) -> CollaboratorResult<()> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct TestPos {
    pub engine: PosEngine,
    pub db: Database,
    pub issuer: Arc<RecordingIssuer>,
    pub printer: Arc<RecordingPrinter>,
    pub exporter: Arc<RecordingExporter>,
}

impl TestPos {
    /// Engine over a fresh in-memory database.
    pub async fn in_memory() -> Self {
        Self::with_db_config(DbConfig::in_memory()).await
    }

    /// Engine over a database file, for tests that need real concurrent
    /// writers.
    pub async fn on_disk(path: &Path) -> Self {
        Self::with_db_config(DbConfig::new(path).max_connections(8)).await
    }

    async fn with_db_config(config: DbConfig) -> Self {
        init_tracing();

        let db = Database::new(config).await.expect("database");
        let issuer = Arc::new(RecordingIssuer::default());
        let printer = Arc::new(RecordingPrinter::default());
        let exporter = Arc::new(RecordingExporter::default());

        let collaborators = Collaborators::new(issuer.clone(), printer.clone(), exporter.clone());
        let engine = PosEngine::new(db.clone(), collaborators, &EngineConfig::default());

        TestPos {
            engine,
            db,
            issuer,
            printer,
            exporter,
        }
    }

    pub async fn seed_product(&self, id: &str, price: i64, stock: i64) {
        let product = Product {
            id: id.to_string(),
            name: id.to_string(),
            price: Money::from_minor(price),
            stock,
            track_stock: true,
            is_active: true,
            updated_at: Utc::now(),
        };

        let mut conn = self.db.pool().acquire().await.unwrap();
        InventoryRepository::insert_product(&mut conn, &product)
            .await
            .unwrap();
    }

    /// Seeds an ingredient and the recipe line linking it to `product_id`.
    pub async fn seed_ingredient(&self, id: &str, stock: f64, product_id: &str, per_unit: f64) {
        let ingredient = Ingredient {
            id: id.to_string(),
            name: id.to_string(),
            unit: "g".to_string(),
            stock,
            updated_at: Utc::now(),
        };
        let line = RecipeLine {
            product_id: product_id.to_string(),
            ingredient_id: id.to_string(),
            quantity: per_unit,
        };

        let mut conn = self.db.pool().acquire().await.unwrap();
        InventoryRepository::insert_ingredient(&mut conn, &ingredient)
            .await
            .unwrap();
        InventoryRepository::insert_recipe_line(&mut conn, &line)
            .await
            .unwrap();
    }

    pub async fn seed_table(&self, id: &str) {
        let table = DiningTable {
            id: id.to_string(),
            name: format!("Table {id}"),
            status: TableStatus::Occupied,
            updated_at: Utc::now(),
        };

        let mut conn = self.db.pool().acquire().await.unwrap();
        OrderRepository::insert_table(&mut conn, &table).await.unwrap();
    }

    /// Seeds a pending order with one line per `(product_id, quantity,
    /// unit_price)`. The order total is the sum of the lines.
    pub async fn seed_order(&self, lines: &[(&str, i64, i64)], table_id: Option<&str>) -> String {
        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();

        let items: Vec<OrderItem> = lines
            .iter()
            .map(|(product_id, quantity, unit_price)| OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order_id.clone(),
                product_id: product_id.to_string(),
                quantity: *quantity,
                unit_price: Money::from_minor(*unit_price),
                subtotal: Money::from_minor(quantity * unit_price),
                notes: None,
            })
            .collect();

        let total: Money = items.iter().map(|item| item.subtotal).sum();

        let order = Order {
            id: order_id.clone(),
            order_number: format!("T-{}", &order_id[..8]),
            status: OrderStatus::Ready,
            table_id: table_id.map(str::to_string),
            employee_id: Some(EMPLOYEE.to_string()),
            subtotal: total,
            tax: Money::zero(),
            discount: Money::zero(),
            total,
            sale_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.pool().acquire().await.unwrap();
        OrderRepository::insert(&mut conn, &order).await.unwrap();
        for item in &items {
            OrderRepository::insert_item(&mut conn, item).await.unwrap();
        }

        order_id
    }

    pub async fn open_register(&self, opening: i64) -> String {
        self.engine
            .open_register(&OpenRegisterRequest {
                employee_id: EMPLOYEE.to_string(),
                opening_amount: Money::from_minor(opening),
                notes: None,
            })
            .await
            .expect("open register")
            .id
    }

    /// Seeds a one-line order for `amount` and settles it with a single
    /// tender into `register_id`.
    pub async fn cash_sale(&self, register_id: &str, method: &str, amount: i64) -> Sale {
        let order_id = self.seed_order(&[("burger", 1, amount)], None).await;

        let request = SettleRequest::new(
            order_id,
            EMPLOYEE,
            vec![ProposedPayment::new(method, Money::from_minor(amount))],
        )
        .with_register(register_id);

        self.engine.settle(&request).await.expect("settle")
    }

    pub async fn product_stock(&self, id: &str) -> i64 {
        self.db
            .inventory()
            .get_product(id)
            .await
            .unwrap()
            .expect("product")
            .stock
    }

    pub async fn ingredient_stock(&self, id: &str) -> f64 {
        self.db
            .inventory()
            .get_ingredient(id)
            .await
            .unwrap()
            .expect("ingredient")
            .stock
    }
}

pub fn money(minor: i64) -> Money {
    Money::from_minor(minor)
}
