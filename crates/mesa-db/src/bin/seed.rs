//! # Seed Data Generator
//!
//! Populates a database with a small demo restaurant: dining tables, a
//! menu with recipes, ingredient stock and a handful of open orders ready
//! to be settled.
//!
//! ## Usage
//! ```bash
//! # Seed ./mesa_dev.db with 5 open orders (default)
//! cargo run -p mesa-db --bin seed
//!
//! # Custom number of open orders
//! cargo run -p mesa-db --bin seed -- --orders 20
//!
//! # Specify database path
//! cargo run -p mesa-db --bin seed -- --db ./data/mesa.db
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info,mesa=debug,sqlx=warn`).

use chrono::Utc;
use mesa_core::{
    DiningTable, Ingredient, Money, Order, OrderItem, OrderItemModifier, OrderStatus, Product,
    RecipeLine, TableStatus,
};
use mesa_db::{Database, DbConfig, InventoryRepository, OrderRepository};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// (id, name, unit, stock)
const INGREDIENTS: &[(&str, &str, &str, f64)] = &[
    ("ing-beef", "Ground beef", "g", 20_000.0),
    ("ing-bun", "Brioche bun", "unit", 200.0),
    ("ing-cheese", "Cheddar", "g", 5_000.0),
    ("ing-potato", "Potato", "g", 30_000.0),
    ("ing-lemon", "Lemon", "unit", 150.0),
];

/// (id, name, price, stock, recipe)
const MENU: &[(&str, &str, i64, i64, &[(&str, f64)])] = &[
    (
        "prod-burger",
        "Classic burger",
        28_000,
        100,
        &[("ing-beef", 150.0), ("ing-bun", 1.0), ("ing-cheese", 30.0)],
    ),
    ("prod-fries", "Fries", 9_500, 100, &[("ing-potato", 250.0)]),
    ("prod-lemonade", "Lemonade", 7_000, 100, &[("ing-lemon", 2.0)]),
    ("prod-soda", "Soda", 5_000, 240, &[]),
];

const TABLES: &[&str] = &["T1", "T2", "T3", "T4", "Terrace"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mesa=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut order_count: usize = 5;
    let mut db_path = "./mesa_dev.db".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--orders" | "-o" => {
                if i + 1 < args.len() {
                    order_count = args[i + 1].parse().unwrap_or(5);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Mesa POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -o, --orders <N>   Number of open orders to create (default: 5)");
                println!("  -d, --db <PATH>    Database file path (default: ./mesa_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, orders = order_count, "Seeding demo restaurant");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    if db.inventory().count_products().await? > 0 {
        warn!("Database already has a menu; skipping seed. Delete the file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();
    let mut tx = db.begin().await?;

    for (id, name, unit, stock) in INGREDIENTS {
        let ingredient = Ingredient {
            id: id.to_string(),
            name: name.to_string(),
            unit: unit.to_string(),
            stock: *stock,
            updated_at: now,
        };
        InventoryRepository::insert_ingredient(&mut tx, &ingredient).await?;
    }

    for (id, name, price, stock, recipe) in MENU {
        let product = Product {
            id: id.to_string(),
            name: name.to_string(),
            price: Money::from_minor(*price),
            stock: *stock,
            track_stock: true,
            is_active: true,
            updated_at: now,
        };
        InventoryRepository::insert_product(&mut tx, &product).await?;

        for (ingredient_id, quantity) in recipe.iter() {
            let line = RecipeLine {
                product_id: id.to_string(),
                ingredient_id: ingredient_id.to_string(),
                quantity: *quantity,
            };
            InventoryRepository::insert_recipe_line(&mut tx, &line).await?;
        }
    }

    let mut table_ids = Vec::with_capacity(TABLES.len());
    for name in TABLES {
        let table = DiningTable {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            status: TableStatus::Available,
            updated_at: now,
        };
        OrderRepository::insert_table(&mut tx, &table).await?;
        table_ids.push(table.id);
    }

    let mut summaries = Vec::with_capacity(order_count);

    for n in 0..order_count {
        let table_id = table_ids.get(n % table_ids.len()).cloned();
        let order_id = Uuid::new_v4().to_string();

        // burger ×(1..=2), fries ×1, soda or lemonade ×(n % 3 + 1)
        let drink = if n % 2 == 0 { MENU[3] } else { MENU[2] };
        let lines = [(MENU[0], 1 + (n % 2) as i64), (MENU[1], 1), (drink, (n % 3 + 1) as i64)];

        let items: Vec<OrderItem> = lines
            .iter()
            .map(|((product_id, _, price, _, _), quantity)| OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order_id.clone(),
                product_id: product_id.to_string(),
                quantity: *quantity,
                unit_price: Money::from_minor(*price),
                subtotal: Money::from_minor(price * quantity),
                notes: None,
            })
            .collect();

        let total: Money = items.iter().map(|i| i.subtotal).sum();

        let order = Order {
            id: order_id.clone(),
            order_number: format!("K-{:04}", n + 1),
            status: if n % 3 == 0 { OrderStatus::Ready } else { OrderStatus::InProgress },
            table_id: table_id.clone(),
            employee_id: Some("emp-waiter-1".to_string()),
            subtotal: total,
            tax: Money::zero(),
            discount: Money::zero(),
            total,
            sale_id: None,
            created_at: now,
            updated_at: now,
        };

        OrderRepository::insert(&mut tx, &order).await?;
        for item in &items {
            OrderRepository::insert_item(&mut tx, item).await?;
        }

        if let Some(first) = items.first() {
            let modifier = OrderItemModifier {
                id: Uuid::new_v4().to_string(),
                order_item_id: first.id.clone(),
                name: "No onion".to_string(),
                price_change: Money::zero(),
                quantity: 1,
            };
            OrderRepository::insert_modifier(&mut tx, &modifier).await?;
        }

        if let Some(table_id) = &table_id {
            sqlx::query("UPDATE dining_tables SET status = ?2 WHERE id = ?1")
                .bind(table_id)
                .bind(TableStatus::Occupied)
                .execute(&mut *tx)
                .await?;
        }

        summaries.push(serde_json::json!({
            "order_id": order.id,
            "order_number": order.order_number,
            "total": order.total,
        }));
    }

    tx.commit().await?;

    info!(
        ingredients = INGREDIENTS.len(),
        products = MENU.len(),
        tables = TABLES.len(),
        orders = order_count,
        "Seed complete"
    );

    println!("{}", serde_json::to_string_pretty(&summaries)?);

    Ok(())
}
