//! # mesa-engine: Settlement Services for Mesa POS
//!
//! Sale settlement, reversals and cash-drawer reconciliation on top of
//! [`mesa_db`], with invoicing, printing and spreadsheet export pushed to
//! background tasks after commit.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          mesa-engine                                    │
//! │                                                                         │
//! │   PosEngine (service.rs) ── typed requests, one method per operation    │
//! │      │                                                                  │
//! │      ├── SettlementCoordinator (settlement.rs)                          │
//! │      ├── ReversalEngine        (reversal.rs)                            │
//! │      ├── CashDrawer            (cash_drawer.rs)                         │
//! │      │                                                                  │
//! │      ├── SideEffectDispatcher  (dispatcher.rs) ──► TaskRunner (tasks.rs)│
//! │      └── InvoiceRetryWorker    (invoice_retry.rs)                       │
//! │                                                                         │
//! │   Collaborator traits (collaborators.rs):                               │
//! │      InvoiceIssuer · Printer · SpreadsheetExporter                      │
//! │      InventoryAdjuster · IngredientRestorer (SqliteInventory)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transactions
//! Every mutating operation runs in one SQLite transaction whose first
//! statement locks the target row (order, sale or register). Anything that
//! talks to the outside world happens after commit.

pub mod cash_drawer;
pub mod collaborators;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod invoice_retry;
pub mod reversal;
pub mod service;
pub mod settlement;
pub mod tasks;

pub use cash_drawer::{
    AddCashMovementRequest, CashDrawer, CloseOutcome, CloseRegisterRequest, OpenRegisterRequest,
};
pub use collaborators::{
    CollaboratorResult, IngredientRestorer, InventoryAdjuster, InvoiceIssuer, IssuedInvoice,
    Printer, SpreadsheetExporter, SqliteInventory,
};
pub use config::{
    ConfigError, DatabaseSettings, EngineConfig, InvoiceRetrySettings, SideEffectSettings,
};
pub use dispatcher::{SettlementEffects, SideEffectDispatcher};
pub use error::{CollaboratorError, EngineError, EngineResult, ErrorKind};
pub use invoice_retry::{InvoiceRetryHandle, InvoiceRetryWorker, RetrySummary};
pub use reversal::{DeleteSaleRequest, DeletionSummary, RefundOutcome, RefundRequest, ReversalEngine};
pub use service::{Collaborators, PosEngine, SaleDetails};
pub use settlement::{SettleRequest, SettlementCoordinator};
pub use tasks::TaskRunner;
