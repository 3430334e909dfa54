//! # POS Engine
//!
//! The service boundary: one typed method per operation, wired to a single
//! database handle and a single set of collaborators.
//!
//! ## Usage
//! ```rust,ignore
//! use mesa_engine::{Collaborators, EngineConfig, PosEngine, SettleRequest};
//!
//! let config = EngineConfig::load(None)?;
//! let db = mesa_db::Database::new(config.db_config()).await?;
//! let engine = PosEngine::new(db, Collaborators::new(issuer, printer, exporter), &config);
//!
//! let sale = engine.settle(&SettleRequest::new(order_id, "emp-7", payments)).await?;
//! ```

use serde::Serialize;
use std::sync::Arc;

use mesa_core::{
    CashMovement, CashRegister, CashRegisterReport, Invoice, OrderItem, Payment, Sale,
};
use mesa_db::Database;

use crate::cash_drawer::{
    AddCashMovementRequest, CashDrawer, CloseOutcome, CloseRegisterRequest, OpenRegisterRequest,
};
use crate::collaborators::{
    IngredientRestorer, InventoryAdjuster, InvoiceIssuer, Printer, SpreadsheetExporter,
    SqliteInventory,
};
use crate::config::EngineConfig;
use crate::dispatcher::SideEffectDispatcher;
use crate::error::{EngineError, EngineResult};
use crate::invoice_retry::{InvoiceRetryHandle, InvoiceRetryWorker};
use crate::reversal::{
    DeleteSaleRequest, DeletionSummary, RefundOutcome, RefundRequest, ReversalEngine,
};
use crate::settlement::{SettleRequest, SettlementCoordinator};
use crate::tasks::TaskRunner;

/// External services the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub issuer: Arc<dyn InvoiceIssuer>,
    pub printer: Arc<dyn Printer>,
    pub exporter: Arc<dyn SpreadsheetExporter>,
    pub adjuster: Arc<dyn InventoryAdjuster>,
    pub restorer: Arc<dyn IngredientRestorer>,
}

impl Collaborators {
    /// Uses the local stock tables for inventory.
    pub fn new(
        issuer: Arc<dyn InvoiceIssuer>,
        printer: Arc<dyn Printer>,
        exporter: Arc<dyn SpreadsheetExporter>,
    ) -> Self {
        Collaborators {
            issuer,
            printer,
            exporter,
            adjuster: Arc::new(SqliteInventory),
            restorer: Arc::new(SqliteInventory),
        }
    }

    pub fn with_inventory(
        mut self,
        adjuster: Arc<dyn InventoryAdjuster>,
        restorer: Arc<dyn IngredientRestorer>,
    ) -> Self {
        self.adjuster = adjuster;
        self.restorer = restorer;
        self
    }
}

/// A sale with everything needed to reprint or audit it.
#[derive(Debug, Clone, Serialize)]
pub struct SaleDetails {
    pub sale: Sale,
    pub payments: Vec<Payment>,
    pub lines: Vec<OrderItem>,
    pub invoices: Vec<Invoice>,
}

#[derive(Clone)]
pub struct PosEngine {
    db: Database,
    issuer: Arc<dyn InvoiceIssuer>,
    runner: TaskRunner,
    settlement: SettlementCoordinator,
    reversal: ReversalEngine,
    drawer: CashDrawer,
    config: EngineConfig,
}

impl PosEngine {
    pub fn new(db: Database, collaborators: Collaborators, config: &EngineConfig) -> Self {
        let runner = TaskRunner::new(config.side_effects.max_concurrent);

        let dispatcher = SideEffectDispatcher::new(
            db.clone(),
            runner.clone(),
            Arc::clone(&collaborators.issuer),
            Arc::clone(&collaborators.printer),
            Arc::clone(&collaborators.exporter),
        );

        PosEngine {
            settlement: SettlementCoordinator::new(db.clone(), dispatcher.clone()),
            reversal: ReversalEngine::new(
                db.clone(),
                collaborators.adjuster,
                collaborators.restorer,
            ),
            drawer: CashDrawer::new(db.clone(), dispatcher),
            issuer: collaborators.issuer,
            runner,
            db,
            config: config.clone(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Sales
    // =========================================================================

    pub async fn settle(&self, request: &SettleRequest) -> EngineResult<Sale> {
        self.settlement.settle(request).await
    }

    pub async fn refund(&self, request: &RefundRequest) -> EngineResult<RefundOutcome> {
        self.reversal.refund(request).await
    }

    pub async fn delete_sale(&self, request: &DeleteSaleRequest) -> EngineResult<DeletionSummary> {
        self.reversal.delete(request).await
    }

    pub async fn sale_details(&self, sale_id: &str) -> EngineResult<SaleDetails> {
        let sale = self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Sale", sale_id))?;

        let payments = self.db.sales().payments(sale_id).await?;
        let lines = self.db.orders().items(&sale.order_id).await?;
        let invoices = self.db.invoices().for_sale(sale_id).await?;

        Ok(SaleDetails {
            sale,
            payments,
            lines,
            invoices,
        })
    }

    // =========================================================================
    // Cash drawer
    // =========================================================================

    pub async fn open_register(&self, request: &OpenRegisterRequest) -> EngineResult<CashRegister> {
        self.drawer.open(request).await
    }

    pub async fn add_cash_movement(
        &self,
        request: &AddCashMovementRequest,
    ) -> EngineResult<CashMovement> {
        self.drawer.add_movement(request).await
    }

    pub async fn close_register(&self, request: &CloseRegisterRequest) -> EngineResult<CloseOutcome> {
        self.drawer.close(request).await
    }

    pub async fn preview_report(
        &self,
        register_id: &str,
        requested_by: &str,
    ) -> EngineResult<CashRegisterReport> {
        self.drawer.preview_report(register_id, requested_by).await
    }

    /// The report persisted when the register closed.
    pub async fn register_report(&self, register_id: &str) -> EngineResult<CashRegisterReport> {
        self.db
            .cash_registers()
            .report_for(register_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Cash register report", register_id))
    }

    pub async fn register_movements(&self, register_id: &str) -> EngineResult<Vec<CashMovement>> {
        if self.db.cash_registers().get_by_id(register_id).await?.is_none() {
            return Err(EngineError::not_found("Cash register", register_id));
        }
        Ok(self.db.cash_registers().movements(register_id).await?)
    }

    // =========================================================================
    // Background work
    // =========================================================================

    /// Builds the invoice retry worker. The caller spawns `run()`.
    pub fn invoice_retry_worker(&self) -> (InvoiceRetryWorker, InvoiceRetryHandle) {
        InvoiceRetryWorker::new(
            self.db.clone(),
            Arc::clone(&self.issuer),
            self.config.invoice_retry.clone(),
        )
    }

    /// Waits until every scheduled side effect has finished.
    pub async fn drain_side_effects(&self) {
        self.runner.drain().await;
    }
}
