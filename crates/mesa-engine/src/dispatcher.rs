//! # Side-Effect Dispatcher
//!
//! Post-commit work for settlements and register closes. Nothing here can
//! fail the operation that triggered it: every outcome ends up in the logs
//! or in the database (invoice record, retry queue entry).
//!
//! ## Settlement Side Effects
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  invoice requested?                                                     │
//! │    │                                                                    │
//! │    ├── yes ─► [invoice task] issuer.submit(sale)                        │
//! │    │            ├── Ok  ─► record_issued ─► print Fiscal (if print)     │
//! │    │            └── Err ─► record_failure (retry queue), NO printing    │
//! │    │                                                                    │
//! │    └── no ──► [receipt task] print NonFiscal (if print)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tracing::{error, info, warn};

use mesa_core::{CashRegisterReport, ReceiptLayout, Sale};
use mesa_db::Database;

use crate::collaborators::{InvoiceIssuer, Printer, SpreadsheetExporter};
use crate::tasks::TaskRunner;

/// What the cashier asked for at checkout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementEffects {
    pub invoice_requested: bool,
    pub email_invoice: bool,
    pub print_requested: bool,
}

#[derive(Clone)]
pub struct SideEffectDispatcher {
    db: Database,
    runner: TaskRunner,
    issuer: Arc<dyn InvoiceIssuer>,
    printer: Arc<dyn Printer>,
    exporter: Arc<dyn SpreadsheetExporter>,
}

impl SideEffectDispatcher {
    pub fn new(
        db: Database,
        runner: TaskRunner,
        issuer: Arc<dyn InvoiceIssuer>,
        printer: Arc<dyn Printer>,
        exporter: Arc<dyn SpreadsheetExporter>,
    ) -> Self {
        SideEffectDispatcher {
            db,
            runner,
            issuer,
            printer,
            exporter,
        }
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Schedules invoicing and printing for a committed sale.
    pub fn after_settlement(&self, sale: Sale, effects: SettlementEffects) {
        if effects.invoice_requested {
            let db = self.db.clone();
            let issuer = Arc::clone(&self.issuer);
            let printer = Arc::clone(&self.printer);

            self.runner.spawn("invoice", async move {
                issue_invoice(db, issuer, printer, sale, effects).await;
            });
        } else if effects.print_requested {
            let printer = Arc::clone(&self.printer);

            self.runner.spawn("receipt", async move {
                if let Err(e) = printer.print_sale(&sale, ReceiptLayout::NonFiscal).await {
                    warn!(sale_id = %sale.id, error = %e, "Receipt printing failed");
                }
            });
        }
    }

    /// Schedules report printing and the spreadsheet sync for a closed
    /// register. The two run independently.
    pub fn after_register_close(&self, report: CashRegisterReport) {
        let printer = Arc::clone(&self.printer);
        self.runner.spawn("report-print", async move {
            if let Err(e) = printer.print_report(&report).await {
                warn!(register_id = %report.cash_register_id, error = %e, "Report printing failed");
            }
        });

        let exporter = Arc::clone(&self.exporter);
        self.runner.spawn("spreadsheet-sync", async move {
            match exporter.sync_now().await {
                Ok(()) => info!("Spreadsheet sync finished"),
                Err(e) => warn!(error = %e, "Spreadsheet sync failed"),
            }
        });
    }
}

async fn issue_invoice(
    db: Database,
    issuer: Arc<dyn InvoiceIssuer>,
    printer: Arc<dyn Printer>,
    mut sale: Sale,
    effects: SettlementEffects,
) {
    match issuer.submit(&sale, effects.email_invoice).await {
        Ok(issued) => {
            info!(sale_id = %sale.id, reference = %issued.reference, "Invoice issued");

            match db
                .invoices()
                .record_issued(&sale.id, &issued.reference, issued.number.as_deref())
                .await
            {
                Ok(invoice) => sale.invoice_id = Some(invoice.id),
                Err(e) => error!(sale_id = %sale.id, ?e, "Failed to attach issued invoice"),
            }

            if effects.print_requested {
                if let Err(e) = printer.print_sale(&sale, ReceiptLayout::Fiscal).await {
                    warn!(sale_id = %sale.id, error = %e, "Fiscal receipt printing failed");
                }
            }
        }
        Err(e) => {
            // a non-fiscal receipt must not stand in for the fiscal one
            warn!(
                sale_id = %sale.id,
                error = %e,
                print_requested = effects.print_requested,
                "Invoice issuance failed, queued for retry; printing suppressed"
            );

            if let Err(db_err) = db
                .invoices()
                .record_failure(&sale.id, effects.email_invoice, &e.to_string())
                .await
            {
                error!(sale_id = %sale.id, ?db_err, "Failed to queue invoice retry");
            }
        }
    }
}
