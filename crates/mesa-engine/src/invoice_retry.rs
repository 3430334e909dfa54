//! # Invoice Retry Worker
//!
//! Drains `invoice_retry_queue`: sales whose electronic invoice could not be
//! issued right after settlement.
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Invoice Retry Worker                                 │
//! │                                                                         │
//! │  every poll_interval:                                                  │
//! │    pending(batch_size, max_attempts)                                   │
//! │       │                                                                 │
//! │       ▼  per entry                                                      │
//! │    sale already has an invoice? ──yes──► mark_completed                │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │    delete_failed_for_sale   (no duplicate fiscal documents)            │
//! │    issuer.submit(sale)                                                 │
//! │       ├── Ok  ─► record_issued + mark_completed                        │
//! │       └── Err ─► record_attempt_failure (attempts += 1)                │
//! │                                                                         │
//! │  A poll where every submission failed (gateway down) pauses the loop   │
//! │  with exponential backoff, capped at max_backoff_secs.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use mesa_core::InvoiceRetryEntry;
use mesa_db::Database;

use crate::collaborators::InvoiceIssuer;
use crate::config::InvoiceRetrySettings;
use crate::error::EngineResult;

/// Counts for one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrySummary {
    pub attempted: usize,
    pub issued: usize,
    pub failed: usize,
    /// Entries whose sale was already invoiced.
    pub skipped: usize,
}

impl RetrySummary {
    /// True when there was work and none of it succeeded.
    pub fn all_failed(&self) -> bool {
        self.failed > 0 && self.issued == 0
    }
}

enum EntryResult {
    Issued,
    Failed,
    Skipped,
}

/// Background worker resubmitting failed invoices.
pub struct InvoiceRetryWorker {
    db: Database,
    issuer: Arc<dyn InvoiceIssuer>,
    settings: InvoiceRetrySettings,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the retry worker.
#[derive(Clone)]
pub struct InvoiceRetryHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl InvoiceRetryHandle {
    /// Triggers graceful shutdown. Returns false if the worker already
    /// stopped.
    pub async fn shutdown(&self) -> bool {
        self.shutdown_tx.send(()).await.is_ok()
    }
}

impl InvoiceRetryWorker {
    pub fn new(
        db: Database,
        issuer: Arc<dyn InvoiceIssuer>,
        settings: InvoiceRetrySettings,
    ) -> (Self, InvoiceRetryHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = InvoiceRetryWorker {
            db,
            issuer,
            settings,
            shutdown_rx,
        };

        (worker, InvoiceRetryHandle { shutdown_tx })
    }

    /// Runs the retry loop until shutdown.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Invoice retry worker starting");

        let poll_interval = Duration::from_secs(self.settings.poll_interval_secs);
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut backoff = self.create_backoff(poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let pause = match self.process_batch().await {
                        Ok(summary) if summary.all_failed() => backoff.next_backoff(),
                        Ok(_) => {
                            backoff.reset();
                            None
                        }
                        Err(e) => {
                            error!(?e, "Failed to process invoice retry batch");
                            backoff.next_backoff()
                        }
                    };

                    if let Some(duration) = pause {
                        debug!(?duration, "Invoice gateway failing, backing off");
                        tokio::select! {
                            _ = tokio::time::sleep(duration) => {}
                            _ = self.shutdown_rx.recv() => {
                                info!("Shutdown during backoff");
                                break;
                            }
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Invoice retry worker shutting down");
                    break;
                }
            }
        }

        info!("Invoice retry worker stopped");
    }

    /// Resubmits one batch of pending entries.
    pub async fn process_batch(&self) -> EngineResult<RetrySummary> {
        let entries = self
            .db
            .invoices()
            .pending(self.settings.batch_size, self.settings.max_attempts)
            .await?;

        if entries.is_empty() {
            debug!("No pending invoice retries");
            return Ok(RetrySummary::default());
        }

        info!(count = entries.len(), "Retrying invoice submissions");

        let mut summary = RetrySummary::default();

        for entry in &entries {
            summary.attempted += 1;

            match self.retry_entry(entry).await {
                Ok(EntryResult::Issued) => summary.issued += 1,
                Ok(EntryResult::Failed) => summary.failed += 1,
                Ok(EntryResult::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(?e, entry_id = %entry.id, sale_id = %entry.sale_id, "Invoice retry bookkeeping failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn retry_entry(&self, entry: &InvoiceRetryEntry) -> EngineResult<EntryResult> {
        let invoices = self.db.invoices();

        let Some(sale) = self.db.sales().get_by_id(&entry.sale_id).await? else {
            warn!(entry_id = %entry.id, sale_id = %entry.sale_id, "Sale for invoice retry not found");
            invoices
                .record_attempt_failure(&entry.id, "sale not found", Utc::now())
                .await?;
            return Ok(EntryResult::Failed);
        };

        if sale.invoice_id.is_some() {
            debug!(sale_id = %sale.id, "Sale already invoiced, closing retry entry");
            invoices.mark_completed(&entry.id, Utc::now()).await?;
            return Ok(EntryResult::Skipped);
        }

        invoices.delete_failed_for_sale(&sale.id).await?;

        match self.issuer.submit(&sale, entry.send_email).await {
            Ok(issued) => {
                invoices
                    .record_issued(&sale.id, &issued.reference, issued.number.as_deref())
                    .await?;
                invoices.mark_completed(&entry.id, Utc::now()).await?;

                info!(
                    sale_id = %sale.id,
                    reference = %issued.reference,
                    attempt = entry.attempts + 1,
                    "Invoice issued on retry"
                );
                Ok(EntryResult::Issued)
            }
            Err(e) => {
                let attempts = entry.attempts + 1;
                if attempts >= i64::from(self.settings.max_attempts) {
                    warn!(sale_id = %sale.id, attempts, error = %e, "Invoice retries exhausted");
                } else {
                    debug!(sale_id = %sale.id, attempts, error = %e, "Invoice retry failed");
                }

                invoices
                    .record_attempt_failure(&entry.id, &e.to_string(), Utc::now())
                    .await?;
                Ok(EntryResult::Failed)
            }
        }
    }

    fn create_backoff(&self, initial: Duration) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: initial,
            max_interval: Duration::from_secs(self.settings.max_backoff_secs).max(initial),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_all_failed() {
        assert!(!RetrySummary::default().all_failed());

        let summary = RetrySummary {
            attempted: 2,
            failed: 2,
            ..Default::default()
        };
        assert!(summary.all_failed());

        let summary = RetrySummary {
            attempted: 2,
            failed: 1,
            issued: 1,
            ..Default::default()
        };
        assert!(!summary.all_failed());
    }
}
