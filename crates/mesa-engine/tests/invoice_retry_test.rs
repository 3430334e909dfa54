//! Invoice retry worker integration tests.

mod common;

use std::time::Duration;

use common::{money, TestPos, EMPLOYEE};
use mesa_core::{InvoiceStatus, ProposedPayment, Sale};
use mesa_engine::{InvoiceRetrySettings, InvoiceRetryWorker, SettleRequest};

/// Settles a 10 000 cash sale with an invoice while the gateway is down.
async fn sale_with_failed_invoice(pos: &TestPos) -> Sale {
    pos.seed_product("burger", 10_000, 10).await;
    let order_id = pos.seed_order(&[("burger", 1, 10_000)], None).await;

    pos.issuer.set_failing(true);
    let sale = pos
        .engine
        .settle(
            &SettleRequest::new(
                &order_id,
                EMPLOYEE,
                vec![ProposedPayment::new("cash", money(10_000))],
            )
            .with_invoice(true),
        )
        .await
        .unwrap();
    pos.engine.drain_side_effects().await;

    assert_eq!(pos.db.invoices().pending_for_sale(&sale.id).await.unwrap().len(), 1);
    sale
}

#[tokio::test]
async fn test_retry_issues_invoice_once_gateway_recovers() {
    let pos = TestPos::in_memory().await;
    let sale = sale_with_failed_invoice(&pos).await;
    let (worker, _handle) = pos.engine.invoice_retry_worker();

    let summary = worker.process_batch().await.unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.failed, 1);
    assert!(summary.all_failed());

    let pending = pos.db.invoices().pending_for_sale(&sale.id).await.unwrap();
    assert_eq!(pending[0].attempts, 1);
    assert!(pending[0].last_error.is_some());

    pos.issuer.set_failing(false);
    let summary = worker.process_batch().await.unwrap();
    assert_eq!(summary.issued, 1);
    assert!(!summary.all_failed());

    let details = pos.engine.sale_details(&sale.id).await.unwrap();
    assert!(details.sale.invoice_id.is_some());
    // Failed attempts are cleared before resubmitting
    assert_eq!(details.invoices.len(), 1);
    assert_eq!(details.invoices[0].status, InvoiceStatus::Issued);

    assert!(pos.db.invoices().pending_for_sale(&sale.id).await.unwrap().is_empty());
    // Email preference carried through the queue
    assert!(pos.issuer.submissions().iter().all(|(_, email)| *email));
    assert_eq!(pos.issuer.submissions().len(), 3);

    let summary = worker.process_batch().await.unwrap();
    assert_eq!(summary.attempted, 0);
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    let pos = TestPos::in_memory().await;
    let sale = sale_with_failed_invoice(&pos).await;

    let settings = InvoiceRetrySettings {
        max_attempts: 2,
        ..Default::default()
    };
    let (worker, _handle) =
        InvoiceRetryWorker::new(pos.db.clone(), pos.issuer.clone(), settings);

    assert_eq!(worker.process_batch().await.unwrap().failed, 1);
    assert_eq!(worker.process_batch().await.unwrap().failed, 1);
    assert_eq!(worker.process_batch().await.unwrap().attempted, 0);

    let pending = pos.db.invoices().pending_for_sale(&sale.id).await.unwrap();
    assert_eq!(pending[0].attempts, 2);
}

#[tokio::test]
async fn test_retry_skips_sales_already_invoiced() {
    let pos = TestPos::in_memory().await;
    let sale = sale_with_failed_invoice(&pos).await;

    pos.db
        .invoices()
        .record_issued(&sale.id, "CUFE-manual", None)
        .await
        .unwrap();

    let (worker, _handle) = pos.engine.invoice_retry_worker();
    let summary = worker.process_batch().await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(pos.issuer.submissions().len(), 1);
    assert!(pos.db.invoices().pending_for_sale(&sale.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_worker_runs_until_shutdown() {
    let pos = TestPos::in_memory().await;
    let sale = sale_with_failed_invoice(&pos).await;
    pos.issuer.set_failing(false);

    let (worker, handle) = pos.engine.invoice_retry_worker();
    let task = tokio::spawn(worker.run());

    // The first tick fires immediately
    let mut drained = false;
    for _ in 0..50 {
        if pos.db.invoices().pending_for_sale(&sale.id).await.unwrap().is_empty() {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(drained, "worker never processed the queue");

    assert!(handle.shutdown().await);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("worker stopped")
        .unwrap();

    assert!(!handle.shutdown().await);
}
