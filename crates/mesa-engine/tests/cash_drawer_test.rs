//! Cash-drawer session integration tests: open, movements, preview and
//! close.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{money, TestPos, EMPLOYEE};
use mesa_core::{
    CashMovementKind, CashRegister, CashRegisterStatus, ReconciliationOutcome, OPENING_REFERENCE,
};
use mesa_db::CashRegisterRepository;
use mesa_engine::{
    AddCashMovementRequest, CloseRegisterRequest, ErrorKind, OpenRegisterRequest, RefundRequest,
};

fn movement(register_id: &str, kind: CashMovementKind, amount: i64) -> AddCashMovementRequest {
    AddCashMovementRequest {
        cash_register_id: register_id.to_string(),
        movement_type: kind,
        amount: money(amount),
        description: "Change run".to_string(),
        employee_id: EMPLOYEE.to_string(),
    }
}

fn close(register_id: &str, counted: i64) -> CloseRegisterRequest {
    CloseRegisterRequest {
        cash_register_id: register_id.to_string(),
        counted_amount: money(counted),
        notes: Some("end of shift".to_string()),
        employee_id: EMPLOYEE.to_string(),
    }
}

#[tokio::test]
async fn test_open_records_opening_float() {
    let pos = TestPos::in_memory().await;
    let register_id = pos.open_register(100_000).await;

    let movements = pos.engine.register_movements(&register_id).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, CashMovementKind::Deposit);
    assert_eq!(movements[0].amount, money(100_000));
    assert_eq!(movements[0].reference.as_deref(), Some(OPENING_REFERENCE));

    // The float counts once, through the opening amount
    let report = pos.engine.preview_report(&register_id, EMPLOYEE).await.unwrap();
    assert_eq!(report.opening_amount, money(100_000));
    assert_eq!(report.deposits_total, money(0));
    assert_eq!(report.expected_amount, money(100_000));
}

#[tokio::test]
async fn test_single_open_register_per_employee() {
    let pos = TestPos::in_memory().await;
    let register_id = pos.open_register(50_000).await;

    let err = pos
        .engine
        .open_register(&OpenRegisterRequest {
            employee_id: EMPLOYEE.to_string(),
            opening_amount: money(10_000),
            notes: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.to_string().contains(&register_id));
    assert_eq!(pos.db.cash_registers().count_for_employee(EMPLOYEE).await.unwrap(), 1);

    pos.engine.close_register(&close(&register_id, 50_000)).await.unwrap();

    let reopened = pos.open_register(60_000).await;
    assert_ne!(reopened, register_id);
    assert_eq!(pos.db.cash_registers().count_for_employee(EMPLOYEE).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_open_racing_a_committing_register_is_precondition() {
    let dir = tempfile::tempdir().unwrap();
    let pos = TestPos::on_disk(&dir.path().join("drawer.db")).await;

    // Another terminal inserts an open register and holds the write lock
    let now = Utc::now();
    let rival = CashRegister {
        id: uuid::Uuid::new_v4().to_string(),
        employee_id: EMPLOYEE.to_string(),
        opening_amount: money(10_000),
        status: CashRegisterStatus::Open,
        opened_at: now,
        closed_at: None,
        closing_amount: None,
        expected_amount: None,
        difference: None,
        notes: None,
        updated_at: now,
    };
    let mut tx = pos.db.begin().await.unwrap();
    CashRegisterRepository::insert(&mut tx, &rival).await.unwrap();

    // The read check sees no open register yet; the insert waits on the lock
    let engine = pos.engine.clone();
    let opening = tokio::spawn(async move {
        engine
            .open_register(&OpenRegisterRequest {
                employee_id: EMPLOYEE.to_string(),
                opening_amount: money(20_000),
                notes: None,
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    tx.commit().await.unwrap();

    let err = opening.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    assert_eq!(pos.db.cash_registers().count_for_employee(EMPLOYEE).await.unwrap(), 1);
    let open = pos
        .db
        .cash_registers()
        .find_open_for_employee(EMPLOYEE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(open.id, rival.id);
}

#[tokio::test]
async fn test_expected_cash_formula() {
    let pos = TestPos::in_memory().await;
    pos.seed_product("burger", 25_000, 10).await;
    let register_id = pos.open_register(100_000).await;

    pos.cash_sale(&register_id, "cash", 25_000).await;
    pos.cash_sale(&register_id, "card", 12_000).await;
    pos.engine
        .add_cash_movement(&movement(&register_id, CashMovementKind::Deposit, 5_000))
        .await
        .unwrap();
    pos.engine
        .add_cash_movement(&movement(&register_id, CashMovementKind::Withdrawal, 3_000))
        .await
        .unwrap();

    let preview = pos.engine.preview_report(&register_id, EMPLOYEE).await.unwrap();
    assert_eq!(preview.expected_amount, money(127_000));
    assert_eq!(preview.difference, money(0));
    assert_eq!(preview.cash_sales, money(25_000));
    assert_eq!(preview.card_sales, money(12_000));
    assert_eq!(preview.deposits_total, money(5_000));
    assert_eq!(preview.withdrawals_total, money(3_000));

    // Previews write nothing
    assert!(pos.engine.register_report(&register_id).await.is_err());

    let closed = pos
        .engine
        .close_register(&close(&register_id, 127_000))
        .await
        .unwrap();

    assert_eq!(closed.outcome, ReconciliationOutcome::Balanced);
    assert_eq!(closed.register.status, CashRegisterStatus::Closed);
    assert_eq!(closed.register.expected_amount, Some(money(127_000)));
    assert_eq!(closed.register.difference, Some(money(0)));
    assert_eq!(closed.report.total_sales, money(37_000));
    assert_eq!(closed.report.sales_count, 2);
}

#[tokio::test]
async fn test_close_with_shortfall_persists_report() {
    let pos = TestPos::in_memory().await;
    pos.seed_product("burger", 25_000, 10).await;
    let register_id = pos.open_register(100_000).await;
    pos.cash_sale(&register_id, "cash", 25_000).await;

    let closed = pos
        .engine
        .close_register(&close(&register_id, 124_000))
        .await
        .unwrap();

    assert_eq!(closed.outcome, ReconciliationOutcome::Shortfall);
    assert_eq!(closed.report.difference, money(-1_000));
    assert_eq!(closed.report.closing_amount, money(124_000));

    let stored = pos.db.cash_registers().get_by_id(&register_id).await.unwrap().unwrap();
    assert_eq!(stored.status, CashRegisterStatus::Closed);
    assert_eq!(stored.closing_amount, Some(money(124_000)));
    assert_eq!(stored.difference, Some(money(-1_000)));
    assert_eq!(stored.notes.as_deref(), Some("end of shift"));

    let report = pos.engine.register_report(&register_id).await.unwrap();
    assert_eq!(report.id, closed.report.id);
    assert_eq!(report.expected_amount, money(125_000));
    assert_eq!(report.difference, money(-1_000));
    assert_eq!(report.generated_by, EMPLOYEE);

    pos.engine.drain_side_effects().await;
    assert_eq!(pos.printer.printed_reports(), vec![register_id.clone()]);
    assert_eq!(pos.exporter.syncs(), 1);
}

#[tokio::test]
async fn test_round_trip_close_reports_non_refunded_sales() {
    let pos = TestPos::in_memory().await;
    pos.seed_product("burger", 10_000, 50).await;
    let register_id = pos.open_register(100_000).await;

    pos.cash_sale(&register_id, "cash", 25_000).await;
    pos.cash_sale(&register_id, "transfer", 12_000).await;
    let refunded = pos.cash_sale(&register_id, "cash", 8_000).await;

    pos.engine
        .refund(&RefundRequest {
            sale_id: refunded.id.clone(),
            amount: money(8_000),
            reason: "wrong table".to_string(),
            employee_id: EMPLOYEE.to_string(),
        })
        .await
        .unwrap();

    let preview = pos.engine.preview_report(&register_id, EMPLOYEE).await.unwrap();

    let closed = pos
        .engine
        .close_register(&close(&register_id, preview.expected_amount.minor()))
        .await
        .unwrap();

    assert_eq!(closed.report.difference, money(0));
    assert_eq!(closed.outcome, ReconciliationOutcome::Balanced);
    assert_eq!(closed.report.expected_amount, preview.expected_amount);
    assert_eq!(closed.report.total_sales, money(37_000));
    assert_eq!(closed.report.sales_count, 2);
    assert_eq!(closed.report.digital_sales, money(12_000));
    assert_eq!(closed.report.refunds_count, 1);
    assert_eq!(closed.report.refunds_total, money(8_000));
}

#[tokio::test]
async fn test_closed_register_is_terminal() {
    let pos = TestPos::in_memory().await;
    let register_id = pos.open_register(20_000).await;
    pos.engine.close_register(&close(&register_id, 20_000)).await.unwrap();

    let err = pos
        .engine
        .close_register(&close(&register_id, 20_000))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let err = pos
        .engine
        .add_cash_movement(&movement(&register_id, CashMovementKind::Deposit, 1_000))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let err = pos
        .engine
        .preview_report(&register_id, EMPLOYEE)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[tokio::test]
async fn test_movement_requests_are_checked() {
    let pos = TestPos::in_memory().await;
    let register_id = pos.open_register(20_000).await;

    let err = pos
        .engine
        .add_cash_movement(&movement(&register_id, CashMovementKind::Refund, 1_000))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = pos
        .engine
        .add_cash_movement(&movement(&register_id, CashMovementKind::Deposit, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = pos
        .engine
        .add_cash_movement(&movement("no-such-register", CashMovementKind::Deposit, 1_000))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = pos.engine.register_movements("no-such-register").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
