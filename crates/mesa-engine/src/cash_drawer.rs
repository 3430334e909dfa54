//! # Cash-Drawer Session Manager
//!
//! One register session per employee shift.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   open(employee, float) ──► OPEN ──add_movement()*──► close(counted)    │
//! │        │                     │                            │             │
//! │        │                     │ preview_report()           ▼             │
//! │        ▼                     │ (no writes)             CLOSED          │
//! │   deposit movement           │                     expected, closing,   │
//! │   reference = OPENING        │                     difference stored;   │
//! │                              │                     report persisted;    │
//! │                              │                     print + spreadsheet  │
//! │                              │                     sync in background   │
//! │                                                                         │
//! │   expected = opening + deposits (non-OPENING) − withdrawals             │
//! │              + cash tendered on sales placed in the register            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sales never write movements; cash sales are read from `payments` at
//! close time. Refunds write a negative `refund` movement that is reported
//! but does not change the expected amount.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use mesa_core::validation::{
    validate_non_negative_amount, validate_positive_amount, validate_required, validate_text,
};
use mesa_core::{
    build_report, CashMovement, CashMovementKind, CashRegister, CashRegisterReport,
    CashRegisterStatus, Money, ReconciliationOutcome, ValidationError, OPENING_REFERENCE,
};
use mesa_db::{CashRegisterRepository, Database, RegisterClosing};

use crate::dispatcher::SideEffectDispatcher;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Requests / Responses
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRegisterRequest {
    pub employee_id: String,
    pub opening_amount: Money,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OpenRegisterRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("employee id", &self.employee_id)?;
        validate_non_negative_amount("opening amount", self.opening_amount)?;
        if let Some(notes) = &self.notes {
            validate_text("notes", notes)?;
        }
        Ok(())
    }
}

/// A manual deposit into or withdrawal from an open drawer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCashMovementRequest {
    pub cash_register_id: String,
    pub movement_type: CashMovementKind,
    /// Always positive; the type gives the direction.
    pub amount: Money,
    pub description: String,
    pub employee_id: String,
}

impl AddCashMovementRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("cash register id", &self.cash_register_id)?;
        if !matches!(
            self.movement_type,
            CashMovementKind::Deposit | CashMovementKind::Withdrawal
        ) {
            return Err(ValidationError::InvalidFormat {
                field: "movement type".to_string(),
                reason: "only deposits and withdrawals can be added manually".to_string(),
            });
        }
        validate_positive_amount("movement amount", self.amount)?;
        validate_required("description", &self.description)?;
        validate_text("description", &self.description)?;
        validate_required("employee id", &self.employee_id)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRegisterRequest {
    pub cash_register_id: String,
    /// Cash physically counted in the drawer.
    pub counted_amount: Money,
    #[serde(default)]
    pub notes: Option<String>,
    /// Who closed the session; recorded on the report.
    pub employee_id: String,
}

impl CloseRegisterRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("cash register id", &self.cash_register_id)?;
        validate_non_negative_amount("counted amount", self.counted_amount)?;
        if let Some(notes) = &self.notes {
            validate_text("notes", notes)?;
        }
        validate_required("employee id", &self.employee_id)?;
        Ok(())
    }
}

/// Result of closing a register.
#[derive(Debug, Clone, Serialize)]
pub struct CloseOutcome {
    pub register: CashRegister,
    pub report: CashRegisterReport,
    /// Shortfall, overage or exact match.
    pub outcome: ReconciliationOutcome,
}

// =============================================================================
// Session Manager
// =============================================================================

#[derive(Clone)]
pub struct CashDrawer {
    db: Database,
    dispatcher: SideEffectDispatcher,
}

impl CashDrawer {
    pub fn new(db: Database, dispatcher: SideEffectDispatcher) -> Self {
        CashDrawer { db, dispatcher }
    }

    /// Opens a session and records the opening float as a deposit tagged
    /// `OPENING`.
    ///
    /// An employee holds at most one open register. The read below gives
    /// the friendly error; the partial unique index settles races.
    pub async fn open(&self, request: &OpenRegisterRequest) -> EngineResult<CashRegister> {
        request.validate()?;

        let employee_id = request.employee_id.as_str();

        if let Some(existing) = self
            .db
            .cash_registers()
            .find_open_for_employee(employee_id)
            .await?
        {
            return Err(already_open(employee_id, Some(&existing.id)));
        }

        let now = Utc::now();
        let notes = request
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let register = CashRegister {
            id: Uuid::new_v4().to_string(),
            employee_id: employee_id.to_string(),
            opening_amount: request.opening_amount,
            status: CashRegisterStatus::Open,
            opened_at: now,
            closed_at: None,
            closing_amount: None,
            expected_amount: None,
            difference: None,
            notes,
            updated_at: now,
        };

        let opening = CashMovement {
            id: Uuid::new_v4().to_string(),
            cash_register_id: register.id.clone(),
            movement_type: CashMovementKind::Deposit,
            amount: request.opening_amount,
            description: "Opening float".to_string(),
            reference: Some(OPENING_REFERENCE.to_string()),
            employee_id: employee_id.to_string(),
            created_at: now,
        };

        let mut tx = self.db.begin().await?;

        CashRegisterRepository::insert(&mut tx, &register)
            .await
            .map_err(|e| {
                if e.is_unique_violation_on("cash_registers.employee_id") {
                    already_open(employee_id, None)
                } else {
                    EngineError::from(e)
                }
            })?;
        CashRegisterRepository::insert_movement(&mut tx, &opening).await?;

        tx.commit().await?;

        info!(
            register_id = %register.id,
            employee_id = %employee_id,
            opening_amount = %register.opening_amount,
            "Cash register opened"
        );

        Ok(register)
    }

    /// Records a manual deposit or withdrawal on an open register.
    pub async fn add_movement(&self, request: &AddCashMovementRequest) -> EngineResult<CashMovement> {
        request.validate()?;

        let register_id = request.cash_register_id.as_str();
        let mut tx = self.db.begin().await?;

        CashRegisterRepository::lock(&mut tx, register_id).await?;
        CashRegisterRepository::find(&mut tx, register_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Cash register", register_id))?
            .ensure_open()?;

        let movement = CashMovement {
            id: Uuid::new_v4().to_string(),
            cash_register_id: register_id.to_string(),
            movement_type: request.movement_type,
            amount: request.amount,
            description: request.description.trim().to_string(),
            reference: None,
            employee_id: request.employee_id.clone(),
            created_at: Utc::now(),
        };

        CashRegisterRepository::insert_movement(&mut tx, &movement).await?;
        tx.commit().await?;

        info!(
            register_id = %register_id,
            movement_type = ?movement.movement_type,
            amount = %movement.amount,
            "Cash movement recorded"
        );

        Ok(movement)
    }

    /// Closes the session, stores the reconciliation and its report, then
    /// prints and exports in the background.
    pub async fn close(&self, request: &CloseRegisterRequest) -> EngineResult<CloseOutcome> {
        request.validate()?;

        let register_id = request.cash_register_id.as_str();
        let mut tx = self.db.begin().await?;

        CashRegisterRepository::lock(&mut tx, register_id).await?;

        let register = CashRegisterRepository::find(&mut tx, register_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Cash register", register_id))?;
        register.ensure_open()?;

        let ledger = CashRegisterRepository::ledger(&mut tx, &register).await?;
        let now = Utc::now();

        let report = build_report(
            Uuid::new_v4().to_string(),
            &register,
            &ledger,
            Some(request.counted_amount),
            &request.employee_id,
            now,
        );

        let notes = request
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let closing = RegisterClosing {
            closing_amount: request.counted_amount,
            expected_amount: report.expected_amount,
            difference: report.difference,
            notes,
            closed_at: now,
        };

        CashRegisterRepository::close(&mut tx, register_id, &closing).await?;
        CashRegisterRepository::insert_report(&mut tx, &report).await?;

        tx.commit().await?;

        let outcome = report.outcome();

        if outcome == ReconciliationOutcome::Balanced {
            info!(register_id = %register_id, expected = %report.expected_amount, "Cash register closed: exact match");
        } else {
            warn!(
                register_id = %register_id,
                expected = %report.expected_amount,
                counted = %report.closing_amount,
                difference = %report.difference,
                outcome = %outcome,
                "Cash register closed with a difference"
            );
        }

        let register = CashRegister {
            status: CashRegisterStatus::Closed,
            closed_at: Some(now),
            closing_amount: Some(request.counted_amount),
            expected_amount: Some(report.expected_amount),
            difference: Some(report.difference),
            notes: notes.map(str::to_string).or(register.notes),
            updated_at: now,
            ..register
        };

        self.dispatcher.after_register_close(report.clone());

        Ok(CloseOutcome {
            register,
            report,
            outcome,
        })
    }

    /// The report `close` would produce right now, with the counted amount
    /// taken as the expected one. Nothing is written.
    pub async fn preview_report(
        &self,
        register_id: &str,
        requested_by: &str,
    ) -> EngineResult<CashRegisterReport> {
        let register = self
            .db
            .cash_registers()
            .get_by_id(register_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Cash register", register_id))?;
        register.ensure_open()?;

        let ledger = self.db.cash_registers().ledger_snapshot(&register).await?;

        Ok(build_report(
            Uuid::new_v4().to_string(),
            &register,
            &ledger,
            None,
            requested_by,
            Utc::now(),
        ))
    }
}

fn already_open(employee_id: &str, register_id: Option<&str>) -> EngineError {
    match register_id {
        Some(id) => EngineError::precondition(format!(
            "Employee {employee_id} already has an open cash register ({id})"
        )),
        None => EngineError::precondition(format!(
            "Employee {employee_id} already has an open cash register"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(kind: CashMovementKind, amount: i64) -> AddCashMovementRequest {
        AddCashMovementRequest {
            cash_register_id: "reg-1".into(),
            movement_type: kind,
            amount: Money::from_minor(amount),
            description: "Change for the float".into(),
            employee_id: "emp-1".into(),
        }
    }

    #[test]
    fn test_only_manual_kinds_accepted() {
        assert!(movement(CashMovementKind::Deposit, 5_000).validate().is_ok());
        assert!(movement(CashMovementKind::Withdrawal, 3_000).validate().is_ok());
        assert!(movement(CashMovementKind::Sale, 3_000).validate().is_err());
        assert!(movement(CashMovementKind::Refund, 3_000).validate().is_err());
    }

    #[test]
    fn test_movement_amount_must_be_positive() {
        assert!(matches!(
            movement(CashMovementKind::Withdrawal, -10).validate(),
            Err(ValidationError::MustBePositive { .. })
        ));
    }

    #[test]
    fn test_open_allows_zero_float() {
        let request = OpenRegisterRequest {
            employee_id: "emp-1".into(),
            opening_amount: Money::zero(),
            notes: None,
        };
        assert!(request.validate().is_ok());

        let request = OpenRegisterRequest {
            opening_amount: Money::from_minor(-1),
            ..request
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_already_open_message() {
        let err = already_open("emp-7", Some("reg-3"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Precondition);
        assert!(err.to_string().contains("reg-3"));
    }
}
