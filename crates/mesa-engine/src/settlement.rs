//! # Settlement Coordinator
//!
//! Turns an open order into a sale.
//!
//! ## Settlement Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Load order (pool)          ── early exit if paid / cancelled        │
//! │  2. Validate payments          ── ValidationError, no lock taken        │
//! │  3. Resolve customer           ── upsert or generic; fiscal check       │
//! │  4. Register guard             ── exists and open                       │
//! │                                                                         │
//! │  ┌──────────────── single transaction ───────────────────────────────┐  │
//! │  │ 5. Lock order row, re-read  ── paid/cancelled now? → Conflict     │  │
//! │  │ 6. INSERT sale, INSERT payment × N                                │  │
//! │  │ 7. order → paid (+ sale_id), release table                        │  │
//! │  └──────────────────────────────── COMMIT ───────────────────────────┘  │
//! │                                                                         │
//! │  8. Dispatch invoice / print in the background                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The optimistic check in step 1 is only an early exit. Correctness comes
//! from the re-check under the lock in step 5: of N concurrent settlements
//! of one order exactly one commits.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use mesa_core::validation::{
    validate_customer_input, validate_payments, validate_required, validate_text,
};
use mesa_core::{
    CoreError, Customer, CustomerInput, InvoiceType, Payment, PaymentMethod,
    ProposedPayment, Sale, SaleStatus,
};
use mesa_db::{
    generate_payment_id, generate_sale_number, CashRegisterRepository, Database, OrderRepository,
    SaleRepository,
};

use crate::dispatcher::{SettlementEffects, SideEffectDispatcher};
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Request
// =============================================================================

/// Everything the cashier submits at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleRequest {
    pub order_id: String,
    pub payments: Vec<ProposedPayment>,
    /// `None` bills the generic end consumer.
    #[serde(default)]
    pub customer: Option<CustomerInput>,
    #[serde(default)]
    pub invoice_requested: bool,
    /// Ask the invoice gateway to email the document to the customer.
    #[serde(default)]
    pub email_invoice: bool,
    pub employee_id: String,
    #[serde(default)]
    pub cash_register_id: Option<String>,
    #[serde(default)]
    pub print_requested: bool,
}

impl SettleRequest {
    pub fn new(
        order_id: impl Into<String>,
        employee_id: impl Into<String>,
        payments: Vec<ProposedPayment>,
    ) -> Self {
        SettleRequest {
            order_id: order_id.into(),
            payments,
            customer: None,
            invoice_requested: false,
            email_invoice: false,
            employee_id: employee_id.into(),
            cash_register_id: None,
            print_requested: false,
        }
    }

    pub fn with_customer(mut self, customer: CustomerInput) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn with_register(mut self, register_id: impl Into<String>) -> Self {
        self.cash_register_id = Some(register_id.into());
        self
    }

    pub fn with_invoice(mut self, email: bool) -> Self {
        self.invoice_requested = true;
        self.email_invoice = email;
        self
    }

    pub fn with_print(mut self) -> Self {
        self.print_requested = true;
        self
    }

    fn effects(&self) -> SettlementEffects {
        SettlementEffects {
            invoice_requested: self.invoice_requested,
            email_invoice: self.invoice_requested && self.email_invoice,
            print_requested: self.print_requested,
        }
    }

    fn validate(&self) -> Result<(), mesa_core::ValidationError> {
        validate_required("order id", &self.order_id)?;
        validate_required("employee id", &self.employee_id)?;
        if let Some(register_id) = &self.cash_register_id {
            validate_text("cash register id", register_id)?;
        }
        Ok(())
    }
}

// =============================================================================
// Coordinator
// =============================================================================

#[derive(Clone)]
pub struct SettlementCoordinator {
    db: Database,
    dispatcher: SideEffectDispatcher,
}

impl SettlementCoordinator {
    pub fn new(db: Database, dispatcher: SideEffectDispatcher) -> Self {
        SettlementCoordinator { db, dispatcher }
    }

    /// Settles an order. Returns the committed sale; background effects are
    /// already scheduled when this returns.
    pub async fn settle(&self, request: &SettleRequest) -> EngineResult<Sale> {
        request.validate()?;

        let order_id = request.order_id.as_str();

        // Optimistic: a cheap early exit, re-checked under the lock
        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        order.ensure_settleable()?;

        let methods = self.db.payment_methods().catalogue().await?;
        validate_payments(order.total, &request.payments, &methods)?;

        let customer = self
            .resolve_customer(request.customer.as_ref(), request.invoice_requested)
            .await?;

        if let Some(register_id) = &request.cash_register_id {
            self.db
                .cash_registers()
                .get_by_id(register_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Cash register", register_id.as_str()))?
                .ensure_open()?;
        }

        let sale = self.commit_sale(request, &customer, &methods).await?;

        info!(
            sale_id = %sale.id,
            sale_number = %sale.sale_number,
            order_id = %sale.order_id,
            total = %sale.total,
            payments = request.payments.len(),
            "Order settled"
        );

        self.dispatcher.after_settlement(sale.clone(), request.effects());

        Ok(sale)
    }

    /// The locked part of the settlement. Any error drops `tx`, which rolls
    /// everything back.
    async fn commit_sale(
        &self,
        request: &SettleRequest,
        customer: &Customer,
        methods: &HashMap<String, PaymentMethod>,
    ) -> EngineResult<Sale> {
        let order_id = request.order_id.as_str();
        let mut tx = self.db.begin().await?;

        OrderRepository::lock(&mut tx, order_id).await?;

        let order = OrderRepository::find(&mut tx, order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;

        if let Err(e) = order.ensure_settleable() {
            debug!(order_id = %order_id, status = %order.status, "Lost settlement race");
            return Err(EngineError::conflict(e.to_string()));
        }

        // The total may have moved since the optimistic read
        validate_payments(order.total, &request.payments, methods)?;

        if let Some(register_id) = &request.cash_register_id {
            CashRegisterRepository::find(&mut tx, register_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Cash register", register_id.as_str()))?
                .ensure_open()?;
        }

        let now = Utc::now();
        let invoice_type = if request.invoice_requested {
            InvoiceType::Electronic
        } else {
            InvoiceType::Receipt
        };

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            sale_number: generate_sale_number(now),
            order_id: order.id.clone(),
            customer_id: customer.id.clone(),
            subtotal: order.subtotal,
            tax: order.tax,
            discount: order.discount,
            total: order.total,
            status: SaleStatus::Completed,
            cash_register_id: request.cash_register_id.clone(),
            employee_id: request.employee_id.clone(),
            invoice_type,
            needs_electronic_invoice: request.invoice_requested,
            invoice_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };

        SaleRepository::insert(&mut tx, &sale).await?;

        for proposed in &request.payments {
            let payment = Payment {
                id: generate_payment_id(),
                sale_id: sale.id.clone(),
                payment_method_id: proposed.payment_method_id.clone(),
                amount: proposed.amount,
                reference: proposed.reference.clone(),
                created_at: now,
            };
            SaleRepository::insert_payment(&mut tx, &payment).await?;
        }

        OrderRepository::mark_paid(&mut tx, &order.id, &sale.id, now).await?;

        if let Some(table_id) = &order.table_id {
            OrderRepository::release_table(&mut tx, table_id, now).await?;
        }

        tx.commit().await?;

        Ok(sale)
    }

    /// Supplied customer → create-or-update by identification number;
    /// otherwise the generic end consumer.
    async fn resolve_customer(
        &self,
        input: Option<&CustomerInput>,
        fiscal: bool,
    ) -> EngineResult<Customer> {
        let customer = match input {
            Some(input) => {
                if fiscal {
                    ensure_fiscal_fields(input)?;
                }
                validate_customer_input(input)?;
                self.db.customers().upsert(input).await?
            }
            None => self.db.customers().generic().await?,
        };

        if fiscal {
            customer.ensure_fiscal_ready()?;
        }

        Ok(customer)
    }
}

fn ensure_fiscal_fields(input: &CustomerInput) -> Result<(), CoreError> {
    if input.identification_number.trim().is_empty() {
        return Err(CoreError::FiscalCustomerIncomplete {
            field: "identification number".to_string(),
        });
    }
    if input.name.trim().is_empty() {
        return Err(CoreError::FiscalCustomerIncomplete {
            field: "name".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesa_core::Money;

    #[test]
    fn test_request_builders() {
        let request = SettleRequest::new(
            "ord-1",
            "emp-1",
            vec![ProposedPayment::new("cash", Money::from_minor(10_000))],
        )
        .with_register("reg-1")
        .with_invoice(true)
        .with_print();

        assert_eq!(request.cash_register_id.as_deref(), Some("reg-1"));
        let effects = request.effects();
        assert!(effects.invoice_requested);
        assert!(effects.email_invoice);
        assert!(effects.print_requested);
    }

    #[test]
    fn test_email_ignored_without_invoice() {
        let mut request = SettleRequest::new("ord-1", "emp-1", vec![]);
        request.email_invoice = true;
        assert!(!request.effects().email_invoice);
    }

    #[test]
    fn test_request_requires_ids() {
        let request = SettleRequest::new("", "emp-1", vec![]);
        assert!(request.validate().is_err());

        let request = SettleRequest::new("ord-1", "  ", vec![]);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_fiscal_fields() {
        let mut input = CustomerInput {
            identification_number: "900123456".into(),
            name: "Acme SAS".into(),
            email: None,
            phone: None,
        };
        assert!(ensure_fiscal_fields(&input).is_ok());

        input.name = " ".into();
        assert!(matches!(
            ensure_fiscal_fields(&input),
            Err(CoreError::FiscalCustomerIncomplete { .. })
        ));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{
            "order_id": "ord-1",
            "employee_id": "emp-1",
            "payments": [{"payment_method_id": "cash", "amount": 44500}]
        }"#;

        let request: SettleRequest = serde_json::from_str(json).unwrap();
        assert!(request.customer.is_none());
        assert!(!request.invoice_requested);
        assert_eq!(request.payments[0].amount, Money::from_minor(44_500));
    }
}
