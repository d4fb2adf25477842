//! Invoice create / update / delete orchestration.
//!
//! Every operation validates first and mutates second. Validation reads
//! committed state and collects every problem it finds; nothing is written
//! until all of it passes. The mutations then run in a single unit of work,
//! with the store's conditional decrement as the final word on stock.

use crate::config::InvoicingSettings;
use crate::error::WorkflowError;
use crate::models::{
    ActivityAction, ActivityTarget, Customer, Identity, Invoice, InvoiceIntent, InvoicePatch,
    InvoiceStatus, LineItem, LineRequest, StockItem,
};
use crate::services::activity_log::ActivityLog;
use crate::services::customer_linkage::CustomerLinkage;
use crate::services::metrics::{record_outcome, INVOICE_AMOUNT_TOTAL};
use crate::services::pricing::{self, Pricing};
use crate::services::stock_ledger::StockLedger;
use crate::services::store::{finish, Store, StoreTx};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Progress of a single invoice request through the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Proposed,
    StockReserved,
    Persisted,
    Linked,
    Committed,
    Rejected,
}

fn transition(invoice_id: Uuid, state: WorkflowState) {
    debug!(invoice_id = %invoice_id, state = ?state, "Invoice workflow transition");
}

pub struct InvoiceWorkflow<S> {
    store: Arc<S>,
    ledger: StockLedger<S>,
    settings: InvoicingSettings,
}

impl<S> Clone for InvoiceWorkflow<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: Store> InvoiceWorkflow<S> {
    pub fn new(store: Arc<S>, settings: InvoicingSettings) -> Self {
        Self {
            ledger: StockLedger::new(store.clone()),
            store,
            settings,
        }
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Create an invoice, taking its stock and linking it to the customer.
    #[instrument(skip(self, intent, actor), fields(user_id = %actor.user_id, lines = intent.lines.len()))]
    pub async fn create_invoice(
        &self,
        intent: InvoiceIntent,
        actor: &Identity,
    ) -> Result<Invoice, WorkflowError> {
        let result = self.create(intent, actor).await;
        record_outcome("create_invoice", &result);
        if let Err(e) = &result {
            debug!(state = ?WorkflowState::Rejected, "Invoice workflow transition");
            warn!(error = %e, problems = ?e.problems(), "Invoice creation rejected");
        }
        result
    }

    async fn create(&self, intent: InvoiceIntent, actor: &Identity) -> Result<Invoice, WorkflowError> {
        if intent.lines.is_empty() {
            return Err(WorkflowError::bad_request(
                "Invoice must contain at least one line item",
            ));
        }
        let customer_id = intent
            .customer_id
            .ok_or_else(|| WorkflowError::bad_request("Customer is required"))?;

        let customer = self
            .store
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Customer {} not found", customer_id)))?;

        let line_items = self.check_new_lines(&intent.lines).await?;

        let discount_rate = intent
            .discount
            .unwrap_or(self.settings.default_discount_rate)
            .max(Decimal::ZERO);
        let pricing = price(&line_items, discount_rate)?;
        check_declared_total(intent.declared_total, &pricing)?;

        let now = Utc::now();
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            sn: intent.sn,
            user_id: actor.user_id,
            customer_id,
            line_items,
            discount_rate,
            total_amount: pricing.total,
            status: intent.status.unwrap_or_default(),
            due_date: intent.due_date,
            created_utc: now,
            updated_utc: now,
        };
        transition(invoice.invoice_id, WorkflowState::Proposed);

        let mut tx = self.store.begin().await?;
        let outcome = self.commit_new(&mut tx, &invoice, &customer, actor).await;
        finish(tx, outcome).await?;
        transition(invoice.invoice_id, WorkflowState::Committed);

        INVOICE_AMOUNT_TOTAL
            .with_label_values(&[invoice.status.as_str()])
            .inc_by(invoice.total_amount.to_f64().unwrap_or(0.0));

        info!(
            invoice_id = %invoice.invoice_id,
            customer_id = %invoice.customer_id,
            total = %invoice.total_amount,
            "Invoice created"
        );

        Ok(invoice)
    }

    async fn commit_new(
        &self,
        tx: &mut S::Tx,
        invoice: &Invoice,
        customer: &Customer,
        actor: &Identity,
    ) -> Result<(), WorkflowError> {
        let context = invoice_label(invoice);
        for (product_id, quantity) in aggregate(&invoice.line_items)? {
            self.ledger
                .reserve(tx, product_id, quantity, actor, ActivityAction::Sale, &context)
                .await?;
        }
        transition(invoice.invoice_id, WorkflowState::StockReserved);

        tx.insert_invoice(invoice).await?;
        ActivityLog::record(
            tx,
            ActivityTarget::Invoice(invoice.invoice_id),
            actor,
            ActivityAction::Created,
            format!(
                "Invoice created for {} totalling {}",
                customer.name, invoice.total_amount
            ),
        )
        .await?;
        transition(invoice.invoice_id, WorkflowState::Persisted);

        CustomerLinkage::append_invoice_ref(tx, customer.customer_id, invoice.invoice_id, actor)
            .await?;
        transition(invoice.invoice_id, WorkflowState::Linked);

        Ok(())
    }

    /// Snapshot each requested line and check the per-product totals against
    /// stock. Every failing line is reported, not just the first.
    async fn check_new_lines(&self, lines: &[LineRequest]) -> Result<Vec<LineItem>, WorkflowError> {
        let mut problems = quantity_problems(lines);
        let requested = aggregate_requests(lines, &mut problems);
        let mut items: HashMap<Uuid, StockItem> = HashMap::new();

        for &(product_id, quantity) in &requested {
            match self.store.get_stock_item(product_id).await? {
                None => problems.push(format!("Product {} not found", product_id)),
                Some(item) => {
                    if item.quantity < quantity {
                        problems.push(format!(
                            "Insufficient stock for {}: requested {}, on hand {}",
                            item.name, quantity, item.quantity
                        ));
                    }
                    items.insert(product_id, item);
                }
            }
        }

        if !problems.is_empty() {
            return Err(WorkflowError::rejected("Stock check failed", problems));
        }

        Ok(lines
            .iter()
            .filter_map(|line| items.get(&line.product_id).map(|item| snapshot(item, line.quantity)))
            .collect())
    }

    // -------------------------------------------------------------------------
    // Update
    // -------------------------------------------------------------------------

    /// Apply an allow-listed patch to an invoice. Administrators only.
    #[instrument(skip(self, patch, actor), fields(invoice_id = %invoice_id, user_id = %actor.user_id))]
    pub async fn update_invoice(
        &self,
        invoice_id: Uuid,
        patch: InvoicePatch,
        actor: &Identity,
    ) -> Result<Invoice, WorkflowError> {
        let result = self.update(invoice_id, patch, actor).await;
        record_outcome("update_invoice", &result);
        if let Err(e) = &result {
            transition(invoice_id, WorkflowState::Rejected);
            warn!(error = %e, problems = ?e.problems(), "Invoice update rejected");
        }
        result
    }

    async fn update(
        &self,
        invoice_id: Uuid,
        patch: InvoicePatch,
        actor: &Identity,
    ) -> Result<Invoice, WorkflowError> {
        if !actor.is_admin() {
            return Err(WorkflowError::Unauthorized(
                "Only administrators can update invoices".to_string(),
            ));
        }
        if patch.is_empty() {
            return Err(WorkflowError::bad_request("No updatable fields provided"));
        }

        let existing = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Invoice {} not found", invoice_id)))?;

        let (line_items, diffs) = match &patch.lines {
            Some(lines) if lines.is_empty() => {
                return Err(WorkflowError::bad_request(
                    "Invoice must contain at least one line item",
                ));
            }
            Some(lines) => self.plan_line_change(&existing, lines).await?,
            None => (existing.line_items.clone(), Vec::new()),
        };

        let discount_rate = patch
            .discount
            .unwrap_or(existing.discount_rate)
            .max(Decimal::ZERO);
        let pricing = price(&line_items, discount_rate)?;
        check_declared_total(patch.declared_total, &pricing)?;

        let updated = Invoice {
            line_items,
            discount_rate,
            total_amount: pricing.total,
            status: patch.status.unwrap_or(existing.status),
            due_date: patch.due_date.or(existing.due_date),
            updated_utc: Utc::now(),
            ..existing.clone()
        };

        let summary = summarize_changes(&existing, &updated);
        if summary.is_empty() {
            debug!(invoice_id = %invoice_id, "Invoice patch changes nothing");
            return Ok(existing);
        }
        transition(invoice_id, WorkflowState::Proposed);

        let mut tx = self.store.begin().await?;
        let outcome = self
            .commit_update(&mut tx, &existing, &updated, &diffs, summary, actor)
            .await;
        finish(tx, outcome).await?;
        transition(invoice_id, WorkflowState::Committed);

        info!(
            invoice_id = %invoice_id,
            total = %updated.total_amount,
            status = %updated.status,
            "Invoice updated"
        );

        Ok(updated)
    }

    async fn commit_update(
        &self,
        tx: &mut S::Tx,
        existing: &Invoice,
        updated: &Invoice,
        diffs: &[(Uuid, i64)],
        summary: String,
        actor: &Identity,
    ) -> Result<(), WorkflowError> {
        let current = tx.lock_invoice(existing.invoice_id).await?.ok_or_else(|| {
            WorkflowError::NotFound(format!("Invoice {} not found", existing.invoice_id))
        })?;
        if current != *existing {
            return Err(WorkflowError::Conflict(format!(
                "Invoice {} was modified concurrently",
                existing.invoice_id
            )));
        }

        let context = invoice_label(updated);
        for &(product_id, diff) in diffs {
            if diff > 0 {
                self.ledger
                    .reserve(tx, product_id, diff, actor, ActivityAction::Sale, &context)
                    .await?;
            } else {
                self.restock(tx, product_id, -diff, actor, &context).await?;
            }
        }
        transition(updated.invoice_id, WorkflowState::StockReserved);

        tx.update_invoice(updated).await?;
        ActivityLog::record(
            tx,
            ActivityTarget::Invoice(updated.invoice_id),
            actor,
            ActivityAction::Updated,
            summary,
        )
        .await?;
        transition(updated.invoice_id, WorkflowState::Persisted);

        Ok(())
    }

    /// Work out the new line snapshots and the signed per-product quantity
    /// change. Products already on the invoice keep their original snapshot.
    async fn plan_line_change(
        &self,
        existing: &Invoice,
        lines: &[LineRequest],
    ) -> Result<(Vec<LineItem>, Vec<(Uuid, i64)>), WorkflowError> {
        let mut problems = quantity_problems(lines);
        let requested = aggregate_requests(lines, &mut problems);
        let previous = aggregate(&existing.line_items)?;

        let mut snapshots: HashMap<Uuid, (String, Decimal)> = HashMap::new();
        for line in &existing.line_items {
            snapshots
                .entry(line.product_id)
                .or_insert_with(|| (line.name.clone(), line.unit_price));
        }

        let mut diffs = Vec::new();
        for &(product_id, quantity) in &requested {
            let before = previous
                .iter()
                .find(|(id, _)| *id == product_id)
                .map(|(_, q)| *q)
                .unwrap_or(0);
            let Some(diff) = quantity.checked_sub(before) else {
                problems.push(format!(
                    "Quantity change for product {} is out of range",
                    product_id
                ));
                continue;
            };
            let needs_lookup = diff > 0 || !snapshots.contains_key(&product_id);
            if needs_lookup {
                match self.store.get_stock_item(product_id).await? {
                    None => problems.push(format!("Product {} not found", product_id)),
                    Some(item) => {
                        if diff > 0 && item.quantity < diff {
                            problems.push(format!(
                                "Insufficient stock for {}: requested {} more, on hand {}",
                                item.name, diff, item.quantity
                            ));
                        }
                        snapshots
                            .entry(product_id)
                            .or_insert_with(|| (item.name.clone(), item.unit_price));
                    }
                }
            }
            if diff != 0 {
                diffs.push((product_id, diff));
            }
        }
        for &(product_id, quantity) in &previous {
            if !requested.iter().any(|(id, _)| *id == product_id) {
                diffs.push((product_id, -quantity));
            }
        }
        diffs.sort_by_key(|&(product_id, _)| product_id);

        if !problems.is_empty() {
            return Err(WorkflowError::rejected("Stock check failed", problems));
        }

        let line_items = lines
            .iter()
            .filter_map(|line| {
                snapshots
                    .get(&line.product_id)
                    .map(|(name, unit_price)| LineItem {
                        product_id: line.product_id,
                        name: name.clone(),
                        quantity: line.quantity,
                        unit_price: *unit_price,
                    })
            })
            .collect();

        Ok((line_items, diffs))
    }

    // -------------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------------

    /// Delete an invoice. A due invoice gives its stock back; a paid one
    /// does not. Administrators only.
    #[instrument(skip(self, actor), fields(invoice_id = %invoice_id, user_id = %actor.user_id))]
    pub async fn delete_invoice(
        &self,
        invoice_id: Uuid,
        actor: &Identity,
    ) -> Result<Invoice, WorkflowError> {
        let result = self.delete(invoice_id, actor).await;
        record_outcome("delete_invoice", &result);
        if let Err(e) = &result {
            warn!(error = %e, "Invoice deletion rejected");
        }
        result
    }

    async fn delete(&self, invoice_id: Uuid, actor: &Identity) -> Result<Invoice, WorkflowError> {
        if !actor.is_admin() {
            return Err(WorkflowError::Unauthorized(
                "Only administrators can delete invoices".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let outcome = self.commit_delete(&mut tx, invoice_id, actor).await;
        let invoice = finish(tx, outcome).await?;

        info!(
            invoice_id = %invoice_id,
            restocked = invoice.status == InvoiceStatus::Due,
            "Invoice deleted"
        );

        Ok(invoice)
    }

    async fn commit_delete(
        &self,
        tx: &mut S::Tx,
        invoice_id: Uuid,
        actor: &Identity,
    ) -> Result<Invoice, WorkflowError> {
        let invoice = tx
            .lock_invoice(invoice_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Invoice {} not found", invoice_id)))?;

        if invoice.status == InvoiceStatus::Due {
            let context = invoice_label(&invoice);
            for (product_id, quantity) in aggregate(&invoice.line_items)? {
                self.restock(tx, product_id, quantity, actor, &context)
                    .await?;
            }
        }

        tx.delete_invoice(invoice_id).await?;
        ActivityLog::record(
            tx,
            ActivityTarget::Invoice(invoice_id),
            actor,
            ActivityAction::Deleted,
            format!("Invoice deleted ({})", invoice.status),
        )
        .await?;
        CustomerLinkage::remove_invoice_ref(tx, invoice.customer_id, invoice_id, actor).await?;

        Ok(invoice)
    }

    /// Return units to stock. A product that has since been removed from
    /// the catalog has nowhere to return them to and is skipped.
    async fn restock(
        &self,
        tx: &mut S::Tx,
        product_id: Uuid,
        quantity: i64,
        actor: &Identity,
        context: &str,
    ) -> Result<(), WorkflowError> {
        match self
            .ledger
            .apply_delta(tx, product_id, quantity, actor, ActivityAction::Restock, context)
            .await
        {
            Ok(_) => Ok(()),
            Err(WorkflowError::NotFound(_)) => {
                warn!(product_id = %product_id, quantity, "Restock skipped for missing product");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<Invoice, WorkflowError> {
        self.store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Invoice {} not found", invoice_id)))
    }
}

fn snapshot(item: &StockItem, quantity: i64) -> LineItem {
    LineItem {
        product_id: item.stock_item_id,
        name: item.name.clone(),
        quantity,
        unit_price: item.unit_price,
    }
}

fn invoice_label(invoice: &Invoice) -> String {
    match &invoice.sn {
        Some(sn) => format!("invoice {}", sn),
        None => format!("invoice {}", invoice.invoice_id),
    }
}

fn price(lines: &[LineItem], discount_rate: Decimal) -> Result<Pricing, WorkflowError> {
    pricing::compute(lines, discount_rate).ok_or_else(|| {
        WorkflowError::rejected(
            "Invoice amount out of range",
            vec![format!(
                "total of {} line(s) at {}% discount cannot be represented",
                lines.len(),
                discount_rate
            )],
        )
    })
}

fn check_declared_total(declared: Option<Decimal>, pricing: &Pricing) -> Result<(), WorkflowError> {
    match declared {
        Some(declared) if !pricing::matches_declared(declared, pricing.total) => {
            Err(WorkflowError::rejected(
                "Total amount mismatch",
                vec![format!(
                    "declared {}, computed {}",
                    declared, pricing.total
                )],
            ))
        }
        _ => Ok(()),
    }
}

fn quantity_problems(lines: &[LineRequest]) -> Vec<String> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.quantity < 1)
        .map(|(i, line)| {
            format!(
                "Line {}: quantity for product {} must be at least 1",
                i + 1,
                line.product_id
            )
        })
        .collect()
}

/// Positive requested quantity per product, ordered by product id. Stock
/// rows are always locked in this order.
///
/// A product whose total does not fit in an `i64` is reported against the
/// line that overflowed it and left out of the result.
fn aggregate_requests(lines: &[LineRequest], problems: &mut Vec<String>) -> Vec<(Uuid, i64)> {
    let mut totals: BTreeMap<Uuid, Option<i64>> = BTreeMap::new();
    for (i, line) in lines.iter().enumerate().filter(|(_, l)| l.quantity > 0) {
        let total = totals.entry(line.product_id).or_insert(Some(0));
        if let Some(sum) = *total {
            *total = sum.checked_add(line.quantity);
            if total.is_none() {
                problems.push(format!(
                    "Line {}: total quantity for product {} is out of range",
                    i + 1,
                    line.product_id
                ));
            }
        }
    }
    totals
        .into_iter()
        .filter_map(|(product_id, total)| total.map(|t| (product_id, t)))
        .collect()
}

/// Invoiced quantity per product, ordered by product id.
fn aggregate(lines: &[LineItem]) -> Result<Vec<(Uuid, i64)>, WorkflowError> {
    let mut totals: BTreeMap<Uuid, i64> = BTreeMap::new();
    for line in lines {
        let total = totals.entry(line.product_id).or_insert(0);
        *total = total.checked_add(line.quantity).ok_or_else(|| {
            WorkflowError::Internal(anyhow::anyhow!(
                "Stored quantity for product {} is out of range",
                line.product_id
            ))
        })?;
    }
    Ok(totals.into_iter().collect())
}

/// One line describing every field that differs, or empty when nothing does.
fn summarize_changes(before: &Invoice, after: &Invoice) -> String {
    let mut changes = Vec::new();

    if before.total_amount != after.total_amount {
        changes.push(format!(
            "amount {} -> {}",
            before.total_amount, after.total_amount
        ));
    }
    if before.line_items != after.line_items {
        let products: Vec<String> = after
            .line_items
            .iter()
            .map(|l| format!("{} x{}", l.name, l.quantity))
            .collect();
        changes.push(format!("products {}", products.join(", ")));
    }
    if before.discount_rate != after.discount_rate {
        changes.push(format!(
            "discount {}% -> {}%",
            before.discount_rate, after.discount_rate
        ));
    }
    if before.status != after.status {
        changes.push(format!("status {} -> {}", before.status, after.status));
    }
    if before.due_date != after.due_date {
        let show = |d: Option<chrono::NaiveDate>| {
            d.map(|d| d.to_string()).unwrap_or_else(|| "none".to_string())
        };
        changes.push(format!(
            "due date {} -> {}",
            show(before.due_date),
            show(after.due_date)
        ));
    }

    if changes.is_empty() {
        String::new()
    } else {
        format!("Invoice updated: {}", changes.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn line(product_id: Uuid, quantity: i64) -> LineItem {
        LineItem {
            product_id,
            name: "Syringe".to_string(),
            quantity,
            unit_price: Decimal::from(2),
        }
    }

    #[test]
    fn aggregates_are_ordered_by_product_id() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let mut problems = Vec::new();
        let totals = aggregate_requests(
            &[
                LineRequest::new(b, 1),
                LineRequest::new(a, 2),
                LineRequest::new(b, 4),
                LineRequest::new(a, 0),
            ],
            &mut problems,
        );
        assert_eq!(totals, vec![(a, 2), (b, 5)]);
        assert!(problems.is_empty());

        assert_eq!(
            aggregate(&[line(b, 1), line(a, 3), line(a, 1)]).unwrap(),
            vec![(a, 4), (b, 1)]
        );
    }

    #[test]
    fn overflowing_totals_are_reported_not_wrapped() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let mut problems = Vec::new();
        let totals = aggregate_requests(
            &[
                LineRequest::new(a, i64::MAX),
                LineRequest::new(b, 3),
                LineRequest::new(a, 2),
                LineRequest::new(a, 5),
            ],
            &mut problems,
        );
        assert_eq!(totals, vec![(b, 3)]);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("Line 3:"), "{:?}", problems);

        assert!(matches!(
            aggregate(&[line(a, i64::MAX), line(a, 1)]),
            Err(WorkflowError::Internal(_))
        ));
    }

    #[test]
    fn quantity_problems_name_each_line() {
        let id = Uuid::new_v4();
        let problems = quantity_problems(&[
            LineRequest::new(id, 1),
            LineRequest::new(id, 0),
            LineRequest::new(id, -2),
        ]);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].starts_with("Line 2:"));
        assert!(problems[1].starts_with("Line 3:"));
    }

    #[test]
    fn summary_lists_every_changed_field() {
        let now = Utc::now();
        let product = Uuid::new_v4();
        let before = Invoice {
            invoice_id: Uuid::new_v4(),
            sn: Some("INV-1".to_string()),
            user_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            line_items: vec![line(product, 2)],
            discount_rate: Decimal::ZERO,
            total_amount: Decimal::from(4),
            status: InvoiceStatus::Due,
            due_date: None,
            created_utc: now,
            updated_utc: now,
        };
        let after = Invoice {
            line_items: vec![line(product, 3)],
            total_amount: Decimal::from(6),
            status: InvoiceStatus::Paid,
            due_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            ..before.clone()
        };

        let summary = summarize_changes(&before, &after);
        assert!(summary.contains("amount 4 -> 6"));
        assert!(summary.contains("products Syringe x3"));
        assert!(summary.contains("status due -> paid"));
        assert!(summary.contains("due date none -> 2025-03-01"));
        assert!(summarize_changes(&before, &before).is_empty());
    }
}
