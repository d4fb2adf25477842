//! On-hand quantities and every change made to them.

use crate::error::WorkflowError;
use crate::models::{ActivityAction, ActivityTarget, Availability, Identity, StockItem};
use crate::services::activity_log::ActivityLog;
use crate::services::metrics::{STOCK_CONFLICTS_TOTAL, STOCK_MUTATIONS_TOTAL};
use crate::services::store::{Store, StoreTx};
use chrono::Utc;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// A committed-or-pending quantity change on one stock item.
#[derive(Debug, Clone, PartialEq)]
pub struct StockMovement {
    pub item: StockItem,
    pub before: i64,
    pub after: i64,
}

pub struct StockLedger<S> {
    store: Arc<S>,
}

impl<S> Clone for StockLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> StockLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Whether `requested` units could be taken right now. Advisory only:
    /// the decision that counts is made by [`StockLedger::reserve`].
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn check_availability(
        &self,
        product_id: Uuid,
        requested: i64,
    ) -> Result<Availability, WorkflowError> {
        let item = self
            .store
            .get_stock_item(product_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Product {} not found", product_id)))?;

        Ok(Availability {
            available: item.quantity >= requested,
            on_hand: item.quantity,
        })
    }

    /// Add `delta` to the on-hand quantity, flooring at zero. A large
    /// negative delta is clamped, so sales go through `reserve` instead.
    #[instrument(skip(self, tx, actor), fields(product_id = %product_id, delta = delta, action = %action))]
    pub async fn apply_delta(
        &self,
        tx: &mut S::Tx,
        product_id: Uuid,
        delta: i64,
        actor: &Identity,
        action: ActivityAction,
        context: &str,
    ) -> Result<StockMovement, WorkflowError> {
        let mut item = tx
            .lock_stock_item(product_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Product {} not found", product_id)))?;

        let before = item.set_quantity(item.quantity.saturating_add(delta));
        item.updated_utc = Utc::now();
        let after = item.quantity;
        tx.update_stock_item(&item).await?;

        if before.saturating_add(delta) < 0 {
            warn!(before, delta, "Stock adjustment clamped at zero");
        }

        ActivityLog::record_quantity_change(
            tx,
            ActivityTarget::StockItem(product_id),
            actor,
            action,
            describe(action, delta, context),
            before,
            after,
        )
        .await?;

        STOCK_MUTATIONS_TOTAL
            .with_label_values(&[action.as_str()])
            .inc();

        Ok(StockMovement {
            item,
            before,
            after,
        })
    }

    /// Take `quantity` units using the store's conditional decrement. Fails
    /// with `Conflict` when fewer units are on hand at this instant.
    #[instrument(skip(self, tx, actor), fields(product_id = %product_id, quantity = quantity))]
    pub async fn reserve(
        &self,
        tx: &mut S::Tx,
        product_id: Uuid,
        quantity: i64,
        actor: &Identity,
        action: ActivityAction,
        context: &str,
    ) -> Result<StockMovement, WorkflowError> {
        if quantity < 1 {
            return Err(WorkflowError::bad_request(format!(
                "Reserved quantity must be at least 1, got {}",
                quantity
            )));
        }
        let item = match tx.decrement_if_at_least(product_id, quantity).await? {
            Some(item) => item,
            None => {
                let current = tx.lock_stock_item(product_id).await?.ok_or_else(|| {
                    WorkflowError::NotFound(format!("Product {} not found", product_id))
                })?;
                STOCK_CONFLICTS_TOTAL.inc();
                warn!(
                    on_hand = current.quantity,
                    requested = quantity,
                    "Stock reservation refused"
                );
                return Err(WorkflowError::Conflict(format!(
                    "Insufficient stock for {}: requested {}, on hand {}",
                    current.name, quantity, current.quantity
                )));
            }
        };

        let after = item.quantity;
        let before = after + quantity;

        ActivityLog::record_quantity_change(
            tx,
            ActivityTarget::StockItem(product_id),
            actor,
            action,
            describe(action, -quantity, context),
            before,
            after,
        )
        .await?;

        STOCK_MUTATIONS_TOTAL
            .with_label_values(&[action.as_str()])
            .inc();

        Ok(StockMovement {
            item,
            before,
            after,
        })
    }
}

fn describe(action: ActivityAction, delta: i64, context: &str) -> String {
    let base = match action {
        ActivityAction::Sale => format!("Sold {} units", delta.unsigned_abs()),
        ActivityAction::Restock => format!("Restocked {} units", delta.unsigned_abs()),
        _ if delta >= 0 => format!("Stock increased by {}", delta),
        _ => format!("Stock decreased by {}", delta.unsigned_abs()),
    };
    if context.is_empty() {
        base
    } else {
        format!("{} ({})", base, context)
    }
}
