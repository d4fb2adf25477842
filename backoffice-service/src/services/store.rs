//! Persistence seam for backoffice-service.
//!
//! The workflow never talks to a database directly. It reads current state
//! through [`Store`] and performs every multi-record mutation inside a
//! [`StoreTx`] unit of work, so a failed step leaves nothing behind.
//! Dropping a transaction without committing rolls it back.

use crate::error::StoreError;
use crate::models::{ActivityLogEntry, ActivityTarget, Customer, Invoice, StockItem, User};
use async_trait::async_trait;
use uuid::Uuid;

/// Read access plus the ability to open a unit of work.
///
/// Reads are never cached: every call observes the latest committed state.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open a unit of work.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    async fn get_stock_item(&self, stock_item_id: Uuid) -> Result<Option<StockItem>, StoreError>;

    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, StoreError>;

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// History for one entity, oldest first.
    async fn list_activity(
        &self,
        target: ActivityTarget,
    ) -> Result<Vec<ActivityLogEntry>, StoreError>;
}

/// Mutations applied atomically on [`StoreTx::commit`].
#[async_trait]
pub trait StoreTx: Send {
    /// Read a stock item and hold it against concurrent writers until the
    /// unit of work ends.
    async fn lock_stock_item(&mut self, stock_item_id: Uuid)
        -> Result<Option<StockItem>, StoreError>;

    async fn insert_stock_item(&mut self, item: &StockItem) -> Result<(), StoreError>;

    /// Persist every field of an existing stock item.
    async fn update_stock_item(&mut self, item: &StockItem) -> Result<(), StoreError>;

    /// Subtract `amount` only if it is positive and at least that much is on
    /// hand. Returns the updated item, or `None` when the guard failed or the
    /// item is missing.
    async fn decrement_if_at_least(
        &mut self,
        stock_item_id: Uuid,
        amount: i64,
    ) -> Result<Option<StockItem>, StoreError>;

    async fn delete_stock_item(&mut self, stock_item_id: Uuid) -> Result<bool, StoreError>;

    /// Number of `due` invoices with at least one line for the product.
    async fn count_due_invoices_with_product(
        &mut self,
        stock_item_id: Uuid,
    ) -> Result<i64, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] on a duplicate contact.
    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;

    async fn lock_customer(&mut self, customer_id: Uuid) -> Result<Option<Customer>, StoreError>;

    /// Persist the descriptive fields of an existing customer. The invoice
    /// list is left alone. Fails with [`StoreError::UniqueViolation`] when
    /// the contact belongs to another customer.
    async fn update_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;

    async fn delete_customer(&mut self, customer_id: Uuid) -> Result<bool, StoreError>;

    /// Push an invoice id onto the customer's list. Returns `false` when the
    /// customer does not exist.
    async fn append_invoice_ref(
        &mut self,
        customer_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<bool, StoreError>;

    /// Drop every occurrence of an invoice id from the customer's list.
    async fn remove_invoice_ref(
        &mut self,
        customer_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<bool, StoreError>;

    async fn lock_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    async fn delete_invoice(&mut self, invoice_id: Uuid) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] on a duplicate user name
    /// or email.
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError>;

    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn update_user_role(&mut self, user: &User) -> Result<(), StoreError>;

    async fn append_activity(
        &mut self,
        target: ActivityTarget,
        entry: &ActivityLogEntry,
    ) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Commit on success, roll back on failure. The original error wins over a
/// failed rollback.
pub async fn finish<T: StoreTx, R>(
    tx: T,
    outcome: Result<R, crate::error::WorkflowError>,
) -> Result<R, crate::error::WorkflowError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            tx.rollback().await.ok();
            Err(err)
        }
    }
}
