//! In-process store used by tests and local runs without PostgreSQL.
//!
//! A unit of work takes the state lock for its whole lifetime and mutates a
//! staged copy. Commit swaps the copy in; dropping the transaction discards
//! it. Transactions are therefore serialized.
//!
//! Store-level reads take the same lock, so they must not be awaited while
//! a transaction from the same task is open.

use crate::error::StoreError;
use crate::models::{
    ActivityLogEntry, ActivityTarget, Customer, Invoice, InvoiceStatus, StockItem, User,
};
use crate::services::store::{Store, StoreTx};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct State {
    stock_items: HashMap<Uuid, StockItem>,
    customers: HashMap<Uuid, Customer>,
    invoices: HashMap<Uuid, Invoice>,
    users: HashMap<Uuid, User>,
    activity: HashMap<ActivityTarget, Vec<ActivityLogEntry>>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    fail_next_invoice_insert: Arc<AtomicBool>,
    stock_on_next_begin: Arc<SyncMutex<Vec<(Uuid, i64)>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next invoice insert fail, so callers can observe rollback.
    pub fn fail_next_invoice_insert(&self) {
        self.fail_next_invoice_insert.store(true, Ordering::SeqCst);
    }

    /// Overwrite on-hand quantities just before the next unit of work starts,
    /// as if another writer had committed in between.
    pub fn set_stock_on_next_begin(&self, stock_item_id: Uuid, quantity: i64) {
        if let Ok(mut pending) = self.stock_on_next_begin.lock() {
            pending.push((stock_item_id, quantity));
        }
    }

    /// Insert a stock item directly, bypassing the activity log.
    pub async fn seed_stock_item(&self, item: StockItem) {
        self.state
            .lock()
            .await
            .stock_items
            .insert(item.stock_item_id, item);
    }

    pub async fn seed_customer(&self, customer: Customer) {
        self.state
            .lock()
            .await
            .customers
            .insert(customer.customer_id, customer);
    }

    pub async fn seed_user(&self, user: User) {
        self.state.lock().await.users.insert(user.user_id, user);
    }

    pub async fn invoice_count(&self) -> usize {
        self.state.lock().await.invoices.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let mut guard = self.state.clone().lock_owned().await;
        let pending = match self.stock_on_next_begin.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => Vec::new(),
        };
        for (stock_item_id, quantity) in pending {
            if let Some(item) = guard.stock_items.get_mut(&stock_item_id) {
                item.set_quantity(quantity);
            }
        }
        let staged = guard.clone();
        Ok(MemoryTx {
            guard,
            staged,
            fail_next_invoice_insert: self.fail_next_invoice_insert.clone(),
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_stock_item(&self, stock_item_id: Uuid) -> Result<Option<StockItem>, StoreError> {
        Ok(self.state.lock().await.stock_items.get(&stock_item_id).cloned())
    }

    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, StoreError> {
        Ok(self.state.lock().await.customers.get(&customer_id).cloned())
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        Ok(self.state.lock().await.invoices.get(&invoice_id).cloned())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn list_activity(
        &self,
        target: ActivityTarget,
    ) -> Result<Vec<ActivityLogEntry>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .activity
            .get(&target)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    staged: State,
    fail_next_invoice_insert: Arc<AtomicBool>,
}

impl MemoryTx {
    /// Contacts are unique among customers that have one.
    fn check_contact(&self, customer: &Customer) -> Result<(), StoreError> {
        let Some(contact) = &customer.contact else {
            return Ok(());
        };
        let taken = self.staged.customers.values().any(|c| {
            c.customer_id != customer.customer_id && c.contact.as_deref() == Some(contact.as_str())
        });
        if taken {
            return Err(StoreError::UniqueViolation(format!(
                "contact '{}' is already registered",
                contact
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_stock_item(
        &mut self,
        stock_item_id: Uuid,
    ) -> Result<Option<StockItem>, StoreError> {
        Ok(self.staged.stock_items.get(&stock_item_id).cloned())
    }

    async fn insert_stock_item(&mut self, item: &StockItem) -> Result<(), StoreError> {
        if self.staged.stock_items.contains_key(&item.stock_item_id) {
            return Err(StoreError::UniqueViolation(format!(
                "stock item {} already exists",
                item.stock_item_id
            )));
        }
        self.staged
            .stock_items
            .insert(item.stock_item_id, item.clone());
        Ok(())
    }

    async fn update_stock_item(&mut self, item: &StockItem) -> Result<(), StoreError> {
        if let Some(existing) = self.staged.stock_items.get_mut(&item.stock_item_id) {
            *existing = item.clone();
        }
        Ok(())
    }

    async fn decrement_if_at_least(
        &mut self,
        stock_item_id: Uuid,
        amount: i64,
    ) -> Result<Option<StockItem>, StoreError> {
        match self.staged.stock_items.get_mut(&stock_item_id) {
            Some(item) if amount > 0 && item.quantity >= amount => {
                item.set_quantity(item.quantity - amount);
                item.updated_utc = Utc::now();
                Ok(Some(item.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_stock_item(&mut self, stock_item_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.staged.stock_items.remove(&stock_item_id).is_some())
    }

    async fn count_due_invoices_with_product(
        &mut self,
        stock_item_id: Uuid,
    ) -> Result<i64, StoreError> {
        let count = self
            .staged
            .invoices
            .values()
            .filter(|inv| inv.status == InvoiceStatus::Due && inv.quantity_of(stock_item_id) > 0)
            .count();
        Ok(count as i64)
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        self.check_contact(customer)?;
        self.staged
            .customers
            .insert(customer.customer_id, customer.clone());
        Ok(())
    }

    async fn lock_customer(&mut self, customer_id: Uuid) -> Result<Option<Customer>, StoreError> {
        Ok(self.staged.customers.get(&customer_id).cloned())
    }

    async fn update_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        self.check_contact(customer)?;
        if let Some(existing) = self.staged.customers.get_mut(&customer.customer_id) {
            existing.name = customer.name.clone();
            existing.contact = customer.contact.clone();
            existing.email = customer.email.clone();
            existing.address = customer.address.clone();
        }
        Ok(())
    }

    async fn delete_customer(&mut self, customer_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.staged.customers.remove(&customer_id).is_some())
    }

    async fn append_invoice_ref(
        &mut self,
        customer_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<bool, StoreError> {
        match self.staged.customers.get_mut(&customer_id) {
            Some(customer) => {
                customer.invoice_ids.push(invoice_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_invoice_ref(
        &mut self,
        customer_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<bool, StoreError> {
        match self.staged.customers.get_mut(&customer_id) {
            Some(customer) => {
                customer.invoice_ids.retain(|id| *id != invoice_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lock_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        Ok(self.staged.invoices.get(&invoice_id).cloned())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        if self.fail_next_invoice_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database(anyhow::anyhow!(
                "Failed to create invoice: injected failure"
            )));
        }
        self.staged
            .invoices
            .insert(invoice.invoice_id, invoice.clone());
        Ok(())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        if let Some(existing) = self.staged.invoices.get_mut(&invoice.invoice_id) {
            *existing = invoice.clone();
        }
        Ok(())
    }

    async fn delete_invoice(&mut self, invoice_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.staged.invoices.remove(&invoice_id).is_some())
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        let taken = self
            .staged
            .users
            .values()
            .any(|u| u.user_name == user.user_name || u.email == user.email);
        if taken {
            return Err(StoreError::UniqueViolation(format!(
                "user '{}' or email '{}' is already registered",
                user.user_name, user.email
            )));
        }
        self.staged.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.staged.users.get(&user_id).cloned())
    }

    async fn update_user_role(&mut self, user: &User) -> Result<(), StoreError> {
        if let Some(existing) = self.staged.users.get_mut(&user.user_id) {
            existing.role = user.role;
            existing.updated_utc = user.updated_utc;
        }
        Ok(())
    }

    async fn append_activity(
        &mut self,
        target: ActivityTarget,
        entry: &ActivityLogEntry,
    ) -> Result<(), StoreError> {
        self.staged
            .activity
            .entry(target)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MemoryTx {
            mut guard, staged, ..
        } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
