//! Stock item and customer administration.

use crate::config::InvoicingSettings;
use crate::error::WorkflowError;
use crate::models::{
    ActivityAction, ActivityLogEntry, ActivityTarget, Availability, Customer, CustomerPatch,
    Identity, NewCustomer, NewStockItem, StockItem, StockItemPatch,
};
use crate::services::activity_log::ActivityLog;
use crate::services::metrics::record_outcome;
use crate::services::stock_ledger::StockLedger;
use crate::services::store::{finish, Store, StoreTx};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

pub struct Catalog<S> {
    store: Arc<S>,
    ledger: StockLedger<S>,
    settings: InvoicingSettings,
}

impl<S> Clone for Catalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: Store> Catalog<S> {
    pub fn new(store: Arc<S>, settings: InvoicingSettings) -> Self {
        Self {
            ledger: StockLedger::new(store.clone()),
            store,
            settings,
        }
    }

    // ---- Stock Item Operations ----

    #[instrument(skip(self, input, actor), fields(name = %input.name, user_id = %actor.user_id))]
    pub async fn create_stock_item(
        &self,
        input: NewStockItem,
        actor: &Identity,
    ) -> Result<StockItem, WorkflowError> {
        let result = self.create_item(input, actor).await;
        record_outcome("create_stock_item", &result);
        result
    }

    async fn create_item(
        &self,
        input: NewStockItem,
        actor: &Identity,
    ) -> Result<StockItem, WorkflowError> {
        input.validate()?;
        if input.unit_price < Decimal::ZERO {
            return Err(WorkflowError::bad_request("Unit price cannot be negative"));
        }

        let now = Utc::now();
        let mut item = StockItem {
            stock_item_id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            brand: input.brand,
            dosage: input.dosage,
            quantity: input.quantity,
            unit_price: input.unit_price,
            low_stock_threshold: input
                .low_stock_threshold
                .unwrap_or(self.settings.low_stock_threshold),
            is_low_stock: false,
            created_utc: now,
            updated_utc: now,
        };
        item.refresh_low_stock();

        let mut tx = self.store.begin().await?;
        let outcome = async {
            tx.insert_stock_item(&item).await?;
            ActivityLog::record_quantity_change(
                &mut tx,
                ActivityTarget::StockItem(item.stock_item_id),
                actor,
                ActivityAction::Created,
                format!("Stock item {} created", item.name),
                0,
                item.quantity,
            )
            .await?;
            Ok::<_, WorkflowError>(())
        }
        .await;
        finish(tx, outcome).await?;

        info!(stock_item_id = %item.stock_item_id, quantity = item.quantity, "Stock item created");

        Ok(item)
    }

    /// Edit descriptive fields and pricing. Quantity is not editable here.
    #[instrument(skip(self, patch, actor), fields(stock_item_id = %stock_item_id, user_id = %actor.user_id))]
    pub async fn update_stock_item(
        &self,
        stock_item_id: Uuid,
        patch: StockItemPatch,
        actor: &Identity,
    ) -> Result<StockItem, WorkflowError> {
        let result = self.update_item(stock_item_id, patch, actor).await;
        record_outcome("update_stock_item", &result);
        result
    }

    async fn update_item(
        &self,
        stock_item_id: Uuid,
        patch: StockItemPatch,
        actor: &Identity,
    ) -> Result<StockItem, WorkflowError> {
        if patch.is_empty() {
            return Err(WorkflowError::bad_request("No updatable fields provided"));
        }
        let mut problems = Vec::new();
        if matches!(&patch.name, Some(name) if name.trim().is_empty()) {
            problems.push("name: Product name is required".to_string());
        }
        if matches!(patch.unit_price, Some(price) if price < Decimal::ZERO) {
            problems.push("unit_price: Unit price cannot be negative".to_string());
        }
        if matches!(patch.low_stock_threshold, Some(t) if t < 0) {
            problems.push("low_stock_threshold: Low-stock threshold cannot be negative".to_string());
        }
        if !problems.is_empty() {
            return Err(WorkflowError::rejected("Invalid data provided", problems));
        }

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let mut item = tx.lock_stock_item(stock_item_id).await?.ok_or_else(|| {
                WorkflowError::NotFound(format!("Product {} not found", stock_item_id))
            })?;

            let mut changed = Vec::new();
            if let Some(name) = patch.name {
                changed.push("name");
                item.name = name.trim().to_string();
            }
            if let Some(brand) = patch.brand {
                changed.push("brand");
                item.brand = Some(brand);
            }
            if let Some(dosage) = patch.dosage {
                changed.push("dosage");
                item.dosage = Some(dosage);
            }
            if let Some(price) = patch.unit_price {
                changed.push("unit price");
                item.unit_price = price;
            }
            if let Some(threshold) = patch.low_stock_threshold {
                changed.push("low-stock threshold");
                item.low_stock_threshold = threshold;
            }
            item.refresh_low_stock();
            item.updated_utc = Utc::now();

            tx.update_stock_item(&item).await?;
            ActivityLog::record(
                &mut tx,
                ActivityTarget::StockItem(stock_item_id),
                actor,
                ActivityAction::Updated,
                format!("Updated {}", changed.join(", ")),
            )
            .await?;
            Ok::<_, WorkflowError>(item)
        }
        .await;

        finish(tx, outcome).await
    }

    /// Record units sold (negative) or returned (positive) outside of an
    /// invoice. The quantity never drops below zero.
    #[instrument(skip(self, actor), fields(product_id = %product_id, user_id = %actor.user_id))]
    pub async fn adjust_stock(
        &self,
        product_id: Uuid,
        delta: i64,
        actor: &Identity,
    ) -> Result<StockItem, WorkflowError> {
        let result = self.adjust(product_id, delta, actor).await;
        record_outcome("adjust_stock", &result);
        result
    }

    async fn adjust(
        &self,
        product_id: Uuid,
        delta: i64,
        actor: &Identity,
    ) -> Result<StockItem, WorkflowError> {
        if delta == 0 {
            return Err(WorkflowError::bad_request("Stock adjustment must be non-zero"));
        }

        let mut tx = self.store.begin().await?;
        let outcome = self
            .ledger
            .apply_delta(
                &mut tx,
                product_id,
                delta,
                actor,
                ActivityAction::StockUpdate,
                "manual adjustment",
            )
            .await;
        let movement = finish(tx, outcome).await?;

        info!(
            before = movement.before,
            after = movement.after,
            "Stock adjusted"
        );

        Ok(movement.item)
    }

    /// Remove a product. Refused while a due invoice still lists it.
    #[instrument(skip(self, actor), fields(stock_item_id = %stock_item_id, user_id = %actor.user_id))]
    pub async fn delete_stock_item(
        &self,
        stock_item_id: Uuid,
        actor: &Identity,
    ) -> Result<(), WorkflowError> {
        let result = self.delete_item(stock_item_id, actor).await;
        record_outcome("delete_stock_item", &result);
        result
    }

    async fn delete_item(&self, stock_item_id: Uuid, actor: &Identity) -> Result<(), WorkflowError> {
        if !actor.is_admin() {
            return Err(WorkflowError::Unauthorized(
                "Only administrators can delete products".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let item = tx.lock_stock_item(stock_item_id).await?.ok_or_else(|| {
                WorkflowError::NotFound(format!("Product {} not found", stock_item_id))
            })?;

            let open = tx.count_due_invoices_with_product(stock_item_id).await?;
            if open > 0 {
                return Err(WorkflowError::Conflict(format!(
                    "Product {} is on {} due invoice(s)",
                    item.name, open
                )));
            }

            tx.delete_stock_item(stock_item_id).await?;
            ActivityLog::record_quantity_change(
                &mut tx,
                ActivityTarget::StockItem(stock_item_id),
                actor,
                ActivityAction::Deleted,
                format!("Stock item {} deleted", item.name),
                item.quantity,
                0,
            )
            .await?;
            Ok::<_, WorkflowError>(())
        }
        .await;
        finish(tx, outcome).await?;

        info!(stock_item_id = %stock_item_id, "Stock item deleted");

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_stock_item(&self, stock_item_id: Uuid) -> Result<StockItem, WorkflowError> {
        self.store
            .get_stock_item(stock_item_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Product {} not found", stock_item_id)))
    }

    pub async fn check_availability(
        &self,
        product_id: Uuid,
        requested: i64,
    ) -> Result<Availability, WorkflowError> {
        self.ledger.check_availability(product_id, requested).await
    }

    // ---- Customer Operations ----

    #[instrument(skip(self, input, actor), fields(user_id = %actor.user_id))]
    pub async fn create_customer(
        &self,
        input: NewCustomer,
        actor: &Identity,
    ) -> Result<Customer, WorkflowError> {
        let result = self.add_customer(input, actor).await;
        record_outcome("create_customer", &result);
        result
    }

    async fn add_customer(
        &self,
        input: NewCustomer,
        actor: &Identity,
    ) -> Result<Customer, WorkflowError> {
        input.validate()?;

        let customer = Customer {
            customer_id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            contact: input.contact.map(|c| c.trim().to_string()),
            email: input.email,
            address: input.address.trim().to_string(),
            invoice_ids: Vec::new(),
            created_utc: Utc::now(),
        };

        let mut tx = self.store.begin().await?;
        let outcome = async {
            tx.insert_customer(&customer).await?;
            ActivityLog::record(
                &mut tx,
                ActivityTarget::Customer(customer.customer_id),
                actor,
                ActivityAction::Created,
                format!("Customer {} created", customer.name),
            )
            .await?;
            Ok::<_, WorkflowError>(())
        }
        .await;
        finish(tx, outcome).await?;

        info!(customer_id = %customer.customer_id, "Customer created");

        Ok(customer)
    }

    /// Edit a customer's descriptive fields. The invoice list is not
    /// editable here.
    #[instrument(skip(self, patch, actor), fields(customer_id = %customer_id, user_id = %actor.user_id))]
    pub async fn update_customer(
        &self,
        customer_id: Uuid,
        patch: CustomerPatch,
        actor: &Identity,
    ) -> Result<Customer, WorkflowError> {
        let result = self.edit_customer(customer_id, patch, actor).await;
        record_outcome("update_customer", &result);
        result
    }

    async fn edit_customer(
        &self,
        customer_id: Uuid,
        patch: CustomerPatch,
        actor: &Identity,
    ) -> Result<Customer, WorkflowError> {
        if patch.is_empty() {
            return Err(WorkflowError::bad_request("No updatable fields provided"));
        }
        patch.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let mut customer = tx.lock_customer(customer_id).await?.ok_or_else(|| {
                WorkflowError::NotFound(format!("Customer {} not found", customer_id))
            })?;

            let mut changed = Vec::new();
            if let Some(name) = patch.name {
                changed.push("name");
                customer.name = name.trim().to_string();
            }
            if let Some(contact) = patch.contact {
                changed.push("contact");
                customer.contact = Some(contact.trim().to_string());
            }
            if let Some(email) = patch.email {
                changed.push("email");
                customer.email = Some(email);
            }
            if let Some(address) = patch.address {
                changed.push("address");
                customer.address = address.trim().to_string();
            }

            tx.update_customer(&customer).await?;
            ActivityLog::record(
                &mut tx,
                ActivityTarget::Customer(customer_id),
                actor,
                ActivityAction::Updated,
                format!("Updated {}", changed.join(", ")),
            )
            .await?;
            Ok::<_, WorkflowError>(customer)
        }
        .await;
        let customer = finish(tx, outcome).await?;

        info!(customer_id = %customer_id, "Customer updated");

        Ok(customer)
    }

    /// Remove a customer. Administrators only; refused while any invoice
    /// still belongs to the customer.
    #[instrument(skip(self, actor), fields(customer_id = %customer_id, user_id = %actor.user_id))]
    pub async fn delete_customer(
        &self,
        customer_id: Uuid,
        actor: &Identity,
    ) -> Result<(), WorkflowError> {
        let result = self.remove_customer(customer_id, actor).await;
        record_outcome("delete_customer", &result);
        result
    }

    async fn remove_customer(&self, customer_id: Uuid, actor: &Identity) -> Result<(), WorkflowError> {
        if !actor.is_admin() {
            return Err(WorkflowError::Unauthorized(
                "Only administrators can delete customers".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let customer = tx.lock_customer(customer_id).await?.ok_or_else(|| {
                WorkflowError::NotFound(format!("Customer {} not found", customer_id))
            })?;

            if !customer.invoice_ids.is_empty() {
                return Err(WorkflowError::Conflict(format!(
                    "Customer {} still has {} invoice(s)",
                    customer.name,
                    customer.invoice_ids.len()
                )));
            }

            tx.delete_customer(customer_id).await?;
            ActivityLog::record(
                &mut tx,
                ActivityTarget::Customer(customer_id),
                actor,
                ActivityAction::Deleted,
                format!("Customer {} deleted", customer.name),
            )
            .await?;
            Ok::<_, WorkflowError>(())
        }
        .await;
        finish(tx, outcome).await?;

        info!(customer_id = %customer_id, "Customer deleted");

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_customer(&self, customer_id: Uuid) -> Result<Customer, WorkflowError> {
        self.store
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Customer {} not found", customer_id)))
    }

    // ---- Activity ----

    pub async fn activity_for(
        &self,
        target: ActivityTarget,
    ) -> Result<Vec<ActivityLogEntry>, WorkflowError> {
        Ok(ActivityLog::history(self.store.as_ref(), target).await?)
    }
}
