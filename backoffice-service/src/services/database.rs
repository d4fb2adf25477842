//! PostgreSQL store for backoffice-service.

use crate::error::StoreError;
use crate::models::{ActivityLogEntry, ActivityTarget, Customer, Invoice, StockItem, User};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{Store, StoreTx};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Attach a short context to a driver error. Unique violations and aborted
/// transactions keep their own variants.
fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| match StoreError::from(e) {
        StoreError::Database(inner) => StoreError::Database(inner.context(context)),
        other => other,
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "backoffice-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    type Tx = PgStoreTx;

    async fn begin(&self) -> Result<PgStoreTx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        Ok(PgStoreTx { tx })
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err("Health check failed"))?;
        Ok(())
    }

    #[instrument(skip(self), fields(stock_item_id = %stock_item_id))]
    async fn get_stock_item(&self, stock_item_id: Uuid) -> Result<Option<StockItem>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_stock_item"])
            .start_timer();

        let item = sqlx::query_as::<_, StockItem>(
            r#"
            SELECT stock_item_id, name, brand, dosage, quantity, unit_price,
                low_stock_threshold, is_low_stock, created_utc, updated_utc
            FROM stock_items
            WHERE stock_item_id = $1
            "#,
        )
        .bind(stock_item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to get stock item"))?;

        timer.observe_duration();

        Ok(item)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_customer"])
            .start_timer();

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, name, contact, email, address, invoice_ids, created_utc
            FROM customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to get customer"))?;

        timer.observe_duration();

        Ok(customer)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, sn, user_id, customer_id, line_items, discount_rate,
                total_amount, status, due_date, created_utc, updated_utc
            FROM invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to get invoice"))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, user_name, name, email, role, created_utc, updated_utc
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to get user"))?;

        timer.observe_duration();

        Ok(user)
    }

    #[instrument(skip(self), fields(entity_type = target.entity_type(), entity_id = %target.entity_id()))]
    async fn list_activity(
        &self,
        target: ActivityTarget,
    ) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_activity"])
            .start_timer();

        let entries = sqlx::query_as::<_, ActivityLogEntry>(
            r#"
            SELECT entry_id, user_id, user_name, action, description,
                quantity_before, quantity_after, created_utc
            FROM activity_log
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY seq
            "#,
        )
        .bind(target.entity_type())
        .bind(target.entity_id())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list activity"))?;

        timer.observe_duration();

        Ok(entries)
    }
}

/// Unit of work backed by a PostgreSQL transaction. Row locks taken with
/// `FOR UPDATE` are held until commit or rollback.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_stock_item(
        &mut self,
        stock_item_id: Uuid,
    ) -> Result<Option<StockItem>, StoreError> {
        let item = sqlx::query_as::<_, StockItem>(
            r#"
            SELECT stock_item_id, name, brand, dosage, quantity, unit_price,
                low_stock_threshold, is_low_stock, created_utc, updated_utc
            FROM stock_items
            WHERE stock_item_id = $1
            FOR UPDATE
            "#,
        )
        .bind(stock_item_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err("Failed to lock stock item"))?;

        Ok(item)
    }

    async fn insert_stock_item(&mut self, item: &StockItem) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_stock_item"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO stock_items (
                stock_item_id, name, brand, dosage, quantity, unit_price,
                low_stock_threshold, is_low_stock, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.stock_item_id)
        .bind(&item.name)
        .bind(&item.brand)
        .bind(&item.dosage)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.low_stock_threshold)
        .bind(item.is_low_stock)
        .bind(item.created_utc)
        .bind(item.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("Failed to create stock item"))?;

        timer.observe_duration();

        Ok(())
    }

    async fn update_stock_item(&mut self, item: &StockItem) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_stock_item"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE stock_items
            SET name = $2,
                brand = $3,
                dosage = $4,
                quantity = $5,
                unit_price = $6,
                low_stock_threshold = $7,
                is_low_stock = $8,
                updated_utc = $9
            WHERE stock_item_id = $1
            "#,
        )
        .bind(item.stock_item_id)
        .bind(&item.name)
        .bind(&item.brand)
        .bind(&item.dosage)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.low_stock_threshold)
        .bind(item.is_low_stock)
        .bind(item.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("Failed to update stock item"))?;

        timer.observe_duration();

        Ok(())
    }

    async fn decrement_if_at_least(
        &mut self,
        stock_item_id: Uuid,
        amount: i64,
    ) -> Result<Option<StockItem>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["decrement_stock"])
            .start_timer();

        // SET expressions see the pre-update row, so the low-stock flag is
        // computed from the new quantity.
        let item = sqlx::query_as::<_, StockItem>(
            r#"
            UPDATE stock_items
            SET quantity = quantity - $2,
                is_low_stock = (quantity - $2) < low_stock_threshold,
                updated_utc = NOW()
            WHERE stock_item_id = $1 AND $2 > 0 AND quantity >= $2
            RETURNING stock_item_id, name, brand, dosage, quantity, unit_price,
                low_stock_threshold, is_low_stock, created_utc, updated_utc
            "#,
        )
        .bind(stock_item_id)
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err("Failed to decrement stock"))?;

        timer.observe_duration();

        Ok(item)
    }

    async fn delete_stock_item(&mut self, stock_item_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM stock_items WHERE stock_item_id = $1")
            .bind(stock_item_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err("Failed to delete stock item"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_due_invoices_with_product(
        &mut self,
        stock_item_id: Uuid,
    ) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM invoices
            WHERE status = 'due'
              AND line_items @> jsonb_build_array(jsonb_build_object('product_id', $1::text))
            "#,
        )
        .bind(stock_item_id.to_string())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err("Failed to count invoices referencing product"))?;

        Ok(count)
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_customer"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO customers (customer_id, name, contact, email, address, invoice_ids, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(customer.customer_id)
        .bind(&customer.name)
        .bind(&customer.contact)
        .bind(&customer.email)
        .bind(&customer.address)
        .bind(&customer.invoice_ids)
        .bind(customer.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("Failed to create customer"))?;

        timer.observe_duration();

        Ok(())
    }

    async fn lock_customer(&mut self, customer_id: Uuid) -> Result<Option<Customer>, StoreError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, name, contact, email, address, invoice_ids, created_utc
            FROM customers
            WHERE customer_id = $1
            FOR UPDATE
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err("Failed to lock customer"))?;

        Ok(customer)
    }

    async fn update_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_customer"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE customers
            SET name = $2, contact = $3, email = $4, address = $5
            WHERE customer_id = $1
            "#,
        )
        .bind(customer.customer_id)
        .bind(&customer.name)
        .bind(&customer.contact)
        .bind(&customer.email)
        .bind(&customer.address)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("Failed to update customer"))?;

        timer.observe_duration();

        Ok(())
    }

    async fn delete_customer(&mut self, customer_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM customers WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err("Failed to delete customer"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_invoice_ref(
        &mut self,
        customer_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE customers SET invoice_ids = array_append(invoice_ids, $2) WHERE customer_id = $1",
        )
        .bind(customer_id)
        .bind(invoice_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("Failed to link invoice to customer"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_invoice_ref(
        &mut self,
        customer_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE customers SET invoice_ids = array_remove(invoice_ids, $2) WHERE customer_id = $1",
        )
        .bind(customer_id)
        .bind(invoice_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("Failed to unlink invoice from customer"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn lock_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, sn, user_id, customer_id, line_items, discount_rate,
                total_amount, status, due_date, created_utc, updated_utc
            FROM invoices
            WHERE invoice_id = $1
            FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err("Failed to lock invoice"))?;

        Ok(invoice)
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, sn, user_id, customer_id, line_items, discount_rate,
                total_amount, status, due_date, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(&invoice.sn)
        .bind(invoice.user_id)
        .bind(invoice.customer_id)
        .bind(sqlx::types::Json(&invoice.line_items))
        .bind(invoice.discount_rate)
        .bind(invoice.total_amount)
        .bind(invoice.status.as_str())
        .bind(invoice.due_date)
        .bind(invoice.created_utc)
        .bind(invoice.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("Failed to create invoice"))?;

        timer.observe_duration();

        Ok(())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE invoices
            SET line_items = $2,
                discount_rate = $3,
                total_amount = $4,
                status = $5,
                due_date = $6,
                updated_utc = $7
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(sqlx::types::Json(&invoice.line_items))
        .bind(invoice.discount_rate)
        .bind(invoice.total_amount)
        .bind(invoice.status.as_str())
        .bind(invoice.due_date)
        .bind(invoice.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("Failed to update invoice"))?;

        timer.observe_duration();

        Ok(())
    }

    async fn delete_invoice(&mut self, invoice_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM invoices WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err("Failed to delete invoice"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_user"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO users (user_id, user_name, name, email, role, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.user_name)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("Failed to create user"))?;

        timer.observe_duration();

        Ok(())
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, user_name, name, email, role, created_utc, updated_utc
            FROM users
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err("Failed to lock user"))?;

        Ok(user)
    }

    async fn update_user_role(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET role = $2, updated_utc = $3 WHERE user_id = $1")
            .bind(user.user_id)
            .bind(user.role)
            .bind(user.updated_utc)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err("Failed to update user role"))?;

        Ok(())
    }

    async fn append_activity(
        &mut self,
        target: ActivityTarget,
        entry: &ActivityLogEntry,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO activity_log (
                entry_id, entity_type, entity_id, user_id, user_name, action,
                description, quantity_before, quantity_after, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.entry_id)
        .bind(target.entity_type())
        .bind(target.entity_id())
        .bind(entry.user_id)
        .bind(&entry.user_name)
        .bind(entry.action.as_str())
        .bind(&entry.description)
        .bind(entry.quantity_before)
        .bind(entry.quantity_after)
        .bind(entry.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("Failed to append activity"))?;

        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(db_err("Failed to commit transaction"))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(db_err("Failed to roll back transaction"))
    }
}
