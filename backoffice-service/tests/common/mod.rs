//! Common test utilities for backoffice-service integration tests.

#![allow(dead_code)]

use backoffice_service::config::InvoicingSettings;
use backoffice_service::models::{
    Customer, Identity, InvoiceIntent, LineRequest, Role, StockItem, User,
};
use backoffice_service::services::{Catalog, InMemoryStore, InvoiceWorkflow, Store, UserDirectory};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,backoffice_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub workflow: InvoiceWorkflow<InMemoryStore>,
    pub catalog: Catalog<InMemoryStore>,
    pub users: UserDirectory<InMemoryStore>,
    pub admin: Identity,
    pub clerk: Identity,
}

/// Fresh in-memory store with the default invoicing settings (15% discount,
/// low-stock threshold 10).
pub fn setup() -> TestContext {
    init_tracing();

    let store = Arc::new(InMemoryStore::new());
    let settings = InvoicingSettings::default();

    TestContext {
        workflow: InvoiceWorkflow::new(store.clone(), settings.clone()),
        catalog: Catalog::new(store.clone(), settings),
        users: UserDirectory::new(store.clone()),
        store,
        admin: Identity::new(Uuid::new_v4(), Role::Admin, "Avery Admin"),
        clerk: Identity::new(Uuid::new_v4(), Role::User, "Casey Clerk"),
    }
}

impl TestContext {
    /// Seed a stock item without an activity entry.
    pub async fn stock(&self, name: &str, quantity: i64, unit_price: i64) -> Uuid {
        let now = Utc::now();
        let mut item = StockItem {
            stock_item_id: Uuid::new_v4(),
            name: name.to_string(),
            brand: None,
            dosage: None,
            quantity,
            unit_price: Decimal::from(unit_price),
            low_stock_threshold: 3,
            is_low_stock: false,
            created_utc: now,
            updated_utc: now,
        };
        item.refresh_low_stock();
        let id = item.stock_item_id;
        self.store.seed_stock_item(item).await;
        id
    }

    pub async fn customer(&self, name: &str) -> Uuid {
        let customer = Customer {
            customer_id: Uuid::new_v4(),
            name: name.to_string(),
            contact: None,
            email: None,
            address: "12 Harbour Road".to_string(),
            invoice_ids: Vec::new(),
            created_utc: Utc::now(),
        };
        let id = customer.customer_id;
        self.store.seed_customer(customer).await;
        id
    }

    /// Seed a user record without an activity entry.
    pub async fn user(&self, user_name: &str, role: Role) -> Uuid {
        let now = Utc::now();
        let user = User {
            user_id: Uuid::new_v4(),
            user_name: user_name.to_string(),
            name: user_name.to_string(),
            email: format!("{}@example.com", user_name),
            role,
            created_utc: now,
            updated_utc: now,
        };
        let id = user.user_id;
        self.store.seed_user(user).await;
        id
    }

    pub async fn on_hand(&self, stock_item_id: Uuid) -> i64 {
        self.store
            .get_stock_item(stock_item_id)
            .await
            .unwrap()
            .expect("stock item should exist")
            .quantity
    }

    pub async fn customer_invoices(&self, customer_id: Uuid) -> Vec<Uuid> {
        self.store
            .get_customer(customer_id)
            .await
            .unwrap()
            .expect("customer should exist")
            .invoice_ids
    }
}

pub fn intent(customer_id: Uuid, lines: &[(Uuid, i64)]) -> InvoiceIntent {
    InvoiceIntent {
        customer_id: Some(customer_id),
        lines: lines
            .iter()
            .map(|&(product_id, quantity)| LineRequest::new(product_id, quantity))
            .collect(),
        ..Default::default()
    }
}

pub fn lines(lines: &[(Uuid, i64)]) -> Vec<LineRequest> {
    lines
        .iter()
        .map(|&(product_id, quantity)| LineRequest::new(product_id, quantity))
        .collect()
}
