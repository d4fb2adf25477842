//! Services module for backoffice-service.

pub mod activity_log;
pub mod catalog;
pub mod customer_linkage;
pub mod database;
pub mod memory;
pub mod metrics;
pub mod pricing;
pub mod stock_ledger;
pub mod store;
pub mod users;
pub mod workflow;

pub use activity_log::ActivityLog;
pub use catalog::Catalog;
pub use customer_linkage::CustomerLinkage;
pub use database::Database;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use pricing::Pricing;
pub use stock_ledger::{StockLedger, StockMovement};
pub use store::{Store, StoreTx};
pub use users::UserDirectory;
pub use workflow::{InvoiceWorkflow, WorkflowState};
