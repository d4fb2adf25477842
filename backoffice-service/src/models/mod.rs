//! Domain models for backoffice-service.

mod activity;
mod customer;
mod identity;
mod invoice;
mod stock_item;
mod user;

pub use activity::{ActivityAction, ActivityLogEntry, ActivityTarget};
pub use customer::{Customer, CustomerPatch, NewCustomer};
pub use identity::{Identity, ParseRoleError, Role};
pub use invoice::{
    Invoice, InvoiceIntent, InvoicePatch, InvoiceStatus, LineItem, LineRequest,
    ParseInvoiceStatusError,
};
pub use stock_item::{Availability, NewStockItem, StockItem, StockItemPatch};
pub use user::{NewUser, User};
