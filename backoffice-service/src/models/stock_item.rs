//! Stock item model for backoffice-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A sellable product with a tracked on-hand quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StockItem {
    pub stock_item_id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub dosage: Option<String>,
    /// On-hand quantity. Never negative.
    pub quantity: i64,
    pub unit_price: Decimal,
    pub low_stock_threshold: i64,
    pub is_low_stock: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl StockItem {
    /// Set the on-hand quantity, flooring at zero, and refresh the low-stock
    /// flag. Returns the quantity before the change.
    pub fn set_quantity(&mut self, quantity: i64) -> i64 {
        let before = self.quantity;
        self.quantity = quantity.max(0);
        self.refresh_low_stock();
        before
    }

    pub fn refresh_low_stock(&mut self) {
        self.is_low_stock = self.quantity < self.low_stock_threshold;
    }
}

/// Input for creating a stock item.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewStockItem {
    #[validate(length(min = 1, message = "Product name is required"))]
    pub name: String,
    pub brand: Option<String>,
    pub dosage: Option<String>,
    #[validate(range(min = 0, message = "Product quantity cannot be negative"))]
    pub quantity: i64,
    pub unit_price: Decimal,
    #[validate(range(min = 0, message = "Low-stock threshold cannot be negative"))]
    pub low_stock_threshold: Option<i64>,
}

/// Editable stock item fields. Quantity is deliberately absent: it only
/// moves through the stock ledger.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockItemPatch {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub dosage: Option<String>,
    pub unit_price: Option<Decimal>,
    pub low_stock_threshold: Option<i64>,
}

impl StockItemPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.brand.is_none()
            && self.dosage.is_none()
            && self.unit_price.is_none()
            && self.low_stock_threshold.is_none()
    }
}

/// Result of an availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub available: bool,
    pub on_hand: i64,
}
