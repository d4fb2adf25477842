//! Invoice model for backoffice-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Unsettled. Deleting a due invoice returns its stock.
    #[default]
    Due,
    /// Settled. Stock consumption is final.
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Due => "due",
            InvoiceStatus::Paid => "paid",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown invoice status '{0}'")]
pub struct ParseInvoiceStatusError(pub String);

impl FromStr for InvoiceStatus {
    type Err = ParseInvoiceStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "due" => Ok(InvoiceStatus::Due),
            "paid" => Ok(InvoiceStatus::Paid),
            _ => Err(ParseInvoiceStatusError(s.to_string())),
        }
    }
}

/// One product line on an invoice. Name and price are snapshots taken when
/// the line was invoiced; later catalog edits do not touch them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl LineItem {
    /// `unit_price * quantity`, or `None` if the product does not fit in a
    /// `Decimal`.
    pub fn amount(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Requested product and quantity on an incoming invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: Uuid,
    pub quantity: i64,
}

impl LineRequest {
    pub fn new(product_id: Uuid, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Parsed invoice creation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceIntent {
    pub sn: Option<String>,
    pub customer_id: Option<Uuid>,
    pub lines: Vec<LineRequest>,
    /// Discount percentage. Falls back to the configured default when absent.
    pub discount: Option<Decimal>,
    /// Total the caller expects. Rejected when it disagrees with the
    /// computed total.
    pub declared_total: Option<Decimal>,
    pub status: Option<InvoiceStatus>,
    pub due_date: Option<NaiveDate>,
}

/// Invoice document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub sn: Option<String>,
    pub user_id: Uuid,
    pub customer_id: Uuid,
    #[sqlx(json)]
    pub line_items: Vec<LineItem>,
    pub discount_rate: Decimal,
    pub total_amount: Decimal,
    pub status: InvoiceStatus,
    pub due_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    /// Invoiced quantity for a product across all of its lines.
    pub fn quantity_of(&self, product_id: Uuid) -> i64 {
        self.line_items
            .iter()
            .filter(|l| l.product_id == product_id)
            .fold(0i64, |total, l| total.saturating_add(l.quantity))
    }
}

/// Fields an administrator may change on an existing invoice. Anything not
/// listed here is not writable through an update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoicePatch {
    pub lines: Option<Vec<LineRequest>>,
    pub status: Option<InvoiceStatus>,
    pub due_date: Option<NaiveDate>,
    pub discount: Option<Decimal>,
    pub declared_total: Option<Decimal>,
}

impl InvoicePatch {
    pub fn is_empty(&self) -> bool {
        self.lines.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
            && self.discount.is_none()
            && self.declared_total.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("PAID".parse::<InvoiceStatus>(), Ok(InvoiceStatus::Paid));
        assert_eq!(" due ".parse::<InvoiceStatus>(), Ok(InvoiceStatus::Due));
        assert!("refunded".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn quantity_of_sums_repeated_lines() {
        let product = Uuid::new_v4();
        let now = Utc::now();
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            sn: None,
            user_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            line_items: vec![
                LineItem {
                    product_id: product,
                    name: "Gauze".to_string(),
                    quantity: 2,
                    unit_price: Decimal::from(4),
                },
                LineItem {
                    product_id: product,
                    name: "Gauze".to_string(),
                    quantity: 3,
                    unit_price: Decimal::from(4),
                },
            ],
            discount_rate: Decimal::ZERO,
            total_amount: Decimal::from(20),
            status: InvoiceStatus::Due,
            due_date: None,
            created_utc: now,
            updated_utc: now,
        };

        assert_eq!(invoice.quantity_of(product), 5);
        assert_eq!(invoice.quantity_of(Uuid::new_v4()), 0);
    }
}
