//! Customer model for backoffice-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub customer_id: Uuid,
    pub name: String,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub address: String,
    /// Ids of invoices raised for this customer, oldest first. Plain ids,
    /// not ownership.
    pub invoice_ids: Vec<Uuid>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a customer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewCustomer {
    #[validate(length(min = 2, message = "Name must be at least 2 characters long"))]
    pub name: String,
    #[validate(length(min = 1, message = "Contact cannot be empty"))]
    pub contact: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 3, message = "Address must be at least 3 characters long"))]
    pub address: String,
}

/// Editable customer fields. The invoice list is maintained by the invoice
/// workflow and is not writable here.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CustomerPatch {
    #[validate(length(min = 2, message = "Name must be at least 2 characters long"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Contact cannot be empty"))]
    pub contact: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 3, message = "Address must be at least 3 characters long"))]
    pub address: Option<String>,
}

impl CustomerPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.contact.is_none() && self.email.is_none() && self.address.is_none()
    }
}
