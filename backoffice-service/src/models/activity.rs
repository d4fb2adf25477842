//! Activity log model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Recognized activity tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Created,
    Updated,
    StockUpdate,
    Sale,
    Restock,
    RoleChange,
    Deleted,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::StockUpdate => "stock_update",
            Self::Sale => "sale",
            Self::Restock => "restock",
            Self::RoleChange => "role_change",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entity an activity entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ActivityTarget {
    StockItem(Uuid),
    Customer(Uuid),
    Invoice(Uuid),
    User(Uuid),
}

impl ActivityTarget {
    /// Value stored in `activity_log.entity_type`.
    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::StockItem(_) => "stock_item",
            Self::Customer(_) => "customer",
            Self::Invoice(_) => "invoice",
            Self::User(_) => "user",
        }
    }

    pub fn entity_id(&self) -> Uuid {
        match self {
            Self::StockItem(id) | Self::Customer(id) | Self::Invoice(id) | Self::User(id) => *id,
        }
    }
}

/// One append-only history record.
///
/// The acting user's name is captured alongside the id so history stays
/// readable after the user is renamed or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ActivityLogEntry {
    pub entry_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub action: ActivityAction,
    pub description: String,
    pub quantity_before: Option<i64>,
    pub quantity_after: Option<i64>,
    pub created_utc: DateTime<Utc>,
}
