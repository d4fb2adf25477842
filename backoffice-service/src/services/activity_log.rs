//! Append-only activity history.

use crate::error::StoreError;
use crate::models::{ActivityAction, ActivityLogEntry, ActivityTarget, Identity};
use crate::services::store::{Store, StoreTx};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

/// Writes and reads per-entity history. Entries are only ever appended, and
/// always inside the unit of work that made the change they describe.
pub struct ActivityLog;

impl ActivityLog {
    pub async fn record<T: StoreTx>(
        tx: &mut T,
        target: ActivityTarget,
        actor: &Identity,
        action: ActivityAction,
        description: impl Into<String>,
    ) -> Result<ActivityLogEntry, StoreError> {
        let entry = new_entry(actor, action, description.into(), None);
        append(tx, target, entry).await
    }

    /// Record a stock movement with the quantities either side of it.
    pub async fn record_quantity_change<T: StoreTx>(
        tx: &mut T,
        target: ActivityTarget,
        actor: &Identity,
        action: ActivityAction,
        description: impl Into<String>,
        before: i64,
        after: i64,
    ) -> Result<ActivityLogEntry, StoreError> {
        let entry = new_entry(actor, action, description.into(), Some((before, after)));
        append(tx, target, entry).await
    }

    /// History for one entity, oldest first.
    pub async fn history<S: Store>(
        store: &S,
        target: ActivityTarget,
    ) -> Result<Vec<ActivityLogEntry>, StoreError> {
        store.list_activity(target).await
    }
}

fn new_entry(
    actor: &Identity,
    action: ActivityAction,
    description: String,
    quantities: Option<(i64, i64)>,
) -> ActivityLogEntry {
    ActivityLogEntry {
        entry_id: Uuid::new_v4(),
        user_id: actor.user_id,
        user_name: actor.display_name.clone(),
        action,
        description,
        quantity_before: quantities.map(|(before, _)| before),
        quantity_after: quantities.map(|(_, after)| after),
        created_utc: Utc::now(),
    }
}

async fn append<T: StoreTx>(
    tx: &mut T,
    target: ActivityTarget,
    entry: ActivityLogEntry,
) -> Result<ActivityLogEntry, StoreError> {
    tx.append_activity(target, &entry).await?;
    debug!(
        entity_type = target.entity_type(),
        entity_id = %target.entity_id(),
        action = %entry.action,
        "Activity recorded"
    );
    Ok(entry)
}
