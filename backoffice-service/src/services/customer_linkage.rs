//! Customer invoice back-references.

use crate::error::WorkflowError;
use crate::models::{ActivityAction, ActivityTarget, Identity};
use crate::services::activity_log::ActivityLog;
use crate::services::store::StoreTx;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Keeps `Customer::invoice_ids` in step with invoice creation and deletion.
/// The list holds plain ids; it does not own the invoices.
pub struct CustomerLinkage;

impl CustomerLinkage {
    /// Push the invoice id onto the customer's list. Not idempotent: the
    /// workflow calls it exactly once per created invoice.
    #[instrument(skip(tx, actor), fields(customer_id = %customer_id, invoice_id = %invoice_id))]
    pub async fn append_invoice_ref<T: StoreTx>(
        tx: &mut T,
        customer_id: Uuid,
        invoice_id: Uuid,
        actor: &Identity,
    ) -> Result<(), WorkflowError> {
        if !tx.append_invoice_ref(customer_id, invoice_id).await? {
            return Err(WorkflowError::NotFound(format!(
                "Customer {} not found",
                customer_id
            )));
        }

        ActivityLog::record(
            tx,
            ActivityTarget::Customer(customer_id),
            actor,
            ActivityAction::Updated,
            format!("Invoice {} added", invoice_id),
        )
        .await?;

        Ok(())
    }

    /// Drop the invoice id from the customer's list. A customer that no
    /// longer exists is not an error.
    #[instrument(skip(tx, actor), fields(customer_id = %customer_id, invoice_id = %invoice_id))]
    pub async fn remove_invoice_ref<T: StoreTx>(
        tx: &mut T,
        customer_id: Uuid,
        invoice_id: Uuid,
        actor: &Identity,
    ) -> Result<(), WorkflowError> {
        if !tx.remove_invoice_ref(customer_id, invoice_id).await? {
            warn!("Customer missing while unlinking invoice");
            return Ok(());
        }

        ActivityLog::record(
            tx,
            ActivityTarget::Customer(customer_id),
            actor,
            ActivityAction::Updated,
            format!("Invoice {} removed", invoice_id),
        )
        .await?;

        Ok(())
    }
}
