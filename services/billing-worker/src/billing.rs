use chrono::Utc;
use entity::billing_transaction::{ActiveModel, Column};
use entity::prelude::{BillingTransaction, TransactionStatus};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, RuntimeErr, Set};
use shared::dto::{PaymentResult, PaymentStatus, TollEvent};
use tracing::{info, warn};

use crate::payment::{PaymentCharge, PaymentGateway, PaymentGatewayError};

/// What became of a single toll event after running it through the
/// billing workflow.
pub enum BillingOutcome {
    /// A `billing_transactions` row for this `toll_event_id` already
    /// existed in a non-terminal-failure state. Nothing was charged or
    /// published again; the delivery is simply acked.
    AlreadyHandled,

    /// The event was processed to a final outcome (successful charge or
    /// terminal decline) and the result is ready to publish. `persisted`
    /// is false if the final status update itself failed to write, in
    /// which case the caller must still publish but must not ack.
    Processed {
        result: PaymentResult,
        persisted: bool,
    },

    /// A dependency (database) failed before any outcome could be
    /// determined. Nothing was published; the caller should nack and retry.
    Transient,
}

fn is_unique_violation(err: &DbErr) -> bool {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db_err))) => {
            db_err.code().as_deref() == Some("23505")
        }
        _ => false,
    }
}

/// Runs a single toll event through the five-step billing workflow:
/// idempotency probe, PENDING insert, PROCESSING mark, payment gateway
/// call, final status write, and (always) a PaymentResult publish.
pub async fn process_toll_event(
    db: &DatabaseConnection,
    gateway: &dyn PaymentGateway,
    event: &TollEvent,
) -> BillingOutcome {
    let existing = BillingTransaction::find()
        .filter(Column::TollEventId.eq(event.event_id.clone()))
        .one(db)
        .await;

    match existing {
        Ok(Some(tx)) if tx.status.is_already_handled() => {
            // TODO: a row stuck in Pending/Processing from a crash between
            // the gateway call and the final status write is skipped here
            // forever. Needs an out-of-band sweep that resolves stale
            // non-terminal rows against the gateway; not implemented.
            warn!(
                event_id = event.event_id,
                status = ?tx.status,
                transaction_id = tx.id,
                "duplicate toll event, already handled, skipping"
            );
            return BillingOutcome::AlreadyHandled;
        }
        Ok(_) => {}
        Err(err) => {
            warn!(%err, event_id = event.event_id, "failed to probe for existing transaction, will retry");
            return BillingOutcome::Transient;
        }
    }

    let pending = ActiveModel {
        toll_event_id: Set(event.event_id.clone()),
        vehicle_id: Set(event.vehicle_id.clone()),
        amount: Set(event.toll_amount),
        currency: Set(event.currency.clone()),
        retry_count: Set(0),
        ..Default::default()
    };

    let tx = match pending.insert(db).await {
        Ok(tx) => tx,
        Err(err) if is_unique_violation(&err) => {
            warn!(
                event_id = event.event_id,
                "duplicate toll event detected concurrently, skipping"
            );
            return BillingOutcome::AlreadyHandled;
        }
        Err(err) => {
            warn!(%err, event_id = event.event_id, "failed to create pending transaction, will retry");
            return BillingOutcome::Transient;
        }
    };

    info!(
        transaction_id = tx.id,
        event_id = event.event_id,
        "created pending billing transaction"
    );

    let mut processing: ActiveModel = tx.clone().into();
    processing.status = Set(TransactionStatus::Processing);
    processing.retry_count = Set(tx.retry_count + 1);

    let tx = match processing.update(db).await {
        Ok(tx) => tx,
        Err(err) => {
            warn!(%err, transaction_id = tx.id, "failed to mark transaction processing, will retry");
            return BillingOutcome::Transient;
        }
    };

    let charge = PaymentCharge {
        transaction_id: tx.id,
        toll_event_id: event.event_id.clone(),
        vehicle_id: event.vehicle_id.clone(),
        amount: tx.amount,
        currency: tx.currency.clone(),
    };

    let (final_status, gateway_ref, error_message) = match gateway.charge(&charge).await {
        Ok(receipt) => {
            info!(
                transaction_id = tx.id,
                gateway_reference = receipt.gateway_reference,
                "payment succeeded"
            );
            (TransactionStatus::Success, Some(receipt.gateway_reference), None)
        }
        Err(PaymentGatewayError::Declined { message, error_code }) => {
            warn!(transaction_id = tx.id, error_code, message, "payment declined");
            (TransactionStatus::Failed, None, Some(format!("{error_code}: {message}")))
        }
        Err(PaymentGatewayError::Timeout) => {
            warn!(transaction_id = tx.id, "payment gateway call timed out");
            (
                TransactionStatus::Failed,
                None,
                Some("GW_TIMEOUT: payment gateway call timed out".to_string()),
            )
        }
    };

    let mut finalize: ActiveModel = tx.clone().into();
    finalize.status = Set(final_status);
    finalize.payment_gateway_ref = Set(gateway_ref.clone());
    finalize.error_message = Set(error_message.clone());

    let persisted = match finalize.update(db).await {
        Ok(_) => true,
        Err(err) => {
            warn!(
                %err,
                transaction_id = tx.id,
                "failed to persist final transaction status, publishing result anyway"
            );
            false
        }
    };

    let result = PaymentResult {
        event_id: event.event_id.clone(),
        transaction_id: Some(tx.id.to_string()),
        vehicle_id: event.vehicle_id.clone(),
        status: match final_status {
            TransactionStatus::Success => PaymentStatus::Success,
            _ => PaymentStatus::Failed,
        },
        gateway_reference: gateway_ref,
        error_message,
        processed_time: Utc::now().timestamp_millis(),
    };

    BillingOutcome::Processed { result, persisted }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_not_mistaken_for_other_db_errors() {
        let err = DbErr::Custom("boom".to_string());
        assert!(!is_unique_violation(&err));
    }
}
