use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

/// Lifecycle of a `billing_transactions` row. Terminal statuses are
/// `Success` and `Failed`; `Retry` is reachable only by an out-of-band
/// policy engine, not by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "transaction_status")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "SUCCESS")]
    Success,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "RETRY")]
    Retry,
}

impl TransactionStatus {
    /// Statuses that make the idempotency probe treat a `toll_event_id`
    /// as already handled.
    pub fn is_already_handled(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Processing | Self::Pending | Self::Retry
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "billing_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(unique)]
    pub toll_event_id: String,

    pub vehicle_id: String,

    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub amount: Decimal,

    pub currency: String,

    pub status: TransactionStatus,

    pub transaction_time: DateTime<Utc>,

    pub last_updated: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub payment_gateway_ref: Option<String>,

    pub payment_method_details: Option<String>,

    pub error_message: Option<String>,

    pub retry_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
