use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Success,
    Failed,
}

/// Published by the billing worker describing the outcome of invoking the
/// payment gateway for a single TollEvent. Emitted for both SUCCESS and
/// FAILED outcomes, and keyed by `vehicleId` so a downstream reader sees
/// each vehicle's payments in issuance order.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub event_id: String,

    /// absent if the DB write that would have produced it failed
    pub transaction_id: Option<String>,

    pub vehicle_id: String,

    pub status: PaymentStatus,

    pub gateway_reference: Option<String>,

    pub error_message: Option<String>,

    /// epoch milliseconds
    pub processed_time: i64,
}
