use std::time::Duration;

use rand::Rng;
use rust_decimal::Decimal;

/// What to charge, and who to charge it for. `transaction_id` is our own
/// `billing_transactions.id`, passed through so the gateway call can be
/// correlated with the row that triggered it.
#[derive(Debug, Clone)]
pub struct PaymentCharge {
    pub transaction_id: i64,
    pub toll_event_id: String,
    pub vehicle_id: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub gateway_reference: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentGatewayError {
    /// A typed decline or transient gateway failure, with the gateway's
    /// own error code attached for the `billing_transactions.error_message` column.
    #[error("{error_code}: {message}")]
    Declined { message: String, error_code: String },

    /// The gateway call itself never returned within the configured ceiling.
    #[error("payment gateway call timed out")]
    Timeout,
}

impl PaymentGatewayError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Declined { error_code, .. } => error_code,
            Self::Timeout => "GW_TIMEOUT",
        }
    }
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, charge: &PaymentCharge) -> Result<PaymentReceipt, PaymentGatewayError>;
}

const POSSIBLE_DECLINE_REASONS: &[(&str, &str)] = &[
    ("Insufficient funds", "INSUFFICIENT_FUNDS"),
    ("Card declined", "CARD_DECLINED"),
    ("Account frozen", "ACCOUNT_FROZEN"),
    ("Invalid card details", "INVALID_CARD"),
    ("Expired card", "EXPIRED_CARD"),
];

/// Chance any given charge hits a simulated transient network error
/// before a success/decline outcome is even rolled.
const TRANSIENT_FAILURE_RATE: f64 = 0.03;

/// Stands in for a real payment processor: random 50-300ms latency, a
/// small chance of a transient `GW_TIMEOUT`, and a configurable decline
/// rate split across a handful of realistic reasons.
pub struct MockPaymentGateway {
    fail_rate: f64,
    call_timeout: Duration,
}

impl MockPaymentGateway {
    pub fn new(fail_rate: f64, call_timeout: Duration) -> Self {
        Self {
            fail_rate,
            call_timeout,
        }
    }

    async fn simulate(&self, charge: &PaymentCharge) -> Result<PaymentReceipt, PaymentGatewayError> {
        let delay_secs = rand::thread_rng().gen_range(0.05..=0.3);
        tokio::time::sleep(Duration::from_secs_f64(delay_secs)).await;

        tracing::info!(
            transaction_id = charge.transaction_id,
            toll_event_id = charge.toll_event_id,
            vehicle_id = charge.vehicle_id,
            amount = %charge.amount,
            currency = charge.currency,
            "charging mock payment gateway"
        );

        if rand::thread_rng().gen::<f64>() < TRANSIENT_FAILURE_RATE {
            return Err(PaymentGatewayError::Declined {
                message: "Simulated network timeout".to_string(),
                error_code: "GW_TIMEOUT".to_string(),
            });
        }

        let is_success = rand::thread_rng().gen::<f64>() > self.fail_rate;

        if is_success {
            let reference = format!(
                "MOCKGW_{}",
                uuid::Uuid::new_v4().simple().to_string()[..16].to_uppercase()
            );
            Ok(PaymentReceipt {
                gateway_reference: reference,
            })
        } else {
            let (message, error_code) =
                POSSIBLE_DECLINE_REASONS[rand::thread_rng().gen_range(0..POSSIBLE_DECLINE_REASONS.len())];
            Err(PaymentGatewayError::Declined {
                message: message.to_string(),
                error_code: error_code.to_string(),
            })
        }
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(&self, charge: &PaymentCharge) -> Result<PaymentReceipt, PaymentGatewayError> {
        match tokio::time::timeout(self.call_timeout, self.simulate(charge)).await {
            Ok(result) => result,
            Err(_) => Err(PaymentGatewayError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn charge() -> PaymentCharge {
        PaymentCharge {
            transaction_id: 1,
            toll_event_id: "evt-1".to_string(),
            vehicle_id: "VEH_ABC".to_string(),
            amount: dec!(1.50),
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn a_zero_fail_rate_always_succeeds() {
        let gateway = MockPaymentGateway::new(0.0, Duration::from_secs(1));

        for _ in 0..20 {
            let result = gateway.charge(&charge()).await;
            // the 3% simulated transient rate can still fire; only assert
            // that declines never happen for non-transient reasons.
            if let Err(err) = result {
                assert_eq!(err.error_code(), "GW_TIMEOUT");
            }
        }
    }

    #[tokio::test]
    async fn a_fail_rate_of_one_never_succeeds() {
        let gateway = MockPaymentGateway::new(1.0, Duration::from_secs(1));
        let result = gateway.charge(&charge()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn a_zero_timeout_always_times_out() {
        let gateway = MockPaymentGateway::new(0.0, Duration::from_nanos(1));
        let result = gateway.charge(&charge()).await;
        assert!(matches!(result, Err(PaymentGatewayError::Timeout)));
    }
}
