use crate::config::GatewayConfig;
use crate::domain::money::Amount;
use crate::domain::ports::{GatewayReceipt, PaymentGateway};
use crate::error::Result;
use async_trait::async_trait;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stand-in for the external payment gateway: answers after a fixed delay and
/// accepts a configurable share of payments.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    config: GatewayConfig,
}

impl SimulatedGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// A gateway that answers immediately and always accepts.
    pub fn always_accepting() -> Self {
        Self::new(GatewayConfig {
            latency: std::time::Duration::ZERO,
            success_rate: 1.0,
        })
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn process_payment(&self, amount: Amount) -> Result<GatewayReceipt> {
        tracing::debug!(%amount, "Processing payment");

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        let success = rand::thread_rng().gen_bool(self.config.success_rate.clamp(0.0, 1.0));
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let transaction_id = format!("mock_txn_{millis}");

        if success {
            tracing::debug!(%transaction_id, "Payment accepted");
            Ok(GatewayReceipt {
                success: true,
                transaction_id,
                message: "Payment processed successfully.".to_string(),
            })
        } else {
            tracing::warn!(%transaction_id, "Payment declined");
            Ok(GatewayReceipt {
                success: false,
                transaction_id,
                message: "Payment declined by the bank.".to_string(),
            })
        }
    }
}
