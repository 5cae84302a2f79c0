//! Settlement submitter
//!
//! Turns a resolution decision into exactly one `resolveMarket` transaction and
//! reports how it ended. There is no retry loop here: a `TimedOut` receipt means
//! "unknown", and the next scheduled attempt must re-read chain state instead of
//! sending again.

use std::sync::Arc;
use std::time::Duration;

use crate::chain::{units, MarketGateway, TxStatus};
use crate::error::SettlementError;
use crate::types::{ResolutionDecision, SettlementOutcome, SettlementReceipt};

pub struct SettlementSubmitter {
    gateway: Arc<dyn MarketGateway>,
    receipt_timeout: Duration,
}

impl SettlementSubmitter {
    pub fn new(gateway: Arc<dyn MarketGateway>, receipt_timeout: Duration) -> Self {
        Self {
            gateway,
            receipt_timeout,
        }
    }

    /// Submit the decision's consensus price and wait (bounded) for the receipt
    pub async fn submit(
        &self,
        decision: &ResolutionDecision,
    ) -> Result<SettlementReceipt, SettlementError> {
        let final_price = units::to_chain_precision(decision.consensus.price);
        let final_price_wei = units::decimal_to_wei(final_price)
            .map_err(|e| SettlementError::Encoding(e.to_string()))?;

        let transaction_id = self
            .gateway
            .send_resolution(decision.market_id, final_price_wei)
            .await?;

        let outcome = match tokio::time::timeout(
            self.receipt_timeout,
            self.gateway.wait_for_receipt(transaction_id),
        )
        .await
        {
            Ok(Ok(TxStatus::Success)) => SettlementOutcome::Confirmed,
            Ok(Ok(TxStatus::Reverted)) => SettlementOutcome::Reverted,
            Ok(Err(e)) => {
                // The transaction is out; losing the receipt says nothing about its fate.
                tracing::warn!(
                    market_id = %format!("{:#x}", decision.market_id),
                    tx_hash = %format!("{:#x}", transaction_id),
                    error = %e,
                    "Receipt lookup failed after submission"
                );
                SettlementOutcome::TimedOut
            }
            Err(_) => SettlementOutcome::TimedOut,
        };

        match outcome {
            SettlementOutcome::Confirmed => tracing::info!(
                market_id = %format!("{:#x}", decision.market_id),
                tx_hash = %format!("{:#x}", transaction_id),
                final_price = %final_price,
                winner = %decision.winning_side,
                "✅ Market resolved"
            ),
            SettlementOutcome::Reverted => tracing::error!(
                market_id = %format!("{:#x}", decision.market_id),
                tx_hash = %format!("{:#x}", transaction_id),
                "Resolution transaction reverted"
            ),
            SettlementOutcome::TimedOut => tracing::warn!(
                market_id = %format!("{:#x}", decision.market_id),
                tx_hash = %format!("{:#x}", transaction_id),
                timeout_secs = self.receipt_timeout.as_secs(),
                "No receipt within timeout; will reconcile next cycle"
            ),
        }

        Ok(SettlementReceipt {
            market_id: decision.market_id,
            transaction_id,
            outcome,
            confirmed_price: (outcome == SettlementOutcome::Confirmed).then_some(final_price),
        })
    }
}
