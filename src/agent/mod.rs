//! Agent message surface
//!
//! JSON records exchanged with whatever transport carries requests to the
//! oracle and the resolver. The transport itself lives outside this crate.

use chrono::{DateTime, Utc};
use ethers::types::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ResolutionError;
use crate::resolver::{ResolutionEngine, ResolutionReport, ResolutionState};

/// Sources needed before a price counts as consensus
pub const CONSENSUS_MIN_SOURCES: usize = 2;

fn default_require_consensus() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub collection_slug: String,
    #[serde(default = "default_require_consensus")]
    pub require_consensus: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResponse {
    pub collection_slug: String,
    pub floor_price: Decimal,
    pub source_count: usize,
    pub sources: Vec<String>,
    pub confidence: f64,
    /// False when consensus was required but fewer than two sources answered
    pub consensus_reached: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveMarketRequest {
    pub market_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketResolutionResponse {
    pub market_id: String,
    pub success: bool,
    pub transaction_id: Option<String>,
    pub final_price: Option<Decimal>,
    /// "YES" or "NO"
    pub winning_side: Option<String>,
    pub outcome: Option<String>,
    pub error: Option<String>,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl MarketResolutionResponse {
    pub fn from_attempt(
        market_id: Address,
        attempt: &Result<ResolutionReport, ResolutionError>,
    ) -> Self {
        let market_id = format!("{:#x}", market_id);
        match attempt {
            Ok(report) => Self {
                market_id,
                success: matches!(report.state, ResolutionState::Resolved(_)),
                transaction_id: report
                    .receipt
                    .as_ref()
                    .map(|r| format!("{:#x}", r.transaction_id)),
                final_price: report
                    .receipt
                    .as_ref()
                    .and_then(|r| r.confirmed_price)
                    .or_else(|| report.decision.as_ref().map(|d| d.consensus.price)),
                winning_side: match report.state {
                    ResolutionState::Resolved(side)
                    | ResolutionState::AwaitingReceipt { side, .. } => Some(side.to_string()),
                    _ => report.decision.as_ref().map(|d| d.winning_side.to_string()),
                },
                outcome: Some(report.state.to_string()),
                error: None,
                retryable: false,
                timestamp: Utc::now(),
            },
            Err(e) => Self::rejected(market_id, e.to_string(), e.is_retryable()),
        }
    }

    fn rejected(market_id: String, error: String, retryable: bool) -> Self {
        Self {
            market_id,
            success: false,
            transaction_id: None,
            final_price: None,
            winning_side: None,
            outcome: None,
            error: Some(error),
            retryable,
            timestamp: Utc::now(),
        }
    }
}

/// On-demand resolution entry point; shares the engine with the scheduler
pub struct ResolverAgent {
    engine: Arc<ResolutionEngine>,
}

impl ResolverAgent {
    pub fn new(engine: Arc<ResolutionEngine>) -> Self {
        Self { engine }
    }

    pub async fn handle_resolve_request(
        &self,
        request: &ResolveMarketRequest,
    ) -> MarketResolutionResponse {
        let market_id = match Address::from_str(request.market_id.trim()) {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!(market = %request.market_id, error = %e, "Bad market address in request");
                return MarketResolutionResponse::rejected(
                    request.market_id.clone(),
                    format!("Invalid market address: {}", e),
                    false,
                );
            }
        };

        tracing::info!(market_id = %format!("{:#x}", market_id), "⚖️ Resolution requested");
        let attempt = self.engine.resolve(market_id, self.engine.identity()).await;
        MarketResolutionResponse::from_attempt(market_id, &attempt)
    }
}
