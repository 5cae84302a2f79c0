//! Market analyst: reads trader sentiment off a market's share split
//!
//! Advisory only. Nothing here feeds resolution; the heuristics are fixed
//! thresholds over indexer totals and the consensus floor.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ethers::types::Address;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::indexer::ActivityFeed;
use crate::oracle::OracleService;
use crate::types::MarketActivity;

/// YES share above which the crowd reads bullish
const BULLISH_ABOVE: Decimal = dec!(0.6);
/// YES share below which the crowd reads bearish
const BEARISH_BELOW: Decimal = dec!(0.4);

const BASE_CONFIDENCE: Decimal = dec!(0.5);
const CONFIDENCE_PER_TRADE: Decimal = dec!(0.05);
const MAX_CONFIDENCE: Decimal = dec!(0.95);

/// Largest move `predict_price` will project, at full confidence
const MAX_DRIFT: Decimal = dec!(0.1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Bullish => write!(f, "bullish"),
            Sentiment::Bearish => write!(f, "bearish"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    BuyYes,
    BuyNo,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentReading {
    pub sentiment: Sentiment,
    /// 0.5 with no trades, +0.05 per trade, capped at 0.95
    pub confidence: Decimal,
    pub recommendation: Recommendation,
}

/// Classify a market by its YES share
pub fn analyze_sentiment(activity: &MarketActivity) -> SentimentReading {
    let Some(yes) = activity.yes_fraction() else {
        return SentimentReading {
            sentiment: Sentiment::Neutral,
            confidence: BASE_CONFIDENCE,
            recommendation: Recommendation::Hold,
        };
    };

    let (sentiment, recommendation) = if yes > BULLISH_ABOVE {
        (Sentiment::Bullish, Recommendation::BuyYes)
    } else if yes < BEARISH_BELOW {
        (Sentiment::Bearish, Recommendation::BuyNo)
    } else {
        (Sentiment::Neutral, Recommendation::Hold)
    };

    let confidence = CONFIDENCE_PER_TRADE
        .checked_mul(Decimal::from(activity.total_trades))
        .and_then(|c| c.checked_add(BASE_CONFIDENCE))
        .map_or(MAX_CONFIDENCE, |c| c.min(MAX_CONFIDENCE));

    SentimentReading {
        sentiment,
        confidence,
        recommendation,
    }
}

/// Nudge the floor toward the crowd's direction, at most 10% at full confidence.
/// `None` without a usable floor.
pub fn predict_price(floor: Decimal, sentiment: Sentiment, confidence: Decimal) -> Option<Decimal> {
    if floor <= Decimal::ZERO {
        return None;
    }
    let drift = MAX_DRIFT.checked_mul(confidence)?;
    let multiplier = match sentiment {
        Sentiment::Bullish => Decimal::ONE.checked_add(drift)?,
        Sentiment::Bearish => Decimal::ONE.checked_sub(drift)?,
        Sentiment::Neutral => Decimal::ONE,
    };
    floor.checked_mul(multiplier).map(|p| p.normalize())
}

/// Human-readable lines behind an analysis
pub fn generate_reasoning(
    floor: Option<Decimal>,
    activity: &MarketActivity,
    confidence: Decimal,
) -> Vec<String> {
    let mut reasoning = Vec::with_capacity(5);

    match floor {
        Some(price) => reasoning.push(format!("Current floor price: {:.4} ETH", price)),
        None => reasoning.push("Floor price unavailable".to_string()),
    }

    match activity.yes_fraction() {
        Some(yes) => reasoning.push(format!("Market sentiment: {:.1}% bullish", yes * dec!(100))),
        None => reasoning.push("No trading activity yet".to_string()),
    }

    reasoning.push(format!("Total volume: {:.2} ETH", activity.total_volume));
    reasoning.push(format!("Number of trades: {}", activity.total_trades));
    reasoning.push(format!("Analysis confidence: {:.0}%", confidence * dec!(100)));
    reasoning
}

fn default_include_prediction() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeMarketRequest {
    pub market_id: String,
    pub collection_slug: String,
    #[serde(default = "default_include_prediction")]
    pub include_prediction: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysisResponse {
    pub market_id: String,
    pub collection_slug: String,
    pub current_floor_price: Option<Decimal>,
    pub predicted_price: Option<Decimal>,
    pub confidence: f64,
    pub sentiment: Sentiment,
    pub recommendation: Recommendation,
    pub reasoning: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Combines the consensus floor with indexer activity
pub struct MarketAnalyst {
    oracle: Arc<OracleService>,
    feed: Arc<dyn ActivityFeed>,
}

impl MarketAnalyst {
    pub fn new(oracle: Arc<OracleService>, feed: Arc<dyn ActivityFeed>) -> Self {
        Self { oracle, feed }
    }

    pub async fn handle_analysis_request(
        &self,
        request: &AnalyzeMarketRequest,
    ) -> Result<MarketAnalysisResponse> {
        let market_id = Address::from_str(&request.market_id)
            .with_context(|| format!("Invalid market id: {}", request.market_id))?;

        // an unpriced collection still gets a sentiment read
        let floor = match self.oracle.consensus(&request.collection_slug).await {
            Ok(consensus) => Some(consensus.price),
            Err(e) => {
                tracing::warn!(
                    collection = %request.collection_slug,
                    error = %e,
                    "No floor for analysis"
                );
                None
            }
        };

        let activity = self
            .feed
            .market_activity(market_id)
            .await
            .context("Failed to fetch market activity")?
            .unwrap_or_default();

        let reading = analyze_sentiment(&activity);
        let predicted_price = if request.include_prediction {
            floor.and_then(|price| predict_price(price, reading.sentiment, reading.confidence))
        } else {
            None
        };

        tracing::info!(
            market_id = %format!("{:#x}", market_id),
            collection = %request.collection_slug,
            sentiment = %reading.sentiment,
            confidence = %reading.confidence,
            "Market analysed"
        );

        Ok(MarketAnalysisResponse {
            market_id: request.market_id.clone(),
            collection_slug: request.collection_slug.clone(),
            current_floor_price: floor,
            predicted_price,
            confidence: reading.confidence.to_f64().unwrap_or(0.5),
            sentiment: reading.sentiment,
            recommendation: reading.recommendation,
            reasoning: generate_reasoning(floor, &activity, reading.confidence),
            timestamp: Utc::now(),
        })
    }
}
