//! Portfolio advisor: risk score and plain-language advice for one trader
//!
//! Positions are valued at cost. The indexer carries no share prices, so
//! unrealized P&L is reported as zero rather than guessed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ethers::types::Address;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::indexer::ActivityFeed;
use crate::types::Position;

const DIVERSIFICATION_WEIGHT: Decimal = dec!(0.6);
const CONCENTRATION_WEIGHT: Decimal = dec!(0.4);

const HIGH_RISK_ABOVE: Decimal = dec!(0.7);
const MODERATE_RISK_ABOVE: Decimal = dec!(0.5);

pub const MAX_RECOMMENDATIONS: usize = 8;

/// Risk from holding few markets
fn diversification_risk(count: usize) -> Decimal {
    match count {
        0 => Decimal::ZERO,
        1 => dec!(0.8),
        2 => dec!(0.6),
        3 | 4 => dec!(0.4),
        _ => dec!(0.2),
    }
}

/// Share of capital in the largest position; 1 means all in one market
fn concentration_risk(positions: &[Position]) -> Decimal {
    let Some(total) = positions
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.total_invested))
    else {
        return Decimal::ONE;
    };
    if total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let largest = positions
        .iter()
        .map(|p| p.total_invested)
        .max()
        .unwrap_or(Decimal::ZERO);
    largest.checked_div(total).unwrap_or(Decimal::ONE)
}

/// Portfolio risk in [0, 1]: 60% diversification, 40% concentration
pub fn calculate_risk_score(positions: &[Position]) -> Decimal {
    if positions.is_empty() {
        return Decimal::ZERO;
    }
    let score = diversification_risk(positions.len()) * DIVERSIFICATION_WEIGHT
        + concentration_risk(positions) * CONCENTRATION_WEIGHT;
    score.min(Decimal::ONE)
}

/// Up to eight suggestions, most specific first
pub fn generate_recommendations(
    positions: &[Position],
    risk_score: Decimal,
    realized_pnl: Decimal,
) -> Vec<String> {
    let mut advice: Vec<String> = Vec::new();

    match positions.len() {
        0 => {
            advice.push("Start by exploring active markets and taking positions".into());
            advice.push("Consider starting with 2-3 different collections to diversify risk".into());
        }
        1 => {
            advice.push("Your portfolio is concentrated in a single market".into());
            advice.push("Consider diversifying across 3-4 different NFT collections".into());
        }
        2 | 3 => {
            advice.push("Good start on diversification".into());
            advice.push("Consider expanding to 4-5 positions for better risk distribution".into());
        }
        _ => advice.push("Well-diversified portfolio across multiple markets".into()),
    }

    if risk_score > HIGH_RISK_ABOVE {
        advice.push("High risk score detected - consider reducing position sizes".into());
        advice.push("Hedge your positions by taking opposite sides in correlated markets".into());
    } else if risk_score > MODERATE_RISK_ABOVE {
        advice.push("Moderate risk - monitor positions closely".into());
        advice.push("Balance YES and NO positions to reduce directional risk".into());
    } else {
        advice.push("Good risk management".into());
    }

    if realized_pnl > Decimal::ZERO {
        advice.push(format!("Positive realized P&L: {:.4} ETH", realized_pnl));
        advice.push("Consider taking profits on winning positions before resolution".into());
    } else if realized_pnl < Decimal::ZERO {
        advice.push(format!("Realized losses: {:.4} ETH", realized_pnl.abs()));
        advice.push("Review your trading strategy and market analysis".into());
    }

    if !positions.is_empty() {
        advice.push("Regularly review floor prices before market resolution".into());
        advice.push("Set reminders for resolution dates to claim winnings promptly".into());
    }

    advice.push("Use the market analyst for data-driven insights".into());
    advice.push("Monitor upcoming resolution dates to optimize exit timing".into());

    advice.truncate(MAX_RECOMMENDATIONS);
    advice
}

fn default_include_recommendations() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAnalysisRequest {
    pub user_address: String,
    #[serde(default = "default_include_recommendations")]
    pub include_recommendations: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAnalysisResponse {
    pub user_address: String,
    pub total_positions: usize,
    pub total_invested: Decimal,
    pub current_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub recommendations: Vec<String>,
    pub risk_score: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct PortfolioAdvisor {
    feed: Arc<dyn ActivityFeed>,
}

impl PortfolioAdvisor {
    pub fn new(feed: Arc<dyn ActivityFeed>) -> Self {
        Self { feed }
    }

    pub async fn handle_analysis_request(
        &self,
        request: &PortfolioAnalysisRequest,
    ) -> Result<PortfolioAnalysisResponse> {
        let user = Address::from_str(&request.user_address)
            .with_context(|| format!("Invalid user address: {}", request.user_address))?;

        let positions = self
            .feed
            .positions(user)
            .await
            .context("Failed to fetch positions")?;

        let total_invested = sum(positions.iter().map(|p| p.total_invested))?;
        let realized_pnl = sum(positions.iter().map(|p| p.realized_pnl))?;
        let risk_score = calculate_risk_score(&positions);

        let recommendations = if request.include_recommendations {
            generate_recommendations(&positions, risk_score, realized_pnl)
        } else {
            Vec::new()
        };

        tracing::info!(
            user = %format!("{:#x}", user),
            positions = positions.len(),
            risk_score = %risk_score,
            "Portfolio analysed"
        );

        Ok(PortfolioAnalysisResponse {
            user_address: request.user_address.clone(),
            total_positions: positions.len(),
            total_invested,
            current_value: total_invested,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl,
            recommendations,
            risk_score: risk_score.to_f64().unwrap_or(1.0),
            timestamp: Utc::now(),
        })
    }
}

fn sum(values: impl Iterator<Item = Decimal>) -> Result<Decimal> {
    let mut total = Decimal::ZERO;
    for value in values {
        total = total
            .checked_add(value)
            .context("Portfolio totals overflow")?;
    }
    Ok(total)
}
