//! Core types used throughout the oracle and resolver
//!
//! Defines quotes, consensus prices, markets, decisions and settlement receipts.

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::ChainError;

/// A single price observation from one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub source_id: String,
    pub asset_id: String,
    /// Floor price, denominated in the asset's native currency (ETH)
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(source_id: impl Into<String>, asset_id: impl Into<String>, price: Decimal) -> Self {
        Self {
            source_id: source_id.into(),
            asset_id: asset_id.into(),
            price,
            observed_at: Utc::now(),
        }
    }
}

/// Aggregated price across all sources that answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusPrice {
    pub asset_id: String,
    pub price: Decimal,
    /// Agreement score in [0, 1]
    pub confidence: f64,
    pub contributing_source_count: usize,
    pub sources: BTreeSet<String>,
    pub computed_at: DateTime<Utc>,
}

/// On-chain market lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketStatus {
    Open,
    Resolved,
    Disputed,
}

impl MarketStatus {
    /// Decode the contract's `MarketStatus` enum
    pub fn from_code(code: u8) -> Result<Self, ChainError> {
        match code {
            0 => Ok(MarketStatus::Open),
            1 => Ok(MarketStatus::Resolved),
            2 => Ok(MarketStatus::Disputed),
            other => Err(ChainError::UnknownStatus(other)),
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::Open => write!(f, "Open"),
            MarketStatus::Resolved => write!(f, "Resolved"),
            MarketStatus::Disputed => write!(f, "Disputed"),
        }
    }
}

/// Snapshot of a market as read from its contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub market_id: Address,
    /// Collection slug the market is written against
    pub asset_id: String,
    pub target_price: Decimal,
    pub resolution_deadline: DateTime<Utc>,
    pub status: MarketStatus,
    pub resolver_identity: Address,
}

/// Outcome side of a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// The boolean the contract uses for `winningOutcome`
    pub fn as_outcome(&self) -> bool {
        matches!(self, Side::Yes)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// The single resolution intent produced for a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionDecision {
    pub market_id: Address,
    pub consensus: ConsensusPrice,
    pub winning_side: Side,
    pub decided_at: DateTime<Utc>,
}

/// How a submitted settlement transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    Confirmed,
    Reverted,
    TimedOut,
}

impl fmt::Display for SettlementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementOutcome::Confirmed => write!(f, "confirmed"),
            SettlementOutcome::Reverted => write!(f, "reverted"),
            SettlementOutcome::TimedOut => write!(f, "timed_out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub market_id: Address,
    pub transaction_id: H256,
    pub outcome: SettlementOutcome,
    /// Price the chain accepted; only set when confirmed
    pub confirmed_price: Option<Decimal>,
}

/// Trading totals for one market as the indexer reports them, in whole units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketActivity {
    pub yes_shares: Decimal,
    pub no_shares: Decimal,
    pub total_volume: Decimal,
    pub total_trades: u64,
}

impl MarketActivity {
    /// Fraction of outstanding shares on YES; `None` before the first trade
    pub fn yes_fraction(&self) -> Option<Decimal> {
        let total = self.yes_shares.checked_add(self.no_shares)?;
        if total.is_zero() {
            None
        } else {
            self.yes_shares.checked_div(total)
        }
    }
}

/// One user's holding in one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub market_id: Address,
    pub yes_shares: Decimal,
    pub no_shares: Decimal,
    pub total_invested: Decimal,
    pub realized_pnl: Decimal,
}
