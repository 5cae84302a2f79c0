//! On-chain market access
//!
//! The engine never mutates a market directly: it reads the contract state and
//! proposes a `resolveMarket(finalPrice)` transaction that the chain applies
//! atomically.

mod contract;
pub mod units;

pub use contract::EthersMarketGateway;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};

use crate::error::ChainError;
use crate::types::Market;

/// Execution result reported by a mined receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Reverted,
}

/// Read/write access to market contracts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Address transactions are signed with, if a key is configured
    fn identity(&self) -> Option<Address>;

    /// Read `{status, resolver, resolutionTimestamp, targetPrice}` and the collection slug
    async fn read_market(&self, market_id: Address) -> Result<Market, ChainError>;

    /// Sign and broadcast `resolveMarket(final_price_wei)`; returns the tx hash
    async fn send_resolution(&self, market_id: Address, final_price_wei: U256)
        -> Result<H256, ChainError>;

    /// Block until the transaction is mined
    async fn wait_for_receipt(&self, transaction_id: H256) -> Result<TxStatus, ChainError>;

    /// Non-blocking receipt lookup, `None` while still pending
    async fn receipt_status(&self, transaction_id: H256) -> Result<Option<TxStatus>, ChainError>;
}
