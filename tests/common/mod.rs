//! In-memory chain and price sources shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use ethers::types::{Address, H256, U256};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use floor_oracle::chain::{units, MarketGateway, TxStatus};
use floor_oracle::error::{ChainError, SourceError, SourceErrorKind};
use floor_oracle::oracle::{OracleService, PriceSource};
use floor_oracle::resolver::ResolutionEngine;
use floor_oracle::settlement::SettlementSubmitter;
use floor_oracle::types::{Market, MarketStatus, Quote};

pub fn resolver_address() -> Address {
    Address::from_low_u64_be(0xA11CE)
}

pub fn market_address(n: u64) -> Address {
    Address::from_low_u64_be(0x1000 + n)
}

/// An Open market for `asset` whose deadline passed a minute ago
pub fn due_market(n: u64, asset: &str, target_price: Decimal) -> Market {
    Market {
        market_id: market_address(n),
        asset_id: asset.to_string(),
        target_price,
        resolution_deadline: Utc::now() - ChronoDuration::minutes(1),
        status: MarketStatus::Open,
        resolver_identity: resolver_address(),
    }
}

/// Contract stand-in that applies `resolveMarket` the way the real one does
pub struct FakeChain {
    identity: Address,
    markets: Mutex<HashMap<Address, Market>>,
    receipts: Mutex<HashMap<H256, TxStatus>>,
    sent: Mutex<Vec<(Address, U256)>>,
    winners: Mutex<HashMap<Address, bool>>,
    withhold_receipts: AtomicBool,
    next_tx: AtomicU64,
}

impl FakeChain {
    pub fn new(markets: Vec<Market>) -> Self {
        Self {
            identity: resolver_address(),
            markets: Mutex::new(markets.into_iter().map(|m| (m.market_id, m)).collect()),
            receipts: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            winners: Mutex::new(HashMap::new()),
            withhold_receipts: AtomicBool::new(false),
            next_tx: AtomicU64::new(1),
        }
    }

    /// Broadcasts still apply, but receipts never come back
    pub fn withhold_receipts(&self, withhold: bool) {
        self.withhold_receipts.store(withhold, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Address, U256)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn status(&self, market_id: Address) -> MarketStatus {
        self.markets.lock().unwrap()[&market_id].status
    }

    /// The contract's `winningOutcome` after resolution
    pub fn winning_outcome(&self, market_id: Address) -> Option<bool> {
        self.winners.lock().unwrap().get(&market_id).copied()
    }
}

#[async_trait]
impl MarketGateway for FakeChain {
    fn identity(&self) -> Option<Address> {
        Some(self.identity)
    }

    async fn read_market(&self, market_id: Address) -> Result<Market, ChainError> {
        self.markets
            .lock()
            .unwrap()
            .get(&market_id)
            .cloned()
            .ok_or_else(|| ChainError::InvalidData(format!("no contract at {:#x}", market_id)))
    }

    async fn send_resolution(&self, market_id: Address, final_price_wei: U256) -> Result<H256, ChainError> {
        let tx = H256::from_low_u64_be(self.next_tx.fetch_add(1, Ordering::SeqCst));
        self.sent.lock().unwrap().push((market_id, final_price_wei));

        let mut markets = self.markets.lock().unwrap();
        let market = markets
            .get_mut(&market_id)
            .ok_or_else(|| ChainError::Rpc("execution reverted".into()))?;
        let status = if market.status == MarketStatus::Open
            && Utc::now() >= market.resolution_deadline
            && self.identity == market.resolver_identity
        {
            let final_price = units::wei_to_decimal(final_price_wei)?;
            market.status = MarketStatus::Resolved;
            self.winners
                .lock()
                .unwrap()
                .insert(market_id, final_price > market.target_price);
            TxStatus::Success
        } else {
            TxStatus::Reverted
        };
        self.receipts.lock().unwrap().insert(tx, status);
        Ok(tx)
    }

    async fn wait_for_receipt(&self, transaction_id: H256) -> Result<TxStatus, ChainError> {
        if self.withhold_receipts.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        self.receipts
            .lock()
            .unwrap()
            .get(&transaction_id)
            .copied()
            .ok_or_else(|| ChainError::Rpc("unknown transaction".into()))
    }

    async fn receipt_status(&self, transaction_id: H256) -> Result<Option<TxStatus>, ChainError> {
        if self.withhold_receipts.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.receipts.lock().unwrap().get(&transaction_id).copied())
    }
}

/// Price source that answers the same price after an optional delay
pub struct FixedSource {
    id: String,
    price: Option<Decimal>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FixedSource {
    pub fn new(id: &str, price: Decimal) -> Self {
        Self {
            id: id.to_string(),
            price: Some(price),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// A source with no listed floor
    pub fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            price: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl PriceSource for FixedSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, asset_id: &str) -> Result<Quote, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.price {
            Some(price) => Ok(Quote::new(&self.id, asset_id, price)),
            None => Err(SourceError::new(&self.id, SourceErrorKind::MissingField, "no floor")),
        }
    }
}

pub fn oracle(sources: Vec<Arc<dyn PriceSource>>) -> Arc<OracleService> {
    Arc::new(OracleService::new(sources, Duration::from_secs(2), 0))
}

pub fn engine(
    oracle: Arc<OracleService>,
    chain: Arc<FakeChain>,
    receipt_timeout: Duration,
    dry_run: bool,
) -> Arc<ResolutionEngine> {
    let gateway: Arc<dyn MarketGateway> = chain;
    let submitter = SettlementSubmitter::new(gateway.clone(), receipt_timeout);
    Arc::new(ResolutionEngine::new(oracle, gateway, submitter, dry_run))
}
