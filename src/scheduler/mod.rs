//! Periodic jobs: the resolution scan and the watchlist monitor
//!
//! Both loops tick on a fixed interval until the shutdown future completes.
//! A failing market or collection is logged and skipped; it never aborts the
//! rest of the round.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::config::{OracleConfig, ResolverConfig};
use crate::error::ResolutionError;
use crate::indexer::MarketDirectory;
use crate::oracle::OracleService;
use crate::persistence::CsvPersistence;
use crate::resolver::{ResolutionEngine, ResolutionState};

/// Tally of one scan round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub resolved: usize,
    /// Not actionable this round (already resolved, too early, busy, dry run)
    pub skipped: usize,
    pub failed: usize,
}

pub struct ResolutionScheduler {
    engine: Arc<ResolutionEngine>,
    directory: Arc<dyn MarketDirectory>,
    interval: Duration,
    max_concurrent: usize,
    scan_limit: usize,
}

impl ResolutionScheduler {
    pub fn new(
        engine: Arc<ResolutionEngine>,
        directory: Arc<dyn MarketDirectory>,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            engine,
            directory,
            interval: Duration::from_secs(config.scan_interval_secs.max(1)),
            max_concurrent: config.max_concurrent.max(1),
            scan_limit: config.scan_limit,
        }
    }

    /// One scan: list due markets and attempt each with bounded concurrency
    pub async fn run_once(&self, now: DateTime<Utc>) -> ScanSummary {
        tracing::info!("🔄 Checking for markets ready for resolution...");

        let markets = match self.directory.resolvable_markets(now, self.scan_limit).await {
            Ok(markets) => markets,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list resolvable markets");
                return ScanSummary::default();
            }
        };
        tracing::info!(count = markets.len(), "Markets ready for resolution");

        let caller = self.engine.identity();
        let results: Vec<_> = stream::iter(markets)
            .map(|market_id| {
                let engine = self.engine.clone();
                async move { engine.resolve(market_id, caller).await }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut summary = ScanSummary::default();
        for result in results {
            match result {
                Ok(report) if matches!(report.state, ResolutionState::Resolved(_)) => {
                    summary.resolved += 1
                }
                Ok(report) if report.state == ResolutionState::Failed => summary.failed += 1,
                Ok(_) => summary.skipped += 1,
                Err(
                    ResolutionError::AlreadyResolved
                    | ResolutionError::TooEarly { .. }
                    | ResolutionError::Busy
                    | ResolutionError::SettlementPending(_),
                ) => summary.skipped += 1,
                Err(_) => summary.failed += 1,
            }
        }

        tracing::info!(
            resolved = summary.resolved,
            skipped = summary.skipped,
            failed = summary.failed,
            "Resolution scan complete"
        );
        self.engine.prune_settled();
        summary
    }

    /// Scan on a fixed interval until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once(Utc::now()).await;
                }
                _ = &mut shutdown => {
                    tracing::info!("Resolution scheduler stopping");
                    break;
                }
            }
        }
    }
}

/// Periodically prices the watched collections and records each consensus
pub struct WatchlistMonitor {
    oracle: Arc<OracleService>,
    watchlist: Vec<String>,
    interval: Duration,
    persistence: Option<Arc<CsvPersistence>>,
}

impl WatchlistMonitor {
    pub fn new(oracle: Arc<OracleService>, config: &OracleConfig) -> Self {
        Self {
            oracle,
            watchlist: config.watchlist.clone(),
            interval: Duration::from_secs(config.monitor_interval_secs.max(1)),
            persistence: None,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<CsvPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Price every watched collection once; returns how many produced a price
    pub async fn run_once(&self) -> usize {
        tracing::info!(collections = self.watchlist.len(), "🔄 Monitoring watched collections...");
        let mut priced = 0;
        for slug in &self.watchlist {
            match self.oracle.consensus(slug).await {
                Ok(consensus) => {
                    priced += 1;
                    if let Some(persistence) = &self.persistence {
                        if let Err(e) = persistence.save_price(&consensus).await {
                            tracing::warn!(asset = %slug, error = %e, "Failed to persist price");
                        }
                    }
                }
                Err(e) => tracing::warn!(asset = %slug, error = %e, "Watchlist price unavailable"),
            }
        }
        priced
    }

    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = &mut shutdown => {
                    tracing::info!("Watchlist monitor stopping");
                    break;
                }
            }
        }
    }
}
