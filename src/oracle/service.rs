//! Oracle service - fan-out to all sources, fan-in to the aggregator
//!
//! Sources are queried concurrently; each one is bounded by its own timeout so
//! a straggler never holds up the others. Retries are applied here, not in the
//! adapters.

use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use super::aggregator;
use super::sources::PriceSource;
use crate::agent::{PriceRequest, PriceResponse, CONSENSUS_MIN_SOURCES};
use crate::config::OracleConfig;
use crate::error::{AggregationError, SourceError, SourceErrorKind};
use crate::types::{ConsensusPrice, Quote};

/// Result of one fan-out round, kept for logging and persistence
#[derive(Debug, Clone)]
pub struct FetchRound {
    pub quotes: Vec<Quote>,
    pub failures: Vec<SourceError>,
}

pub struct OracleService {
    sources: Vec<Arc<dyn PriceSource>>,
    timeout: Duration,
    retries: usize,
}

impl OracleService {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, timeout: Duration, retries: usize) -> Self {
        Self {
            sources,
            timeout,
            retries,
        }
    }

    pub fn from_config(sources: Vec<Arc<dyn PriceSource>>, config: &OracleConfig) -> Self {
        Self::new(sources, config.source_timeout(), config.source_retries)
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id().to_string()).collect()
    }

    /// Query every source concurrently and collect what came back
    pub async fn fetch_all(&self, asset_id: &str) -> FetchRound {
        let fetches = self
            .sources
            .iter()
            .map(|source| self.fetch_one(source.as_ref(), asset_id));
        let results = join_all(fetches).await;

        let mut quotes = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(quote) => {
                    tracing::debug!(
                        source = %quote.source_id,
                        asset = %asset_id,
                        price = %quote.price,
                        "Quote received"
                    );
                    quotes.push(quote);
                }
                Err(e) => {
                    tracing::warn!(
                        source = %e.source_id,
                        asset = %asset_id,
                        kind = %e.kind,
                        error = %e.detail,
                        "Price source failed"
                    );
                    failures.push(e);
                }
            }
        }

        FetchRound { quotes, failures }
    }

    /// Consensus price for a collection across all configured sources
    pub async fn consensus(&self, asset_id: &str) -> Result<ConsensusPrice, AggregationError> {
        let round = self.fetch_all(asset_id).await;
        let consensus = aggregator::aggregate(asset_id, &round.quotes, Utc::now())?;

        tracing::info!(
            asset = %asset_id,
            price = %consensus.price,
            confidence = consensus.confidence,
            sources = consensus.contributing_source_count,
            failed = round.failures.len(),
            "Consensus price computed"
        );
        Ok(consensus)
    }

    /// Answer a price request message
    pub async fn handle_price_request(
        &self,
        request: &PriceRequest,
    ) -> Result<PriceResponse, AggregationError> {
        tracing::info!(
            asset = %request.collection_slug,
            require_consensus = request.require_consensus,
            "📥 Price request"
        );
        let consensus = self.consensus(&request.collection_slug).await?;

        let consensus_reached = !request.require_consensus
            || consensus.contributing_source_count >= CONSENSUS_MIN_SOURCES;
        if !consensus_reached {
            tracing::warn!(
                asset = %request.collection_slug,
                sources = consensus.contributing_source_count,
                "Consensus required but too few sources answered"
            );
        }

        Ok(PriceResponse {
            collection_slug: request.collection_slug.clone(),
            floor_price: consensus.price,
            source_count: consensus.contributing_source_count,
            sources: consensus.sources.into_iter().collect(),
            confidence: consensus.confidence,
            consensus_reached,
            timestamp: consensus.computed_at,
        })
    }

    async fn fetch_one(&self, source: &dyn PriceSource, asset_id: &str) -> Result<Quote, SourceError> {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, source.fetch(asset_id)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::new(
                    source.id(),
                    SourceErrorKind::Timeout,
                    format!("no answer within {}ms", self.timeout.as_millis()),
                )),
            };

            match result {
                Ok(quote) => return Ok(quote),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::debug!(
                        source = %source.id(),
                        attempt,
                        error = %e,
                        "Retrying price source"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
