//! Resolution engine
//!
//! Drives one market from Open to Resolved. Every attempt re-reads the contract
//! first, so a market resolved elsewhere is never submitted twice, and a
//! transaction whose receipt was lost is reconciled before anything new is sent.

pub mod decision;
mod locks;
mod state;

pub use locks::MarketLocks;
pub use state::{ResolutionState, StateBook};

use chrono::Utc;
use ethers::types::Address;
use serde::Serialize;
use std::sync::Arc;

use crate::chain::{MarketGateway, TxStatus};
use crate::error::ResolutionError;
use crate::oracle::OracleService;
use crate::persistence::{CsvPersistence, ResolutionRecord};
use crate::settlement::SettlementSubmitter;
use crate::types::{MarketStatus, ResolutionDecision, SettlementOutcome, SettlementReceipt};

/// What a completed attempt produced
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub market_id: Address,
    pub state: ResolutionState,
    pub decision: Option<ResolutionDecision>,
    pub receipt: Option<SettlementReceipt>,
}

pub struct ResolutionEngine {
    oracle: Arc<OracleService>,
    gateway: Arc<dyn MarketGateway>,
    submitter: SettlementSubmitter,
    locks: MarketLocks,
    states: StateBook,
    persistence: Option<Arc<CsvPersistence>>,
    dry_run: bool,
}

impl ResolutionEngine {
    pub fn new(
        oracle: Arc<OracleService>,
        gateway: Arc<dyn MarketGateway>,
        submitter: SettlementSubmitter,
        dry_run: bool,
    ) -> Self {
        Self {
            oracle,
            gateway,
            submitter,
            locks: MarketLocks::new(),
            states: StateBook::new(),
            persistence: None,
            dry_run,
        }
    }

    /// Record every attempt in the CSV audit trail
    pub fn with_persistence(mut self, persistence: Arc<CsvPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn oracle(&self) -> &Arc<OracleService> {
        &self.oracle
    }

    /// Address this engine signs with; the zero address when read-only
    pub fn identity(&self) -> Address {
        self.gateway.identity().unwrap_or_default()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn state_of(&self, market_id: Address) -> ResolutionState {
        self.states.get(market_id)
    }

    /// Release a `Failed` or `AwaitingReceipt` market after an operator
    /// reconciled it, e.g. a transaction dropped from the mempool.
    ///
    /// The contract is read first: a market that is no longer Open keeps the
    /// chain's answer and nothing is cleared. Returns the resulting local state.
    pub async fn reset(&self, market_id: Address) -> Result<ResolutionState, ResolutionError> {
        let _guard = self.locks.try_acquire(market_id)?;

        let local = self.states.get(market_id);
        if !matches!(
            local,
            ResolutionState::Failed | ResolutionState::AwaitingReceipt { .. }
        ) {
            return Ok(local);
        }

        let market = self.gateway.read_market(market_id).await?;
        if market.status != MarketStatus::Open {
            if let ResolutionState::AwaitingReceipt { side, .. } = local {
                self.states.set(market_id, ResolutionState::Resolved(side));
            }
            return Err(ResolutionError::AlreadyResolved);
        }

        tracing::info!(
            market_id = %format!("{:#x}", market_id),
            cleared = %local,
            "Local resolution state reset by operator"
        );
        self.states.set(market_id, ResolutionState::Open);
        Ok(ResolutionState::Open)
    }

    /// Forget resolved markets no attempt is holding; the contract keeps the
    /// authoritative record. Returns how many entries were dropped.
    pub fn prune_settled(&self) -> usize {
        let pruned = self
            .states
            .prune_resolved(|market_id| !self.locks.is_held(market_id));
        if pruned > 0 {
            tracing::debug!(pruned, "Settled markets pruned from state book");
        }
        pruned
    }

    /// Attempt to resolve a market on behalf of `caller`
    pub async fn resolve(
        &self,
        market_id: Address,
        caller: Address,
    ) -> Result<ResolutionReport, ResolutionError> {
        let attempt = self.attempt(market_id, caller).await;

        match &attempt {
            Ok(report) => tracing::info!(
                market_id = %format!("{:#x}", market_id),
                state = %report.state,
                "Resolution attempt finished"
            ),
            Err(e) => tracing::info!(
                market_id = %format!("{:#x}", market_id),
                reason = %e,
                retryable = e.is_retryable(),
                "Resolution attempt rejected"
            ),
        }

        if let Some(persistence) = &self.persistence {
            let record = ResolutionRecord::from_attempt(market_id, &attempt);
            if let Err(e) = persistence.save_resolution(record).await {
                tracing::warn!(error = %e, "Failed to persist resolution attempt");
            }
        }

        attempt
    }

    async fn attempt(
        &self,
        market_id: Address,
        caller: Address,
    ) -> Result<ResolutionReport, ResolutionError> {
        let _guard = self.locks.try_acquire(market_id)?;

        let market = self.gateway.read_market(market_id).await?;
        let local = self.states.get(market_id);

        if market.status != MarketStatus::Open {
            match local {
                // the lost transaction landed
                ResolutionState::AwaitingReceipt { side, .. } => {
                    self.states.set(market_id, ResolutionState::Resolved(side))
                }
                ResolutionState::Resolved(_) => {}
                // settled elsewhere; nothing local is still relevant
                _ => self.states.set(market_id, ResolutionState::Open),
            }
            return Err(ResolutionError::AlreadyResolved);
        }

        match local {
            ResolutionState::Failed => return Err(ResolutionError::NeedsReconciliation),
            ResolutionState::Resolved(_) => {
                tracing::warn!(
                    market_id = %format!("{:#x}", market_id),
                    "Contract reports Open for a market confirmed locally"
                );
                self.states.set(market_id, ResolutionState::Failed);
                return Err(ResolutionError::NeedsReconciliation);
            }
            ResolutionState::AwaitingReceipt {
                transaction_id,
                side,
            } => {
                return match self.gateway.receipt_status(transaction_id).await? {
                    None => Err(ResolutionError::SettlementPending(transaction_id)),
                    Some(TxStatus::Success) => {
                        let state = ResolutionState::Resolved(side);
                        self.states.set(market_id, state);
                        Ok(ResolutionReport {
                            market_id,
                            state,
                            decision: None,
                            receipt: Some(SettlementReceipt {
                                market_id,
                                transaction_id,
                                outcome: SettlementOutcome::Confirmed,
                                confirmed_price: None,
                            }),
                        })
                    }
                    Some(TxStatus::Reverted) => {
                        self.states.set(market_id, ResolutionState::Failed);
                        Err(ResolutionError::NeedsReconciliation)
                    }
                };
            }
            ResolutionState::Open | ResolutionState::Resolving | ResolutionState::ExpiredNoData => {}
        }

        decision::check_preconditions(&market, Utc::now(), caller)?;

        self.states.set(market_id, ResolutionState::Resolving);
        let consensus = match self.oracle.consensus(&market.asset_id).await {
            Ok(consensus) => consensus,
            Err(e) => {
                tracing::warn!(
                    market_id = %format!("{:#x}", market_id),
                    asset = %market.asset_id,
                    "No price data for an expired market"
                );
                self.states.set(market_id, ResolutionState::ExpiredNoData);
                return Err(e.into());
            }
        };

        let decision = decision::decide(&market, consensus, Utc::now());
        tracing::info!(
            market_id = %format!("{:#x}", market_id),
            asset = %market.asset_id,
            final_price = %decision.consensus.price,
            target_price = %market.target_price,
            confidence = decision.consensus.confidence,
            winner = %decision.winning_side,
            "Resolution decided"
        );

        if self.dry_run {
            self.states.set(market_id, ResolutionState::Open);
            return Ok(ResolutionReport {
                market_id,
                state: ResolutionState::Open,
                decision: Some(decision),
                receipt: None,
            });
        }

        // the price fetch can take seconds; someone else may have settled meanwhile
        match self.gateway.read_market(market_id).await {
            Ok(current) if current.status == MarketStatus::Open => {}
            Ok(_) => {
                self.states.set(market_id, ResolutionState::Open);
                return Err(ResolutionError::AlreadyResolved);
            }
            Err(e) => {
                self.states.set(market_id, ResolutionState::Open);
                return Err(e.into());
            }
        }

        let receipt = match self.submitter.submit(&decision).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.states.set(market_id, ResolutionState::Open);
                return Err(e.into());
            }
        };

        let state = match receipt.outcome {
            SettlementOutcome::Confirmed => ResolutionState::Resolved(decision.winning_side),
            SettlementOutcome::Reverted => ResolutionState::Failed,
            SettlementOutcome::TimedOut => ResolutionState::AwaitingReceipt {
                transaction_id: receipt.transaction_id,
                side: decision.winning_side,
            },
        };
        self.states.set(market_id, state);

        Ok(ResolutionReport {
            market_id,
            state,
            decision: Some(decision),
            receipt: Some(receipt),
        })
    }
}
