//! Per-market resolution state

use ethers::types::{Address, H256};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::types::Side;

/// Local view of where a market is in the resolution lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionState {
    Open,
    Resolving,
    /// A transaction was broadcast but its receipt never arrived
    AwaitingReceipt { transaction_id: H256, side: Side },
    /// Deadline passed but no source produced a price; retried next cycle
    ExpiredNoData,
    Resolved(Side),
    /// Settlement reverted; needs an operator before another attempt
    Failed,
}

impl ResolutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResolutionState::Resolved(_) | ResolutionState::Failed)
    }
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionState::Open => write!(f, "open"),
            ResolutionState::Resolving => write!(f, "resolving"),
            ResolutionState::AwaitingReceipt { .. } => write!(f, "awaiting_receipt"),
            ResolutionState::ExpiredNoData => write!(f, "expired_no_data"),
            ResolutionState::Resolved(side) => write!(f, "resolved_{}", side.to_string().to_lowercase()),
            ResolutionState::Failed => write!(f, "failed"),
        }
    }
}

/// States of every market the engine has touched
#[derive(Debug, Default)]
pub struct StateBook {
    states: Mutex<HashMap<Address, ResolutionState>>,
}

impl StateBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unknown markets are `Open`
    pub fn get(&self, market_id: Address) -> ResolutionState {
        let states = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        states.get(&market_id).copied().unwrap_or(ResolutionState::Open)
    }

    /// Setting `Open` drops the entry, since unknown markets read as `Open`
    pub fn set(&self, market_id: Address, state: ResolutionState) {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state == ResolutionState::Open {
            states.remove(&market_id);
        } else {
            states.insert(market_id, state);
        }
    }

    /// Drop `Resolved` entries the predicate allows; returns how many went
    pub fn prune_resolved<F>(&self, mut removable: F) -> usize
    where
        F: FnMut(Address) -> bool,
    {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = states.len();
        states.retain(|id, state| !(matches!(state, ResolutionState::Resolved(_)) && removable(*id)));
        before - states.len()
    }

    pub fn len(&self) -> usize {
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ResolutionState::Resolved(Side::Yes).is_terminal());
        assert!(ResolutionState::Failed.is_terminal());
        assert!(!ResolutionState::ExpiredNoData.is_terminal());
        assert!(!ResolutionState::AwaitingReceipt {
            transaction_id: H256::zero(),
            side: Side::No
        }
        .is_terminal());
    }

    #[test]
    fn test_unknown_market_is_open() {
        let book = StateBook::new();
        let market = Address::from_low_u64_be(3);
        assert_eq!(book.get(market), ResolutionState::Open);
        book.set(market, ResolutionState::Resolved(Side::No));
        assert_eq!(book.get(market), ResolutionState::Resolved(Side::No));
        assert_eq!(book.get(market).to_string(), "resolved_no");
    }

    #[test]
    fn test_open_leaves_no_entry() {
        let book = StateBook::new();
        let market = Address::from_low_u64_be(3);
        book.set(market, ResolutionState::ExpiredNoData);
        assert_eq!(book.len(), 1);
        book.set(market, ResolutionState::Open);
        assert!(book.is_empty());
    }

    #[test]
    fn test_prune_keeps_failed_and_pending() {
        let book = StateBook::new();
        let (a, b, c, d) = (
            Address::from_low_u64_be(1),
            Address::from_low_u64_be(2),
            Address::from_low_u64_be(3),
            Address::from_low_u64_be(4),
        );
        book.set(a, ResolutionState::Resolved(Side::Yes));
        book.set(b, ResolutionState::Resolved(Side::No));
        book.set(c, ResolutionState::Failed);
        book.set(
            d,
            ResolutionState::AwaitingReceipt {
                transaction_id: H256::zero(),
                side: Side::Yes,
            },
        );

        // b is still held by a running attempt
        assert_eq!(book.prune_resolved(|id| id != b), 1);
        assert_eq!(book.get(a), ResolutionState::Open);
        assert_eq!(book.get(b), ResolutionState::Resolved(Side::No));
        assert_eq!(book.get(c), ResolutionState::Failed);
        assert_eq!(book.len(), 3);
    }
}
