//! Per-market exclusion
//!
//! At most one resolution attempt per market runs at a time. A second caller
//! does not queue behind the first; it is told the market is busy and the next
//! cycle picks it up again. An entry lives only while its guard is held.

use ethers::types::Address;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::ResolutionError;

#[derive(Debug, Default)]
pub struct MarketLocks {
    locks: Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>,
}

/// Exclusive hold on one market; dropping it releases the map entry
pub struct MarketGuard<'a> {
    locks: &'a MarketLocks,
    market_id: Address,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MarketGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(self.market_id);
    }
}

impl MarketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the market's guard, or `Busy` if another attempt holds it
    pub fn try_acquire(&self, market_id: Address) -> Result<MarketGuard<'_>, ResolutionError> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(market_id).or_default().clone()
        };
        match lock.try_lock_owned() {
            Ok(guard) => Ok(MarketGuard {
                locks: self,
                market_id,
                guard: Some(guard),
            }),
            Err(_) => {
                self.release(market_id);
                Err(ResolutionError::Busy)
            }
        }
    }

    /// Markets with a live entry
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether an attempt currently holds the market
    pub fn is_held(&self, market_id: Address) -> bool {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&market_id)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, market_id: Address) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // clones are only made under this mutex, so a count of one means idle
        if locks
            .get(&market_id)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false)
        {
            locks.remove(&market_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_holder_is_busy() {
        let locks = MarketLocks::new();
        let market = Address::from_low_u64_be(1);
        let guard = locks.try_acquire(market).unwrap();
        assert!(matches!(locks.try_acquire(market), Err(ResolutionError::Busy)));
        // other markets are independent
        assert!(locks.try_acquire(Address::from_low_u64_be(2)).is_ok());
        drop(guard);
        assert!(locks.try_acquire(market).is_ok());
    }

    #[test]
    fn test_released_markets_leave_no_entry() {
        let locks = MarketLocks::new();
        for n in 0..100 {
            let _guard = locks.try_acquire(Address::from_low_u64_be(n)).unwrap();
        }
        assert!(locks.is_empty());

        let held = locks.try_acquire(Address::from_low_u64_be(7)).unwrap();
        // a rejected contender must not evict the holder's entry
        assert!(locks.try_acquire(Address::from_low_u64_be(7)).is_err());
        assert_eq!(locks.len(), 1);
        assert!(locks.is_held(Address::from_low_u64_be(7)));
        drop(held);
        assert!(!locks.is_held(Address::from_low_u64_be(7)));
        assert!(locks.is_empty());
    }
}
