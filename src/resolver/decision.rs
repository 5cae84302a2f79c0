//! Pure resolution rules
//!
//! Preconditions are checked strictly in this order, first failure wins:
//! status, deadline, resolver identity. The winning side uses a strict
//! comparison so an exact tie resolves NO, matching the contract's
//! `finalPrice > targetPrice`.

use chrono::{DateTime, Utc};
use ethers::types::Address;
use rust_decimal::Decimal;

use crate::chain::units;
use crate::error::ResolutionError;
use crate::types::{ConsensusPrice, Market, MarketStatus, ResolutionDecision, Side};

/// Rules 1-3: idempotence guard, deadline, resolver capability
pub fn check_preconditions(
    market: &Market,
    now: DateTime<Utc>,
    caller: Address,
) -> Result<(), ResolutionError> {
    if market.status != MarketStatus::Open {
        return Err(ResolutionError::AlreadyResolved);
    }

    if now < market.resolution_deadline {
        let remaining = market.resolution_deadline - now;
        // round partial seconds up so "in 0s" never shows while still early
        let remaining_secs = (remaining.num_milliseconds() + 999) / 1000;
        return Err(ResolutionError::TooEarly { remaining_secs });
    }

    if caller != market.resolver_identity {
        return Err(ResolutionError::Unauthorized);
    }

    Ok(())
}

/// YES only when the price is strictly above target
pub fn winning_side(price: Decimal, target_price: Decimal) -> Side {
    if price > target_price {
        Side::Yes
    } else {
        Side::No
    }
}

/// Build the decision for a market whose preconditions already passed.
///
/// The consensus price is truncated to on-chain precision first so the side
/// chosen here is the side the contract will compute from the submitted price.
pub fn decide(market: &Market, mut consensus: ConsensusPrice, now: DateTime<Utc>) -> ResolutionDecision {
    consensus.price = units::to_chain_precision(consensus.price);
    let side = winning_side(consensus.price, market.target_price);
    ResolutionDecision {
        market_id: market.market_id,
        consensus,
        winning_side: side,
        decided_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn resolver() -> Address {
        Address::from_low_u64_be(0xABCD)
    }

    fn market(status: MarketStatus, deadline: DateTime<Utc>) -> Market {
        Market {
            market_id: Address::from_low_u64_be(1),
            asset_id: "azuki".to_string(),
            target_price: dec!(25),
            resolution_deadline: deadline,
            status,
            resolver_identity: resolver(),
        }
    }

    fn consensus(price: Decimal) -> ConsensusPrice {
        ConsensusPrice {
            asset_id: "azuki".to_string(),
            price,
            confidence: 0.7,
            contributing_source_count: 1,
            sources: BTreeSet::from(["opensea".to_string()]),
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_resolved_market_always_already_resolved() {
        let now = Utc::now();
        for status in [MarketStatus::Resolved, MarketStatus::Disputed] {
            // even when it is also too early and the caller is wrong
            let m = market(status, now + Duration::hours(1));
            assert!(matches!(
                check_preconditions(&m, now, Address::zero()),
                Err(ResolutionError::AlreadyResolved)
            ));
        }
    }

    #[test]
    fn test_too_early_regardless_of_caller() {
        let now = Utc::now();
        let m = market(MarketStatus::Open, now + Duration::seconds(90));
        for caller in [resolver(), Address::zero(), Address::from_low_u64_be(5)] {
            match check_preconditions(&m, now, caller) {
                Err(ResolutionError::TooEarly { remaining_secs }) => assert_eq!(remaining_secs, 90),
                other => panic!("expected TooEarly, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_sub_second_remaining_rounds_up() {
        let now = Utc::now();
        let m = market(MarketStatus::Open, now + Duration::milliseconds(300));
        assert!(matches!(
            check_preconditions(&m, now, resolver()),
            Err(ResolutionError::TooEarly { remaining_secs: 1 })
        ));
    }

    #[test]
    fn test_unauthorized_after_deadline() {
        let now = Utc::now();
        let m = market(MarketStatus::Open, now - Duration::seconds(1));
        assert!(matches!(
            check_preconditions(&m, now, Address::zero()),
            Err(ResolutionError::Unauthorized)
        ));
        assert!(check_preconditions(&m, now, resolver()).is_ok());
    }

    #[test]
    fn test_deadline_is_inclusive() {
        let now = Utc::now();
        let m = market(MarketStatus::Open, now);
        assert!(check_preconditions(&m, now, resolver()).is_ok());
    }

    #[test]
    fn test_tie_resolves_no() {
        assert_eq!(winning_side(dec!(25), dec!(25)), Side::No);
        assert_eq!(winning_side(dec!(25.000), dec!(25)), Side::No);
        assert_eq!(winning_side(dec!(25.0000001), dec!(25)), Side::Yes);
        assert_eq!(winning_side(dec!(24.9), dec!(25)), Side::No);
    }

    #[test]
    fn test_sub_wei_excess_is_a_tie() {
        let now = Utc::now();
        let m = market(MarketStatus::Open, now);
        // 25 + 1e-19 truncates to exactly 25 on-chain
        let d = decide(&m, consensus(dec!(25.0000000000000000001)), now);
        assert_eq!(d.winning_side, Side::No);
        assert_eq!(d.consensus.price, dec!(25));
    }

    #[test]
    fn test_decide_carries_market_and_consensus() {
        let now = Utc::now();
        let m = market(MarketStatus::Open, now);
        let d = decide(&m, consensus(dec!(30)), now);
        assert_eq!(d.market_id, m.market_id);
        assert_eq!(d.winning_side, Side::Yes);
        assert_eq!(d.decided_at, now);
    }
}
