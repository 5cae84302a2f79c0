//! Oracle Aggregator - Combines quotes from multiple sources
//!
//! Produces a single consensus floor price (median) with a confidence score
//! based on how closely the sources agree. Pure: no clock, no I/O, no state.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::error::AggregationError;
use crate::types::{ConsensusPrice, Quote};

/// Confidence assigned when only one source answered
pub const SINGLE_SOURCE_CONFIDENCE: f64 = 0.7;

/// Confidence when the relative spread cannot be computed
pub const UNDEFINED_SPREAD_CONFIDENCE: f64 = 0.5;

/// Spread thresholds (exclusive upper bound) and the confidence they earn
const SPREAD_TIERS: [(Decimal, f64); 3] = [
    (Decimal::from_parts(1, 0, 0, false, 2), 0.95),
    (Decimal::from_parts(5, 0, 0, false, 2), 0.85),
    (Decimal::from_parts(10, 0, 0, false, 2), 0.75),
];

/// Confidence when sources disagree by 10% or more
const WIDE_SPREAD_CONFIDENCE: f64 = 0.60;

/// Combine successful quotes into a consensus price.
///
/// Arrival order does not matter; the result depends only on the multiset of
/// prices and source ids.
pub fn aggregate(
    asset_id: &str,
    quotes: &[Quote],
    computed_at: DateTime<Utc>,
) -> Result<ConsensusPrice, AggregationError> {
    if quotes.is_empty() {
        return Err(AggregationError::NoData);
    }

    // one price per source; a repeated source keeps its lowest ask
    let mut by_source: BTreeMap<&str, Decimal> = BTreeMap::new();
    for quote in quotes {
        by_source
            .entry(quote.source_id.as_str())
            .and_modify(|p| *p = (*p).min(quote.price))
            .or_insert(quote.price);
    }

    let prices: Vec<Decimal> = by_source.values().copied().collect();
    let price = median(&prices).ok_or(AggregationError::NoData)?;
    let confidence = confidence_for(&prices);

    Ok(ConsensusPrice {
        asset_id: asset_id.to_string(),
        price,
        confidence,
        contributing_source_count: by_source.len(),
        sources: by_source.keys().map(|s| s.to_string()).collect(),
        computed_at,
    })
}

/// Median of the prices; mean of the two middle values for even counts
pub fn median(prices: &[Decimal]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        let (low, high) = (sorted[mid - 1], sorted[mid]);
        // sorted, so the difference is non-negative and cannot overflow
        Some(low + (high - low) / Decimal::TWO)
    }
}

/// Relative spread `(max - min) / mean`, `None` when the mean is zero or
/// does not fit in a `Decimal`
pub fn relative_spread(prices: &[Decimal]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }
    let min = prices.iter().copied().min()?;
    let max = prices.iter().copied().max()?;
    let sum = prices
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(*p))?;
    let mean = sum.checked_div(Decimal::from(prices.len()))?;
    if mean.is_zero() {
        return None;
    }
    (max.checked_sub(min)?).checked_div(mean)
}

/// Confidence score for a set of prices
pub fn confidence_for(prices: &[Decimal]) -> f64 {
    match prices.len() {
        0 => 0.0,
        1 => SINGLE_SOURCE_CONFIDENCE,
        _ => match relative_spread(prices) {
            None => UNDEFINED_SPREAD_CONFIDENCE,
            Some(spread) => SPREAD_TIERS
                .iter()
                .find(|(limit, _)| spread < *limit)
                .map(|(_, confidence)| *confidence)
                .unwrap_or(WIDE_SPREAD_CONFIDENCE),
        },
    }
}

/// Spread as a float, for logging
pub fn spread_f64(prices: &[Decimal]) -> Option<f64> {
    relative_spread(prices).and_then(|s| s.to_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(source: &str, price: Decimal) -> Quote {
        Quote::new(source, "azuki", price)
    }

    #[test]
    fn test_no_quotes_is_no_data() {
        let result = aggregate("azuki", &[], Utc::now());
        assert_eq!(result, Err(AggregationError::NoData));
    }

    #[test]
    fn test_single_source_baseline() {
        let consensus = aggregate("azuki", &[quote("opensea", dec!(12.5))], Utc::now()).unwrap();
        assert_eq!(consensus.price, dec!(12.5));
        assert_eq!(consensus.confidence, 0.7);
        assert_eq!(consensus.contributing_source_count, 1);
    }

    #[test]
    fn test_identical_pair_is_high_confidence() {
        let quotes = [quote("opensea", dec!(10)), quote("reservoir", dec!(10))];
        let consensus = aggregate("azuki", &quotes, Utc::now()).unwrap();
        assert_eq!(consensus.price, dec!(10));
        assert_eq!(consensus.confidence, 0.95);
        assert_eq!(consensus.sources.len(), 2);
    }

    #[test]
    fn test_median_resists_outlier() {
        let quotes = [
            quote("a", dec!(10)),
            quote("b", dec!(10.2)),
            quote("c", dec!(500)),
        ];
        let consensus = aggregate("azuki", &quotes, Utc::now()).unwrap();
        assert_eq!(consensus.price, dec!(10.2));
        assert_eq!(consensus.confidence, 0.60);
    }

    #[test]
    fn test_huge_prices_do_not_overflow() {
        let huge = Decimal::from_scientific("5e28").unwrap();
        let quotes = [quote("opensea", huge), quote("reservoir", huge)];
        let consensus = aggregate("azuki", &quotes, Utc::now()).unwrap();
        assert_eq!(consensus.price, huge);
        // the mean cannot be represented, so agreement is undefined
        assert_eq!(consensus.confidence, 0.5);

        let spread = [Decimal::MAX, Decimal::MAX - dec!(2)];
        assert_eq!(median(&spread), Some(Decimal::MAX - dec!(1)));
    }

    #[test]
    fn test_repeated_source_counts_once() {
        let quotes = [
            quote("opensea", dec!(10)),
            quote("opensea", dec!(9)),
            quote("reservoir", dec!(9)),
        ];
        let consensus = aggregate("azuki", &quotes, Utc::now()).unwrap();
        assert_eq!(consensus.contributing_source_count, 2);
        assert_eq!(consensus.sources.len(), 2);
        assert_eq!(consensus.price, dec!(9));
        assert_eq!(consensus.confidence, 0.95);
    }

    #[test]
    fn test_even_count_median_is_midpoint() {
        assert_eq!(median(&[dec!(4), dec!(1), dec!(3), dec!(2)]), Some(dec!(2.5)));
    }

    #[test]
    fn test_confidence_tiers() {
        // spread 0.5%
        assert_eq!(confidence_for(&[dec!(100), dec!(100.5)]), 0.95);
        // spread ~3%
        assert_eq!(confidence_for(&[dec!(100), dec!(103)]), 0.85);
        // spread ~7%
        assert_eq!(confidence_for(&[dec!(100), dec!(107)]), 0.75);
        // spread ~18%
        assert_eq!(confidence_for(&[dec!(100), dec!(120)]), 0.60);
    }

    #[test]
    fn test_tier_boundary_is_exclusive() {
        // (101 - 99) / 100 == 0.02 exactly, below 5% but not below 1%
        assert_eq!(confidence_for(&[dec!(99), dec!(101)]), 0.85);
        // (105 - 95) / 100 == 0.10 exactly, not below 10%
        assert_eq!(confidence_for(&[dec!(95), dec!(105)]), 0.60);
    }

    #[test]
    fn test_zero_mean_is_undefined_spread() {
        assert_eq!(confidence_for(&[dec!(0), dec!(0)]), 0.5);
        let quotes = [quote("a", dec!(0)), quote("b", dec!(0))];
        let consensus = aggregate("azuki", &quotes, Utc::now()).unwrap();
        assert_eq!(consensus.price, dec!(0));
        assert_eq!(consensus.confidence, 0.5);
    }

    #[test]
    fn test_price_within_input_range() {
        let sets: Vec<Vec<Decimal>> = vec![
            vec![dec!(1)],
            vec![dec!(3), dec!(1)],
            vec![dec!(9.1), dec!(0.2), dec!(4.4)],
            vec![dec!(7), dec!(7), dec!(8), dec!(100), dec!(0.001)],
            vec![dec!(2.5), dec!(2.4), dec!(2.6), dec!(2.5)],
        ];
        for prices in sets {
            let quotes: Vec<Quote> = prices
                .iter()
                .enumerate()
                .map(|(i, p)| quote(&format!("s{}", i), *p))
                .collect();
            let consensus = aggregate("azuki", &quotes, Utc::now()).unwrap();
            let min = prices.iter().min().unwrap();
            let max = prices.iter().max().unwrap();
            assert!(consensus.price >= *min && consensus.price <= *max);
        }
    }

    #[test]
    fn test_arrival_order_does_not_matter() {
        let now = Utc::now();
        let forward = [
            quote("a", dec!(1.1)),
            quote("b", dec!(1.3)),
            quote("c", dec!(1.2)),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(
            aggregate("azuki", &forward, now).unwrap(),
            aggregate("azuki", &reversed, now).unwrap()
        );
    }
}
