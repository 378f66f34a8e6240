//! Depth metrics calculation
//!
//! Summaries of a bounded depth copy. Cumulative volumes here are the inputs
//! a display layer needs for percent-of-depth bars.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DepthBuffer, PriceLevel};

/// Computed metrics for one depth read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthMetrics {
    /// Best bid price
    pub best_bid: Option<Decimal>,

    /// Best ask price
    pub best_ask: Option<Decimal>,

    /// Mid price (average of best bid and ask)
    pub mid_price: Option<Decimal>,

    /// Spread in basis points
    pub spread_bps: Option<Decimal>,

    /// Simple imbalance: (bid_vol - ask_vol) / (bid_vol + ask_vol)
    pub imbalance: Option<Decimal>,

    /// Total bid volume over the copied levels
    pub bid_volume: Decimal,

    /// Total ask volume over the copied levels
    pub ask_volume: Decimal,

    /// Number of bid levels
    pub bid_levels: usize,

    /// Number of ask levels
    pub ask_levels: usize,
}

impl DepthMetrics {
    pub fn from_depth(depth: &DepthBuffer) -> Self {
        let best_bid = depth.bids().first().map(|l| l.price);
        let best_ask = depth.asks().first().map(|l| l.price);
        let bid_volume: Decimal = depth.bids().iter().map(|l| l.volume).sum();
        let ask_volume: Decimal = depth.asks().iter().map(|l| l.volume).sum();

        let mid_price = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        };

        let spread_bps = match (best_bid, best_ask, mid_price) {
            (Some(bid), Some(ask), Some(mid)) if mid > Decimal::ZERO => {
                Some((ask - bid) / mid * Decimal::from(10000))
            }
            _ => None,
        };

        let total = bid_volume + ask_volume;
        let imbalance = if total > Decimal::ZERO {
            Some((bid_volume - ask_volume) / total)
        } else {
            None
        };

        Self {
            best_bid,
            best_ask,
            mid_price,
            spread_bps,
            imbalance,
            bid_volume,
            ask_volume,
            bid_levels: depth.bids().len(),
            ask_levels: depth.asks().len(),
        }
    }

    /// Check if both sides have data
    pub fn is_two_sided(&self) -> bool {
        self.bid_levels > 0 && self.ask_levels > 0
    }
}

/// Running cumulative volume of `levels`, best first.
///
/// `cumulative_volume(levels)[i]` is the volume of levels `0..=i`.
pub fn cumulative_volume(levels: &[PriceLevel]) -> impl Iterator<Item = Decimal> + '_ {
    levels.iter().scan(Decimal::ZERO, |acc, level| {
        *acc += level.volume;
        Some(*acc)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::{OrderBook, Side};
    use rust_decimal_macros::dec;

    fn read(book: &OrderBook) -> DepthBuffer {
        let mut buffer = DepthBuffer::new(10);
        book.read_depth(&mut buffer);
        buffer
    }

    #[test]
    fn test_two_sided_metrics() {
        let mut book = OrderBook::new();
        book.upsert(Side::Bid, dec!(100), dec!(1));
        book.upsert(Side::Bid, dec!(99), dec!(2));
        book.upsert(Side::Ask, dec!(102), dec!(1.5));
        book.upsert(Side::Ask, dec!(103), dec!(2.5));

        let metrics = DepthMetrics::from_depth(&read(&book));

        assert_eq!(metrics.best_bid, Some(dec!(100)));
        assert_eq!(metrics.best_ask, Some(dec!(102)));
        assert_eq!(metrics.mid_price, Some(dec!(101)));
        assert_eq!(metrics.bid_volume, dec!(3));
        assert_eq!(metrics.ask_volume, dec!(4));
        // (3 - 4) / 7
        assert!(metrics.imbalance.unwrap() < Decimal::ZERO);
        assert!(metrics.is_two_sided());
    }

    #[test]
    fn test_one_sided_metrics() {
        let mut book = OrderBook::new();
        book.upsert(Side::Bid, dec!(100), dec!(5));

        let metrics = DepthMetrics::from_depth(&read(&book));

        assert_eq!(metrics.mid_price, None);
        assert_eq!(metrics.spread_bps, None);
        assert_eq!(metrics.imbalance, Some(dec!(1)));
        assert!(!metrics.is_two_sided());
    }

    #[test]
    fn test_cumulative_volume() {
        let levels = [
            PriceLevel::new(dec!(100), dec!(1)),
            PriceLevel::new(dec!(99), dec!(2)),
            PriceLevel::new(dec!(98), dec!(0.5)),
        ];
        let sums: Vec<Decimal> = cumulative_volume(&levels).collect();
        assert_eq!(sums, vec![dec!(1), dec!(3), dec!(3.5)]);
    }
}
