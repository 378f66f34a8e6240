//! Core order book implementation
//!
//! Uses BTreeMap for efficient sorted price level management. Bids are keyed
//! by `Reverse<Decimal>` so that both sides iterate best-first.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{DepthBuffer, PriceLevel, Side};
use crate::codec::SnapshotMessage;

/// Two-sided price level store for a single feed session
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    /// Whether the book has been seeded by a snapshot
    synchronized: bool,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the volume at `price`, replacing any previous volume.
    ///
    /// A non-positive volume removes the level instead, so the store never
    /// holds an empty level.
    pub fn upsert(&mut self, side: Side, price: Decimal, volume: Decimal) {
        if volume <= Decimal::ZERO {
            self.remove(side, price);
            return;
        }
        match side {
            Side::Bid => {
                self.bids.insert(Reverse(price), volume);
            }
            Side::Ask => {
                self.asks.insert(price, volume);
            }
        }
    }

    /// Remove the level at `price`, returning its volume if it was present
    pub fn remove(&mut self, side: Side, price: Decimal) -> Option<Decimal> {
        match side {
            Side::Bid => self.bids.remove(&Reverse(price)),
            Side::Ask => self.asks.remove(&price),
        }
    }

    /// Remove every level on one side
    pub fn clear(&mut self, side: Side) {
        match side {
            Side::Bid => self.bids.clear(),
            Side::Ask => self.asks.clear(),
        }
    }

    /// Drop opposite-side levels that a level on `side` at `price` would cross.
    ///
    /// Returns the number of levels removed.
    pub fn clear_crossed(&mut self, side: Side, price: Decimal) -> usize {
        let mut removed = 0;
        match side.opposite() {
            Side::Ask => {
                while let Some((&ask, _)) = self.asks.first_key_value() {
                    if ask > price {
                        break;
                    }
                    self.asks.pop_first();
                    removed += 1;
                }
            }
            Side::Bid => {
                while let Some((&Reverse(bid), _)) = self.bids.first_key_value() {
                    if bid < price {
                        break;
                    }
                    self.bids.pop_first();
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Replace the whole book from a full snapshot.
    ///
    /// Slots with a non-positive price or volume are empty and skipped. Ask
    /// levels at or below the snapshot's best bid are dropped, so the book is
    /// never left crossed.
    pub fn resync(&mut self, snapshot: &SnapshotMessage) {
        self.bids.clear();
        self.asks.clear();

        for (&price, &volume) in snapshot.bid_prices.iter().zip(&snapshot.bid_volumes) {
            if price > Decimal::ZERO && volume > Decimal::ZERO {
                self.bids.insert(Reverse(price), volume);
            }
        }

        for (&price, &volume) in snapshot.ask_prices.iter().zip(&snapshot.ask_volumes) {
            if price > Decimal::ZERO && volume > Decimal::ZERO {
                self.asks.insert(price, volume);
            }
        }

        if let Some(bid) = self.best_bid() {
            self.clear_crossed(Side::Bid, bid);
        }

        self.synchronized = true;
    }

    /// Copy at most `buffer.max_depth()` best levels per side into `buffer`.
    ///
    /// Returns the number of bid and ask levels copied.
    pub fn read_depth(&self, buffer: &mut DepthBuffer) -> (usize, usize) {
        buffer.fill(self.bids(), self.asks())
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    /// Volume resting at `price` on `side`
    pub fn volume_at(&self, side: Side, price: Decimal) -> Option<Decimal> {
        match side {
            Side::Bid => self.bids.get(&Reverse(price)).copied(),
            Side::Ask => self.asks.get(&price).copied(),
        }
    }

    /// Bid levels, best (highest) first
    pub fn bids(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.bids
            .iter()
            .map(|(Reverse(p), v)| PriceLevel::new(*p, *v))
    }

    /// Ask levels, best (lowest) first
    pub fn asks(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.asks.iter().map(|(p, v)| PriceLevel::new(*p, *v))
    }

    /// Number of levels on one side
    pub fn level_count(&self, side: Side) -> usize {
        match side {
            Side::Bid => self.bids.len(),
            Side::Ask => self.asks.len(),
        }
    }

    /// Check if both sides are empty
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Best bid at or above best ask
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// Check if the book has been seeded by a snapshot
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }
}
