//! Bounded best-first copies of the book for readers.

use super::PriceLevel;

/// Caller-owned storage for a depth read.
///
/// Allocated once with room for `max_depth` levels per side and reused on
/// every poll; filling it never grows the underlying vectors.
#[derive(Debug, Clone)]
pub struct DepthBuffer {
    max_depth: usize,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

impl DepthBuffer {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            bids: Vec::with_capacity(max_depth),
            asks: Vec::with_capacity(max_depth),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Bid levels from the last read, best first
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    /// Ask levels from the last read, best first
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub(crate) fn fill<B, A>(&mut self, bids: B, asks: A) -> (usize, usize)
    where
        B: Iterator<Item = PriceLevel>,
        A: Iterator<Item = PriceLevel>,
    {
        self.bids.clear();
        self.asks.clear();
        self.bids.extend(bids.take(self.max_depth));
        self.asks.extend(asks.take(self.max_depth));
        (self.bids.len(), self.asks.len())
    }
}
