//! Order book module
//!
//! Maintains a depth-bounded order book from incremental updates and periodic
//! full snapshots, and hands bounded copies to a reader.

mod book;
mod depth;
mod folder;
mod metrics;
mod shared;

pub use book::OrderBook;
pub use depth::DepthBuffer;
pub use folder::{fold, resolve_side, Action, UpdateKind};
pub use metrics::{cumulative_volume, DepthMetrics};
pub use shared::SharedOrderBook;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// The other side of the book
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// A single level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub volume: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}
