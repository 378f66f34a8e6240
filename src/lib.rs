//! Depth Observer - Market Depth Library
//!
//! This crate connects to a depth server over TCP, maintains a live order
//! book from incremental updates and periodic full snapshots, and hands
//! bounded best-first depth copies to a reader at a fixed frequency.

pub mod codec;
pub mod config;
pub mod error;
pub mod orderbook;
pub mod poller;
pub mod session;

pub use codec::{FeedMessage, SnapshotMessage, UpdateEvent};
pub use config::{Config, Frequency};
pub use error::{FeedError, FoldError, Result};
pub use orderbook::{DepthBuffer, DepthMetrics, OrderBook, PriceLevel, SharedOrderBook, Side};
pub use poller::{DepthPoller, DepthSink, PollSummary, TracingSink};
pub use session::{FeedSession, FeedSupervisor, SessionEvent, SessionOptions, SessionState};
