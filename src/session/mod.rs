//! Feed session module
//!
//! Connects to the depth server, keeps the session's book current and
//! reconnects with backoff when a session ends.

mod client;
mod feed;
mod supervisor;

pub use client::FeedClient;
pub use feed::{FeedSession, SessionEvent, SessionOptions, SessionState};
pub use supervisor::FeedSupervisor;
