//! Depth poller
//!
//! Reads bounded depth from a connected session at a fixed frequency and hands
//! each copy to a [`DepthSink`]. Once a second it also reports how many update
//! events the session processed.

use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::{Config, Frequency};
use crate::error::Result;
use crate::orderbook::{DepthBuffer, DepthMetrics};
use crate::session::FeedSession;

/// Window over which processed events are counted
const RATE_WINDOW: Duration = Duration::from_millis(1000);

/// Consumer of depth reads
pub trait DepthSink: Send {
    /// Called once per poll with the current bounded depth
    fn on_depth(&mut self, depth: &DepthBuffer);

    /// Called about once a second with the number of update events processed
    /// since the previous call
    fn on_event_rate(&mut self, _events: u64) {}
}

/// Totals for one polling run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub polls: u64,
    pub events: u64,
}

/// Periodic reader of a session's book
#[derive(Debug, Clone)]
pub struct DepthPoller {
    frequency: Frequency,
    depth_levels: usize,
    connect_timeout: Duration,
}

impl DepthPoller {
    pub fn new(frequency: Frequency, depth_levels: usize, connect_timeout: Duration) -> Self {
        Self {
            frequency,
            depth_levels,
            connect_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.frequency,
            config.depth_levels,
            config.connect_timeout(),
        )
    }

    /// Poll `session` until it stops being connected.
    ///
    /// Fails if the session does not connect within the connect timeout.
    pub async fn run<S: DepthSink + ?Sized>(
        &self,
        session: &FeedSession,
        sink: &mut S,
    ) -> Result<PollSummary> {
        session.wait_connected(self.connect_timeout).await?;
        info!(
            frequency = %self.frequency,
            depth = self.depth_levels,
            "Depth polling started"
        );

        let mut buffer = DepthBuffer::new(self.depth_levels);
        let mut ticker = interval(self.frequency.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut state = session.state_changes();
        let mut window_start = Instant::now();
        let mut summary = PollSummary::default();

        loop {
            let tick = tokio::select! {
                _ = ticker.tick() => true,
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    false
                }
            };

            if !session.is_connected() {
                break;
            }
            if !tick {
                continue;
            }

            session.read_depth(&mut buffer);
            sink.on_depth(&buffer);
            summary.polls += 1;

            if window_start.elapsed() >= RATE_WINDOW {
                let events = session.read_and_reset_events();
                summary.events += events;
                sink.on_event_rate(events);
                window_start = Instant::now();
            }
        }

        info!(
            polls = summary.polls,
            events = summary.events,
            "Depth polling stopped"
        );
        Ok(summary)
    }
}

/// Sink that reports depth through `tracing`
#[derive(Debug, Default)]
pub struct TracingSink {
    last: DepthMetrics,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics of the most recent depth read
    pub fn last_metrics(&self) -> &DepthMetrics {
        &self.last
    }
}

impl DepthSink for TracingSink {
    fn on_depth(&mut self, depth: &DepthBuffer) {
        self.last = DepthMetrics::from_depth(depth);
        debug!(
            best_bid = ?self.last.best_bid,
            best_ask = ?self.last.best_ask,
            bid_levels = self.last.bid_levels,
            ask_levels = self.last.ask_levels,
            "Depth read"
        );
    }

    fn on_event_rate(&mut self, events: u64) {
        info!(
            events_per_sec = events,
            mid_price = ?self.last.mid_price,
            spread_bps = ?self.last.spread_bps,
            imbalance = ?self.last.imbalance,
            "Order book status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_frame, FeedMessage, SnapshotMessage};
    use crate::error::FeedError;
    use crate::orderbook::PriceLevel;
    use crate::session::SessionOptions;
    use bytes::BytesMut;
    use rust_decimal_macros::dec;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct RecordingSink {
        reads: Vec<(Vec<PriceLevel>, Vec<PriceLevel>)>,
        rates: Vec<u64>,
    }

    impl DepthSink for RecordingSink {
        fn on_depth(&mut self, depth: &DepthBuffer) {
            self.reads.push((depth.bids().to_vec(), depth.asks().to_vec()));
        }

        fn on_event_rate(&mut self, events: u64) {
            self.rates.push(events);
        }
    }

    #[tokio::test]
    async fn test_times_out_when_never_connected() {
        let session = FeedSession::new(SessionOptions::default());
        let poller = DepthPoller::new(Frequency::Hz20, 5, Duration::from_millis(50));
        let mut sink = RecordingSink::default();

        let result = poller.run(&session, &mut sink).await;

        assert!(matches!(result, Err(FeedError::ConnectionTimeout)));
        assert!(sink.reads.is_empty());
    }

    #[tokio::test]
    async fn test_polls_until_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let snapshot = FeedMessage::Snapshot(SnapshotMessage::from_levels(
                3,
                &[(dec!(100), dec!(1)), (dec!(99), dec!(2)), (dec!(98), dec!(3))],
                &[(dec!(101), dec!(1))],
            ));
            let mut frame = BytesMut::new();
            encode_frame(&snapshot, &mut frame).unwrap();
            stream.write_all(&frame).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let session = FeedSession::new(SessionOptions::default());
        session.connect("127.0.0.1".parse().unwrap(), port).unwrap();

        let stopper = std::sync::Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            stopper.disconnect();
        });

        let poller = DepthPoller::new(Frequency::Hz20, 2, Duration::from_secs(2));
        let mut sink = RecordingSink::default();
        let summary = poller.run(&session, &mut sink).await.unwrap();

        assert!(summary.polls > 0);
        assert_eq!(summary.polls as usize, sink.reads.len());

        let (bids, asks) = sink.reads.last().unwrap();
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].price, dec!(100));
        assert_eq!(bids[1].price, dec!(99));
        assert_eq!(asks.len(), 1);
    }

    #[test]
    fn test_tracing_sink_keeps_last_metrics() {
        let mut book = crate::orderbook::OrderBook::new();
        book.upsert(crate::orderbook::Side::Bid, dec!(10), dec!(1));
        book.upsert(crate::orderbook::Side::Ask, dec!(12), dec!(1));
        let mut buffer = DepthBuffer::new(5);
        book.read_depth(&mut buffer);

        let mut sink = TracingSink::new();
        sink.on_depth(&buffer);

        assert_eq!(sink.last_metrics().mid_price, Some(dec!(11)));
    }
}
