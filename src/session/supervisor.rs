//! Session supervisor
//!
//! Runs one feed session at a time and replaces it with a fresh session
//! (and a fresh book) whenever it ends, backing off exponentially between
//! attempts that never reached the server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::{FeedSession, SessionEvent, SessionOptions};
use crate::config::Config;
use crate::error::{FeedError, Result};
use crate::poller::{DepthPoller, DepthSink};

/// Maximum backoff delay in milliseconds (60 seconds)
const MAX_BACKOFF_MS: u64 = 60_000;

/// How a single session run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Ended { connected: bool },
}

/// Keeps a depth session running with automatic reconnection
pub struct FeedSupervisor {
    config: Arc<Config>,
    reconnect_attempts: u32,
    last_successful_connection: Option<Instant>,
}

impl FeedSupervisor {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            reconnect_attempts: 0,
            last_successful_connection: None,
        }
    }

    /// When a session last reached the server
    pub fn last_successful_connection(&self) -> Option<Instant> {
        self.last_successful_connection
    }

    /// Run sessions until `shutdown` turns true or too many consecutive
    /// attempts fail to connect
    pub async fn run<S: DepthSink + ?Sized>(
        &mut self,
        sink: &mut S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(
            address = %self.config.address,
            port = self.config.port,
            "Starting feed supervisor"
        );

        loop {
            match self.run_session(sink, &mut shutdown).await? {
                SessionEnd::Shutdown => {
                    info!("Feed supervisor shut down");
                    return Ok(());
                }
                SessionEnd::Ended { connected: true } => {
                    self.last_successful_connection = Some(Instant::now());
                    self.reconnect_attempts = 0;
                }
                SessionEnd::Ended { connected: false } => {
                    self.reconnect_attempts += 1;
                }
            }

            if self.reconnect_attempts > self.config.max_reconnect_attempts {
                error!(
                    attempts = self.reconnect_attempts,
                    "Giving up on the depth server"
                );
                return Err(FeedError::MaxReconnectAttemptsExceeded);
            }

            let delay = backoff_delay(self.config.reconnect_delay_ms, self.reconnect_attempts);
            warn!(
                attempt = self.reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting..."
            );

            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Feed supervisor shut down");
                    return Ok(());
                }
                _ = sleep(delay) => {}
            }
        }
    }

    async fn run_session<S: DepthSink + ?Sized>(
        &mut self,
        sink: &mut S,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd> {
        let session = FeedSession::new(SessionOptions {
            await_snapshot: self.config.await_snapshot,
        });
        let mut events = session.subscribe();
        session.connect(self.config.address, self.config.port)?;

        let poller = DepthPoller::from_config(&self.config);
        let polled = tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => None,
            result = poller.run(&session, sink) => Some(result),
        };

        session.disconnect();
        session.wait_terminated().await;

        let mut connected = false;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::Connected => connected = true,
                SessionEvent::Disconnected => info!("Feed session disconnected"),
                SessionEvent::TransportError(kind) => {
                    warn!(kind = ?kind, "Feed session lost its connection")
                }
                SessionEvent::Exception(e) => error!(error = %e, "Feed session failed"),
            }
        }

        match polled {
            None => Ok(SessionEnd::Shutdown),
            Some(Ok(summary)) => {
                info!(polls = summary.polls, events = summary.events, "Feed session ended");
                Ok(SessionEnd::Ended { connected })
            }
            Some(Err(e)) => {
                warn!(error = %e, "Depth polling ended early");
                Ok(SessionEnd::Ended { connected })
            }
        }
    }
}

/// Delay before the next attempt: `base_ms * 2^min(attempts, 6)`, capped at
/// [`MAX_BACKOFF_MS`]
pub fn backoff_delay(base_ms: u64, attempts: u32) -> Duration {
    let delay = base_ms.saturating_mul(2u64.pow(attempts.min(6)));
    Duration::from_millis(delay.min(MAX_BACKOFF_MS))
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        // Sender gone: nobody can request a shutdown any more
        std::future::pending::<()>().await;
    }
}
