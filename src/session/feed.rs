//! Feed session lifecycle
//!
//! A [`FeedSession`] owns one connection attempt and one fresh order book. It
//! runs the receive loop on its own task, folds updates and resyncs from
//! snapshots, and publishes its lifecycle through notifications. Sessions are
//! single use: reconnecting always means building a new session.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use super::FeedClient;
use crate::codec::FeedMessage;
use crate::error::{FeedError, Result};
use crate::orderbook::{DepthBuffer, SharedOrderBook};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

/// Notification published by a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    /// Recoverable socket error; the session disconnects after reporting it
    TransportError(io::ErrorKind),
    /// Fatal protocol or I/O failure; the session is faulted
    Exception(Arc<FeedError>),
}

/// Per-session behaviour switches
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Drop incremental updates until the first snapshot seeds the book
    pub await_snapshot: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            await_snapshot: true,
        }
    }
}

/// Why a session ended
#[derive(Debug)]
enum Outcome {
    Requested,
    RemoteClosed,
    TransportError(FeedError),
    Fault(FeedError),
}

/// A single connection to the depth server and the book it maintains
#[derive(Debug)]
pub struct FeedSession {
    options: SessionOptions,
    book: SharedOrderBook,
    state: watch::Sender<SessionState>,
    cancel: watch::Sender<bool>,
    terminated: watch::Sender<bool>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
    events_processed: AtomicU64,
    started: AtomicBool,
    torn_down: AtomicBool,
}

impl FeedSession {
    /// Create an unconnected session with a fresh, empty book
    pub fn new(options: SessionOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            book: SharedOrderBook::new(),
            state: watch::Sender::new(SessionState::Disconnected),
            cancel: watch::Sender::new(false),
            terminated: watch::Sender::new(false),
            subscribers: Mutex::new(Vec::new()),
            events_processed: AtomicU64::new(0),
            started: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Start connecting to `address:port` and run the receive loop on a new
    /// task. Must be called from within a tokio runtime.
    ///
    /// A session connects at most once.
    pub fn connect(self: &Arc<Self>, address: IpAddr, port: u16) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(FeedError::SessionAlreadyStarted);
        }
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(FeedError::SessionClosed);
        }

        let addr = SocketAddr::new(address.to_canonical(), port);
        self.transition(SessionState::Disconnected, SessionState::Connecting);

        let session = Arc::clone(self);
        tokio::spawn(async move { session.run(addr).await });
        Ok(())
    }

    /// Tear the session down.
    ///
    /// Idempotent and safe to call concurrently with the receive loop. Once
    /// this returns no further notifications are delivered.
    pub fn disconnect(&self) {
        self.teardown(Outcome::Requested);
    }

    /// Subscribe to lifecycle notifications.
    ///
    /// The receiver ends once the session has been torn down.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock();
        if !self.torn_down.load(Ordering::SeqCst) {
            subscribers.push(tx);
        }
        rx
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch lifecycle state changes
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Wait until the session is connected.
    ///
    /// Fails with `ConnectionTimeout` if that takes longer than `limit`, and
    /// with `SessionClosed` if the session ends first.
    pub async fn wait_connected(&self, limit: Duration) -> Result<()> {
        let mut rx = self.state.subscribe();
        let reached = timeout(
            limit,
            rx.wait_for(|state| match state {
                SessionState::Connected | SessionState::Faulted => true,
                SessionState::Disconnected => self.torn_down.load(Ordering::SeqCst),
                SessionState::Connecting => false,
            }),
        )
        .await
        .map(|result| result.map(|state| *state));

        match reached {
            Ok(Ok(SessionState::Connected)) => Ok(()),
            Ok(_) => Err(FeedError::SessionClosed),
            Err(_) => Err(FeedError::ConnectionTimeout),
        }
    }

    /// Wait until the receive loop has exited and the transport is released
    pub async fn wait_terminated(&self) {
        let mut rx = self.terminated.subscribe();
        let _ = rx.wait_for(|terminated| *terminated).await;
    }

    /// Copy the best levels of the session's book into `buffer`
    pub fn read_depth(&self, buffer: &mut DepthBuffer) -> (usize, usize) {
        self.book.read_depth(buffer)
    }

    /// Handle to the session's book
    pub fn book(&self) -> SharedOrderBook {
        self.book.clone()
    }

    /// Number of update events processed since the last call
    pub fn read_and_reset_events(&self) -> u64 {
        self.events_processed.swap(0, Ordering::AcqRel)
    }

    async fn run(self: Arc<Self>, addr: SocketAddr) {
        let mut cancel = self.cancel.subscribe();

        let connected = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => None,
            result = FeedClient::connect(addr) => Some(result),
        };

        let outcome = match connected {
            None => Outcome::Requested,
            Some(Err(e)) => Outcome::Fault(e),
            Some(Ok(client)) => {
                if self.transition(SessionState::Connecting, SessionState::Connected) {
                    self.notify(SessionEvent::Connected);
                    self.receive(client, &mut cancel).await
                } else {
                    Outcome::Requested
                }
            }
        };

        self.finish(outcome);
    }

    async fn receive(&self, mut client: FeedClient, cancel: &mut watch::Receiver<bool>) -> Outcome {
        let mut seeded = !self.options.await_snapshot;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel) => return Outcome::Requested,
                next = client.recv() => next,
            };

            match next {
                Ok(Some(message)) => {
                    if let Err(e) = self.dispatch(message, &mut seeded) {
                        return Outcome::Fault(e);
                    }
                }
                Ok(None) => return Outcome::RemoteClosed,
                Err(e) if e.is_recoverable_transport() => return Outcome::TransportError(e),
                Err(e) => return Outcome::Fault(e),
            }
        }
    }

    fn dispatch(&self, message: FeedMessage, seeded: &mut bool) -> Result<()> {
        match message {
            FeedMessage::Update(event) => {
                if !*seeded {
                    trace!(code = event.code, "Dropping update received before first snapshot");
                    return Ok(());
                }
                match self.book.fold(&event) {
                    Ok(()) => trace!(
                        code = event.code,
                        price = %event.price,
                        volume = %event.volume,
                        "Update folded"
                    ),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => warn!(error = %e, "Skipping invalid update event"),
                }
                self.events_processed.fetch_add(1, Ordering::Relaxed);
            }
            FeedMessage::Snapshot(snapshot) => {
                self.book.resync(&snapshot);
                *seeded = true;
                debug!(depth = snapshot.depth(), "Book resynchronized from snapshot");
            }
        }
        Ok(())
    }

    fn finish(&self, outcome: Outcome) {
        self.teardown(outcome);
        self.state.send_if_modified(|state| {
            if matches!(state, SessionState::Connecting | SessionState::Connected) {
                *state = SessionState::Disconnected;
                true
            } else {
                false
            }
        });
        self.terminated.send_replace(true);
        debug!("Feed session terminated");
    }

    /// One-shot teardown. Returns false if the session was already torn down.
    fn teardown(&self, outcome: Outcome) -> bool {
        if self
            .torn_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.cancel.send_replace(true);

        let mut events = Vec::with_capacity(2);
        let state = match outcome {
            Outcome::Requested => {
                info!("Disconnect requested");
                events.push(SessionEvent::Disconnected);
                SessionState::Disconnected
            }
            Outcome::RemoteClosed => {
                info!("Depth server closed the connection");
                events.push(SessionEvent::Disconnected);
                SessionState::Disconnected
            }
            Outcome::TransportError(e) => {
                warn!(error = %e, "Transport error, disconnecting");
                if let Some(kind) = e.transport_kind() {
                    events.push(SessionEvent::TransportError(kind));
                }
                events.push(SessionEvent::Disconnected);
                SessionState::Disconnected
            }
            Outcome::Fault(e) => {
                error!(error = %e, "Feed session faulted");
                events.push(SessionEvent::Exception(Arc::new(e)));
                SessionState::Faulted
            }
        };

        self.state.send_replace(state);

        let subscribers = std::mem::take(&mut *self.subscribers.lock());
        for tx in &subscribers {
            for event in &events {
                let _ = tx.send(event.clone());
            }
        }
        drop(subscribers);

        if !self.started.load(Ordering::SeqCst) {
            self.terminated.send_replace(true);
        }
        true
    }

    fn notify(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from && !self.torn_down.load(Ordering::SeqCst) {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancelled| *cancelled).await;
}
