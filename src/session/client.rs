//! TCP client for the depth feed
//!
//! Owns the socket and its read buffer and yields decoded feed messages.

use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::codec::{decode_frame, FeedMessage};
use crate::error::{FeedError, Result};

const READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// Connection to a single depth server
#[derive(Debug)]
pub struct FeedClient<S = TcpStream> {
    stream: S,
    buffer: BytesMut,
    peer: SocketAddr,
}

impl FeedClient<TcpStream> {
    /// Connect to the depth server at `addr`
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        info!(address = %addr, "Connecting to depth server");

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| FeedError::Connect {
                address: addr.to_string(),
                message: e.to_string(),
            })?;
        stream.set_nodelay(true)?;

        info!(address = %addr, "Connected to depth server");
        Ok(Self::from_stream(stream, addr))
    }
}

impl<S: AsyncRead + Unpin> FeedClient<S> {
    /// Wrap an already established byte stream
    pub fn from_stream(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            peer,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` when the server closed the connection on a frame
    /// boundary. Cancel safe: a partially received frame stays buffered.
    pub async fn recv(&mut self) -> Result<Option<FeedMessage>> {
        loop {
            if let Some(message) = decode_frame(&mut self.buffer)? {
                return Ok(Some(message));
            }

            let read = self.stream.read_buf(&mut self.buffer).await?;
            if read == 0 {
                if self.buffer.is_empty() {
                    debug!(address = %self.peer, "Depth server closed the connection");
                    return Ok(None);
                }
                return Err(FeedError::Transport {
                    kind: std::io::ErrorKind::UnexpectedEof,
                    message: format!(
                        "connection closed with {} bytes of a partial frame buffered",
                        self.buffer.len()
                    ),
                });
            }
        }
    }
}
