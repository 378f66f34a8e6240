//! Wire codec for the depth feed
//!
//! Every frame is a big-endian `u32` length prefix followed by a
//! MessagePack-encoded [`FeedMessage`].

use bytes::{Buf, BufMut, BytesMut};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FeedError, Result};
use crate::orderbook::UpdateKind;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload accepted from the feed
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Incremental single-field update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub price: Decimal,
    pub volume: Decimal,
    /// Wire kind code, see [`UpdateKind::from_code`]
    pub code: u8,
}

impl UpdateEvent {
    pub fn new(kind: UpdateKind, price: Decimal, volume: Decimal) -> Self {
        Self {
            price,
            volume,
            code: kind.code(),
        }
    }

    /// Decoded kind, `None` for codes this build does not know
    pub fn kind(&self) -> Option<UpdateKind> {
        UpdateKind::from_code(self.code)
    }
}

/// Full-book snapshot of fixed depth.
///
/// The four arrays are parallel; a slot with a non-positive price or volume
/// is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    pub bid_prices: Vec<Decimal>,
    pub bid_volumes: Vec<Decimal>,
    pub ask_prices: Vec<Decimal>,
    pub ask_volumes: Vec<Decimal>,
}

impl SnapshotMessage {
    /// Snapshot of depth `depth` with every slot empty
    pub fn empty(depth: usize) -> Self {
        Self {
            bid_prices: vec![Decimal::ZERO; depth],
            bid_volumes: vec![Decimal::ZERO; depth],
            ask_prices: vec![Decimal::ZERO; depth],
            ask_volumes: vec![Decimal::ZERO; depth],
        }
    }

    /// Build a snapshot of depth `depth` from best-first levels.
    ///
    /// Levels beyond `depth` are dropped, missing slots stay empty.
    pub fn from_levels(
        depth: usize,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
    ) -> Self {
        let mut snapshot = Self::empty(depth);
        for (i, (price, volume)) in bids.iter().take(depth).enumerate() {
            snapshot.bid_prices[i] = *price;
            snapshot.bid_volumes[i] = *volume;
        }
        for (i, (price, volume)) in asks.iter().take(depth).enumerate() {
            snapshot.ask_prices[i] = *price;
            snapshot.ask_volumes[i] = *volume;
        }
        snapshot
    }

    pub fn depth(&self) -> usize {
        self.bid_prices.len()
    }

    /// Check that all four arrays share the same depth and that the
    /// non-empty levels do not cross
    pub fn validate(&self) -> Result<()> {
        let depth = self.depth();
        if self.bid_volumes.len() != depth
            || self.ask_prices.len() != depth
            || self.ask_volumes.len() != depth
        {
            return Err(FeedError::Protocol(format!(
                "snapshot arrays differ in depth: bids {}/{}, asks {}/{}",
                self.bid_prices.len(),
                self.bid_volumes.len(),
                self.ask_prices.len(),
                self.ask_volumes.len()
            )));
        }

        let best_bid = filled(&self.bid_prices, &self.bid_volumes).max();
        let best_ask = filled(&self.ask_prices, &self.ask_volumes).min();
        if let (Some(bid), Some(ask)) = (best_bid, best_ask) {
            if bid >= ask {
                return Err(FeedError::Protocol(format!(
                    "crossed snapshot: best bid {bid} >= best ask {ask}"
                )));
            }
        }
        Ok(())
    }
}

/// Prices of the non-empty slots of one side
fn filled<'a>(prices: &'a [Decimal], volumes: &'a [Decimal]) -> impl Iterator<Item = Decimal> + 'a {
    prices
        .iter()
        .zip(volumes)
        .filter(|(price, volume)| **price > Decimal::ZERO && **volume > Decimal::ZERO)
        .map(|(price, _)| *price)
}

/// Decoded feed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedMessage {
    Update(UpdateEvent),
    Snapshot(SnapshotMessage),
}

/// Append one length-prefixed frame for `message` to `dst`
pub fn encode_frame(message: &FeedMessage, dst: &mut BytesMut) -> Result<()> {
    let data = rmp_serde::to_vec(message)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(FeedError::FrameTooLarge {
            len: data.len(),
            max: MAX_FRAME_LEN,
        });
    }

    dst.reserve(LENGTH_PREFIX_LEN + data.len());
    dst.put_u32(data.len() as u32);
    dst.extend_from_slice(&data);
    Ok(())
}

/// Decode the next complete frame from `src`.
///
/// Returns `Ok(None)` when more bytes are needed; consumed bytes are removed
/// from `src` only once a whole frame is available.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<FeedMessage>> {
    if src.len() < LENGTH_PREFIX_LEN {
        return Ok(None);
    }

    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
    let len = u32::from_be_bytes(prefix) as usize;

    if len > MAX_FRAME_LEN {
        return Err(FeedError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    if src.len() < LENGTH_PREFIX_LEN + len {
        src.reserve(LENGTH_PREFIX_LEN + len - src.len());
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX_LEN);
    let payload = src.split_to(len);
    let message: FeedMessage = rmp_serde::from_slice(&payload)?;

    if let FeedMessage::Snapshot(snapshot) = &message {
        snapshot.validate()?;
    }

    Ok(Some(message))
}
