//! Folding incremental update events into the book.
//!
//! Each event carries a wire kind code. Explicit-side kinds name the side they
//! touch; the legacy implicit kinds only carry a price, and their side is
//! inferred from the current best bid and best ask.

use rust_decimal::Decimal;
use tracing::debug;

use super::{OrderBook, Side};
use crate::codec::UpdateEvent;
use crate::error::FoldError;

/// What happened to the order that caused an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Added,
    Executed,
    Canceled,
}

/// Semantic kind of an update event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// A price-defining event on an explicit side; volume must be non-zero
    Price { side: Side, action: Action },
    /// Volume-only change on an explicit side; zero volume removes the level
    Volume { side: Side, action: Action },
    /// Aggregate volume seeded without an order action, folded like an add
    VolumeInfo { side: Side },
    /// Volume-only change whose side is inferred from the best prices
    ImplicitVolume { action: Action },
}

const ACTIONS: [Action; 3] = [Action::Added, Action::Executed, Action::Canceled];

impl UpdateKind {
    /// Decode a wire kind code
    pub fn from_code(code: u8) -> Option<Self> {
        let action = |base: u8| ACTIONS[usize::from(code - base)];
        let kind = match code {
            1..=3 => UpdateKind::Price {
                side: Side::Bid,
                action: action(1),
            },
            4..=6 => UpdateKind::Price {
                side: Side::Ask,
                action: action(4),
            },
            7..=9 => UpdateKind::Volume {
                side: Side::Bid,
                action: action(7),
            },
            10..=12 => UpdateKind::Volume {
                side: Side::Ask,
                action: action(10),
            },
            // Buying/selling volume codes alias the bid/ask volume kinds
            13 => UpdateKind::Volume {
                side: Side::Bid,
                action: Action::Added,
            },
            14 => UpdateKind::Volume {
                side: Side::Bid,
                action: Action::Canceled,
            },
            15 => UpdateKind::Volume {
                side: Side::Ask,
                action: Action::Added,
            },
            16 => UpdateKind::Volume {
                side: Side::Ask,
                action: Action::Canceled,
            },
            17 => UpdateKind::VolumeInfo { side: Side::Bid },
            18 => UpdateKind::VolumeInfo { side: Side::Ask },
            19..=21 => UpdateKind::ImplicitVolume { action: action(19) },
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical wire code for this kind
    pub fn code(self) -> u8 {
        let offset = |action: Action| match action {
            Action::Added => 0,
            Action::Executed => 1,
            Action::Canceled => 2,
        };
        match self {
            UpdateKind::Price { side: Side::Bid, action } => 1 + offset(action),
            UpdateKind::Price { side: Side::Ask, action } => 4 + offset(action),
            UpdateKind::Volume { side: Side::Bid, action } => 7 + offset(action),
            UpdateKind::Volume { side: Side::Ask, action } => 10 + offset(action),
            UpdateKind::VolumeInfo { side: Side::Bid } => 17,
            UpdateKind::VolumeInfo { side: Side::Ask } => 18,
            UpdateKind::ImplicitVolume { action } => 19 + offset(action),
        }
    }
}

/// Infer the side of an implicit-side update from the current best prices.
///
/// Returns `None` while both sides are empty.
pub fn resolve_side(
    best_bid: Option<Decimal>,
    best_ask: Option<Decimal>,
    price: Decimal,
) -> Option<Side> {
    match (best_bid, best_ask) {
        (Some(bid), _) if price <= bid => Some(Side::Bid),
        (Some(_), _) => Some(Side::Ask),
        (None, Some(ask)) if price >= ask => Some(Side::Ask),
        (None, Some(_)) => Some(Side::Bid),
        (None, None) => None,
    }
}

/// Apply a single update event to the book
pub fn fold(book: &mut OrderBook, event: &UpdateEvent) -> Result<(), FoldError> {
    let kind = event.kind().ok_or(FoldError::UnsupportedUpdateKind(event.code))?;

    let invalid = |reason: &'static str| FoldError::InvalidEvent {
        price: event.price,
        volume: event.volume,
        reason,
    };

    if event.price <= Decimal::ZERO {
        return Err(invalid("non-positive price"));
    }
    if event.volume < Decimal::ZERO {
        return Err(invalid("negative volume"));
    }

    match kind {
        UpdateKind::Price { side, .. } | UpdateKind::VolumeInfo { side } => {
            if event.volume.is_zero() {
                return Err(invalid("zero volume on a price-defining event"));
            }
            set_price_level(book, side, event.price, event.volume);
        }
        UpdateKind::Volume { side, .. } => {
            set_volume(book, side, event.price, event.volume);
        }
        UpdateKind::ImplicitVolume { .. } => {
            let side = resolve_side(book.best_bid(), book.best_ask(), event.price)
                .ok_or_else(|| invalid("side cannot be inferred from an empty book"))?;
            set_volume(book, side, event.price, event.volume);
        }
    }

    Ok(())
}

/// Upsert a level and drop the opposite-side levels it supersedes
fn set_price_level(book: &mut OrderBook, side: Side, price: Decimal, volume: Decimal) {
    book.upsert(side, price, volume);
    let removed = book.clear_crossed(side, price);
    if removed > 0 {
        debug!(?side, %price, removed, "Cleared crossed levels");
    }
}

fn set_volume(book: &mut OrderBook, side: Side, price: Decimal, volume: Decimal) {
    if volume.is_zero() {
        book.remove(side, price);
    } else {
        set_price_level(book, side, price, volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn event(kind: UpdateKind, price: Decimal, volume: Decimal) -> UpdateEvent {
        UpdateEvent::new(kind, price, volume)
    }

    fn bid_add() -> UpdateKind {
        UpdateKind::Price {
            side: Side::Bid,
            action: Action::Added,
        }
    }

    fn bid_volume() -> UpdateKind {
        UpdateKind::Volume {
            side: Side::Bid,
            action: Action::Canceled,
        }
    }

    #[test]
    fn test_codes_round_trip_for_canonical_kinds() {
        for code in (1..=12).chain(17..=21) {
            let kind = UpdateKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
    }

    #[test]
    fn test_alias_codes() {
        assert_eq!(
            UpdateKind::from_code(13),
            Some(UpdateKind::Volume {
                side: Side::Bid,
                action: Action::Added
            })
        );
        assert_eq!(
            UpdateKind::from_code(16),
            Some(UpdateKind::Volume {
                side: Side::Ask,
                action: Action::Canceled
            })
        );
        assert_eq!(UpdateKind::from_code(0), None);
        assert_eq!(UpdateKind::from_code(22), None);
    }

    #[test]
    fn test_bid_add_on_empty_book() {
        let mut book = OrderBook::new();
        fold(&mut book, &event(bid_add(), dec!(100), dec!(5))).unwrap();

        assert_eq!(book.volume_at(Side::Bid, dec!(100)), Some(dec!(5)));
        assert_eq!(book.level_count(Side::Ask), 0);
    }

    #[test]
    fn test_price_event_replaces_not_accumulates() {
        let mut book = OrderBook::new();
        fold(&mut book, &event(bid_add(), dec!(100), dec!(5))).unwrap();
        fold(&mut book, &event(bid_add(), dec!(100), dec!(2))).unwrap();

        assert_eq!(book.volume_at(Side::Bid, dec!(100)), Some(dec!(2)));
    }

    #[test]
    fn test_zero_volume_price_event_is_invalid() {
        let mut book = OrderBook::new();
        let err = fold(&mut book, &event(bid_add(), dec!(100), dec!(0))).unwrap_err();

        assert!(matches!(err, FoldError::InvalidEvent { .. }));
        assert!(book.is_empty());
    }

    #[test]
    fn test_volume_change_to_zero_removes() {
        let mut book = OrderBook::new();
        fold(&mut book, &event(bid_add(), dec!(100), dec!(5))).unwrap();
        fold(&mut book, &event(bid_volume(), dec!(100), dec!(0))).unwrap();

        assert_eq!(book.level_count(Side::Bid), 0);
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn test_volume_change_to_zero_on_absent_price_is_noop() {
        let mut book = OrderBook::new();
        fold(&mut book, &event(bid_add(), dec!(100), dec!(5))).unwrap();
        fold(&mut book, &event(bid_volume(), dec!(98), dec!(0))).unwrap();

        assert_eq!(book.level_count(Side::Bid), 1);
        assert_eq!(book.volume_at(Side::Bid, dec!(100)), Some(dec!(5)));
    }

    #[test]
    fn test_volume_info_acts_like_add() {
        let mut book = OrderBook::new();
        let info = UpdateKind::VolumeInfo { side: Side::Ask };
        fold(&mut book, &event(info, dec!(101), dec!(4))).unwrap();
        assert_eq!(book.volume_at(Side::Ask, dec!(101)), Some(dec!(4)));

        assert!(fold(&mut book, &event(info, dec!(101), dec!(0))).is_err());
    }

    #[test]
    fn test_unsupported_code() {
        let mut book = OrderBook::new();
        let raw = UpdateEvent {
            price: dec!(100),
            volume: dec!(1),
            code: 200,
        };
        assert_eq!(
            fold(&mut book, &raw),
            Err(FoldError::UnsupportedUpdateKind(200))
        );
    }

    #[test]
    fn test_price_event_clears_crossed_levels() {
        let mut book = OrderBook::new();
        let ask_add = UpdateKind::Price {
            side: Side::Ask,
            action: Action::Added,
        };
        fold(&mut book, &event(ask_add, dec!(101), dec!(1))).unwrap();
        fold(&mut book, &event(ask_add, dec!(102), dec!(1))).unwrap();
        fold(&mut book, &event(bid_add(), dec!(101), dec!(3))).unwrap();

        assert_eq!(book.best_bid(), Some(dec!(101)));
        assert_eq!(book.best_ask(), Some(dec!(102)));
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_resolve_side() {
        let bid = Some(dec!(100));
        let ask = Some(dec!(102));

        assert_eq!(resolve_side(bid, ask, dec!(99)), Some(Side::Bid));
        assert_eq!(resolve_side(bid, ask, dec!(100)), Some(Side::Bid));
        assert_eq!(resolve_side(bid, ask, dec!(101)), Some(Side::Ask));
        assert_eq!(resolve_side(bid, ask, dec!(103)), Some(Side::Ask));
        assert_eq!(resolve_side(bid, None, dec!(101)), Some(Side::Ask));
        assert_eq!(resolve_side(None, ask, dec!(101)), Some(Side::Bid));
        assert_eq!(resolve_side(None, ask, dec!(102)), Some(Side::Ask));
        assert_eq!(resolve_side(None, None, dec!(101)), None);
    }

    #[test]
    fn test_implicit_volume_on_empty_book_is_invalid() {
        let mut book = OrderBook::new();
        let implicit = UpdateKind::ImplicitVolume {
            action: Action::Added,
        };
        let err = fold(&mut book, &event(implicit, dec!(100), dec!(1))).unwrap_err();
        assert!(matches!(err, FoldError::InvalidEvent { .. }));
    }

    #[test]
    fn test_implicit_volume_uses_best_prices() {
        let mut book = OrderBook::new();
        book.upsert(Side::Bid, dec!(100), dec!(5));
        book.upsert(Side::Ask, dec!(102), dec!(5));
        let implicit = UpdateKind::ImplicitVolume {
            action: Action::Executed,
        };

        fold(&mut book, &event(implicit, dec!(99), dec!(2))).unwrap();
        fold(&mut book, &event(implicit, dec!(103), dec!(6))).unwrap();
        fold(&mut book, &event(implicit, dec!(100), dec!(0))).unwrap();

        assert_eq!(book.volume_at(Side::Bid, dec!(99)), Some(dec!(2)));
        assert_eq!(book.volume_at(Side::Ask, dec!(103)), Some(dec!(6)));
        assert_eq!(book.best_bid(), Some(dec!(99)));
    }

    #[test]
    fn test_non_positive_price_is_invalid() {
        let mut book = OrderBook::new();
        assert!(fold(&mut book, &event(bid_volume(), dec!(0), dec!(1))).is_err());
        assert!(fold(&mut book, &event(bid_volume(), dec!(10), dec!(-1))).is_err());
        assert!(book.is_empty());
    }
}
