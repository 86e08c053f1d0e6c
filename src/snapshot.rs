// src/snapshot.rs
use crate::ledger::Trade;
use crate::orderbook::{Level, OrderBook};
use crate::util::{format_clock, ticks_to_display, PRICE_SCALE};
use smallvec::SmallVec;
use std::fmt;

pub const RECENT_TRADES: usize = 5;
/// Inline capacity per side; deeper snapshots spill to the heap.
pub const INLINE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelView {
    pub price: i64,
    pub total_quantity: u64,
    pub order_count: usize,
}

impl LevelView {
    #[inline]
    pub fn display_price(&self) -> f64 { ticks_to_display(self.price) }
}

pub type Levels = SmallVec<[LevelView; INLINE_DEPTH]>;

/// Owned, depth-limited copy of the book. Holds nothing that points back
/// into the producer's state.
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    /// Best (highest) bid first.
    pub bids: Levels,
    /// Best (lowest) ask first.
    pub asks: Levels,
    /// Newest first.
    pub recent_trades: SmallVec<[Trade; RECENT_TRADES]>,
    /// `None` while either side of the book is empty.
    pub mid_price: Option<f64>,
    /// `None` while either side of the book is empty.
    pub spread: Option<f64>,
    pub timestamp: f64,
    pub clock: String,
    pub live_orders: usize,
}

impl BookSnapshot {
    #[inline] pub fn best_bid(&self) -> Option<&LevelView> { self.bids.first() }
    #[inline] pub fn best_ask(&self) -> Option<&LevelView> { self.asks.first() }
    #[inline] pub fn last_trade(&self) -> Option<&Trade> { self.recent_trades.first() }
}

fn top_levels<'a>(levels: impl Iterator<Item = (i64, &'a Level)>, depth: usize) -> Levels {
    levels
        .take(depth)
        .map(|(price, l)| LevelView { price, total_quantity: l.total_quantity(), order_count: l.order_count() })
        .collect()
}

impl OrderBook {
    /// Pure read of the current book; O(depth).
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let (mid_price, spread) = match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => (
                Some((bid as f64 + ask as f64) / 2.0 / PRICE_SCALE),
                Some(ticks_to_display(ask - bid)),
            ),
            _ => (None, None),
        };
        BookSnapshot {
            bids: top_levels(self.bids().iter(), depth),
            asks: top_levels(self.asks().iter(), depth),
            recent_trades: self.ledger().recent(RECENT_TRADES).copied().collect(),
            mid_price,
            spread,
            timestamp: self.timestamp(),
            clock: format_clock(self.timestamp()),
            live_orders: self.order_count(),
        }
    }
}

fn fmt_level(f: &mut fmt::Formatter<'_>, label: &str, lvl: Option<&LevelView>) -> fmt::Result {
    match lvl {
        Some(l) => write!(f, "{label} {:.4} x {} ({})", l.display_price(), l.total_quantity, l.order_count),
        None => write!(f, "{label} -"),
    }
}

impl fmt::Display for BookSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.clock)?;
        fmt_level(f, "bid", self.best_bid())?;
        f.write_str(" | ")?;
        fmt_level(f, "ask", self.best_ask())?;
        match (self.mid_price, self.spread) {
            (Some(mid), Some(spread)) => write!(f, " | mid {mid:.4} spread {spread:.4}")?,
            _ => f.write_str(" | mid n/a spread n/a")?,
        }
        write!(f, " | depth {}/{}", self.bids.len(), self.asks.len())?;
        if let Some(t) = self.last_trade() {
            write!(f, " | last {} @ {:.4}", t.quantity, ticks_to_display(t.price))?;
        }
        write!(f, " | orders {}", self.live_orders)
    }
}
