// src/ledger.rs
use crate::event::Side;
use std::collections::VecDeque;

pub const LEDGER_CAPACITY: usize = 20;

/// An execution reported by the feed. Only the resting order's id is known;
/// the other side stays `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trade {
    pub price: i64,
    pub quantity: u32,
    pub buy_order_id: Option<i64>,
    pub sell_order_id: Option<i64>,
}

impl Trade {
    pub fn against_resting(side: Side, order_id: i64, price: i64, quantity: u32) -> Self {
        let (buy_order_id, sell_order_id) = match side {
            Side::Buy => (Some(order_id), None),
            Side::Sell => (None, Some(order_id)),
        };
        Self { price, quantity, buy_order_id, sell_order_id }
    }
}

#[derive(Debug, Clone)]
pub struct TradeLedger {
    buf: VecDeque<Trade>,
    cap: usize,
    total: u64,
}

impl Default for TradeLedger {
    fn default() -> Self { Self::with_capacity(LEDGER_CAPACITY) }
}

impl TradeLedger {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self { buf: VecDeque::with_capacity(cap), cap, total: 0 }
    }

    pub fn push(&mut self, trade: Trade) {
        if self.buf.len() == self.cap { self.buf.pop_front(); }
        self.buf.push_back(trade);
        self.total += 1;
    }

    #[inline] pub fn len(&self) -> usize { self.buf.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    /// Trades ever recorded, including evicted ones.
    #[inline] pub fn total_recorded(&self) -> u64 { self.total }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Trade> + '_ { self.buf.iter() }

    /// Up to `n` trades, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Trade> + '_ {
        self.buf.iter().rev().take(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(i: i64) -> Trade { Trade::against_resting(Side::Sell, i, 10_000 + i, 1) }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut l = TradeLedger::default();
        for i in 1..=25 { l.push(trade(i)); }
        assert_eq!(l.len(), LEDGER_CAPACITY);
        assert_eq!(l.total_recorded(), 25);
        let ids: Vec<i64> = l.iter().filter_map(|t| t.sell_order_id).collect();
        assert_eq!(ids, (6..=25).collect::<Vec<_>>());
    }

    #[test]
    fn recent_is_newest_first_and_bounded() {
        let mut l = TradeLedger::default();
        for i in 1..=3 { l.push(trade(i)); }
        let ids: Vec<i64> = l.recent(5).filter_map(|t| t.sell_order_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(l.recent(2).count(), 2);
    }

    #[test]
    fn one_sided_attribution() {
        let b = Trade::against_resting(Side::Buy, 9, 100, 4);
        assert_eq!((b.buy_order_id, b.sell_order_id), (Some(9), None));
        let s = Trade::against_resting(Side::Sell, 9, 100, 4);
        assert_eq!((s.buy_order_id, s.sell_order_id), (None, Some(9)));
    }
}
