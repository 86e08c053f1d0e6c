// src/orderbook.rs
use crate::event::{Event, Side};
use crate::ledger::{Trade, TradeLedger};
use hashbrown::HashMap;
use slab::Slab;
use std::collections::{btree_map, BTreeMap};
use std::iter::Rev;

/// Stable reference to an arena slot. Slots are reused once freed, so every
/// allocation carries a fresh generation and a handle only resolves while the
/// generation still matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    key: usize,
    gen: u64,
}

#[derive(Clone, Debug)]
struct Node {
    order_id: i64,
    price: i64,
    qty: u32,
    side: Side,
    gen: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Node {
    #[inline]
    fn view(&self) -> Order {
        Order { order_id: self.order_id, side: self.side, quantity: self.qty, price: self.price }
    }
}

/// A resting order as seen from outside the book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Order {
    pub order_id: i64,
    pub side: Side,
    pub quantity: u32,
    pub price: i64,
}

#[derive(Clone, Debug, Default)]
pub struct Level {
    head: Option<usize>,
    tail: Option<usize>,
    total_qty: u64,
    count: usize,
}

impl Level {
    #[inline] pub fn total_quantity(&self) -> u64 { self.total_qty }
    #[inline] pub fn order_count(&self) -> usize { self.count }
    #[inline] fn is_empty(&self) -> bool { self.count == 0 }

    /// Walk the queue front (oldest) to back.
    #[cfg(test)]
    fn iter_fifo<'a>(&self, orders: &'a Slab<Node>) -> LevelIter<'a> {
        LevelIter { orders, cur: self.head }
    }
}

#[cfg(test)]
struct LevelIter<'a> {
    orders: &'a Slab<Node>,
    cur: Option<usize>,
}

#[cfg(test)]
impl<'a> Iterator for LevelIter<'a> {
    type Item = &'a Node;
    fn next(&mut self) -> Option<Self::Item> {
        let k = self.cur?;
        let n = &self.orders[k];
        self.cur = n.next;
        Some(n)
    }
}

/// One side of the book. Bids iterate highest price first, asks lowest first.
#[derive(Clone, Debug)]
pub struct Ladder {
    side: Side,
    levels: BTreeMap<i64, Level>,
}

impl Ladder {
    fn new(side: Side) -> Self { Self { side, levels: BTreeMap::new() } }

    #[inline] pub fn len(&self) -> usize { self.levels.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.levels.is_empty() }
    #[cfg(test)]
    pub fn get(&self, price: i64) -> Option<&Level> { self.levels.get(&price) }

    pub fn best(&self) -> Option<(i64, &Level)> {
        let kv = match self.side {
            Side::Buy => self.levels.last_key_value(),
            Side::Sell => self.levels.first_key_value(),
        };
        kv.map(|(p, l)| (*p, l))
    }

    pub fn iter(&self) -> LadderIter<'_> {
        match self.side {
            Side::Buy => LadderIter::Desc(self.levels.iter().rev()),
            Side::Sell => LadderIter::Asc(self.levels.iter()),
        }
    }

    fn level_mut(&mut self, price: i64) -> &mut Level {
        match self.levels.get_mut(&price) {
            Some(l) => l,
            None => panic!("resting {} order at {price} has no price level", self.side.as_str()),
        }
    }
}

pub enum LadderIter<'a> {
    Desc(Rev<btree_map::Iter<'a, i64, Level>>),
    Asc(btree_map::Iter<'a, i64, Level>),
}

impl<'a> Iterator for LadderIter<'a> {
    type Item = (i64, &'a Level);
    fn next(&mut self) -> Option<Self::Item> {
        let kv = match self {
            LadderIter::Desc(it) => it.next(),
            LadderIter::Asc(it) => it.next(),
        };
        kv.map(|(p, l)| (*p, l))
    }
}

#[cfg(test)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub side: Side,
    pub price: i64,
    pub handle: Handle,
}

/// What an event did to the book. None of these are errors: the feed
/// routinely references orders that already left the book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    UnknownOrder,
    DuplicateOrder,
}

pub struct OrderBook {
    bids: Ladder,
    asks: Ladder,
    orders: Slab<Node>,
    index: HashMap<i64, Handle>,
    ledger: TradeLedger,
    next_gen: u64,
    timestamp: f64,
}

impl Default for OrderBook {
    fn default() -> Self { Self::new() }
}

impl OrderBook {
    pub fn new() -> Self { Self::with_capacity(1 << 16) }

    pub fn with_capacity(orders: usize) -> Self {
        Self {
            bids: Ladder::new(Side::Buy),
            asks: Ladder::new(Side::Sell),
            orders: Slab::with_capacity(orders),
            index: HashMap::with_capacity(orders),
            ledger: TradeLedger::default(),
            next_gen: 0,
            timestamp: 0.0,
        }
    }

    #[inline]
    pub fn ladder(&self, side: Side) -> &Ladder {
        match side { Side::Buy => &self.bids, Side::Sell => &self.asks }
    }

    #[inline]
    fn ladder_mut(&mut self, side: Side) -> &mut Ladder {
        match side { Side::Buy => &mut self.bids, Side::Sell => &mut self.asks }
    }

    #[inline] pub fn bids(&self) -> &Ladder { &self.bids }
    #[inline] pub fn asks(&self) -> &Ladder { &self.asks }
    #[inline] pub fn ledger(&self) -> &TradeLedger { &self.ledger }
    #[inline] pub fn order_count(&self) -> usize { self.index.len() }
    #[inline] pub fn best_bid(&self) -> Option<i64> { self.bids.best().map(|(p, _)| p) }
    #[inline] pub fn best_ask(&self) -> Option<i64> { self.asks.best().map(|(p, _)| p) }

    /// Simulated time of the last applied record, in seconds after midnight.
    #[inline] pub fn timestamp(&self) -> f64 { self.timestamp }

    /// Moves the simulated clock forward; earlier timestamps are ignored.
    pub fn advance_clock(&mut self, ts: f64) {
        if ts > self.timestamp { self.timestamp = ts; }
    }

    // ---------- Raw ingestion ----------

    pub fn process_message(&mut self, event_type: i32, order_id: i64, quantity: u32, price: i64, direction: i32) {
        if let Some(ev) = Event::decode(event_type, order_id, quantity, price, direction) {
            let _ = self.apply(&ev);
        }
    }

    pub fn apply(&mut self, ev: &Event) -> Outcome {
        match *ev {
            Event::Add { order_id, qty, price, side } => match self.insert(order_id, side, price, qty) {
                Some(_) => Outcome::Applied,
                None => Outcome::DuplicateOrder,
            },
            Event::Cancel { order_id, qty } => self.reduce(order_id, qty),
            Event::Delete { order_id } => match self.remove(order_id) {
                Some(_) => Outcome::Applied,
                None => Outcome::UnknownOrder,
            },
            Event::Execute { order_id, qty } => self.execute(order_id, qty),
        }
    }

    // ---------- Index + ladder primitives ----------

    /// Queue a new order behind everything already resting at its price.
    /// Returns `None` without touching the book if `order_id` already rests.
    pub fn insert(&mut self, order_id: i64, side: Side, price: i64, qty: u32) -> Option<Handle> {
        if self.index.contains_key(&order_id) {
            return None;
        }
        let gen = self.next_gen;
        self.next_gen += 1;
        let key = self.orders.insert(Node { order_id, price, qty, side, gen, prev: None, next: None });
        let prev_tail = {
            let lvl = self.ladder_mut(side).levels.entry(price).or_default();
            let t = lvl.tail;
            if t.is_none() { lvl.head = Some(key); }
            lvl.tail = Some(key);
            lvl.count += 1;
            lvl.total_qty += u64::from(qty);
            t
        };
        if let Some(t) = prev_tail { self.orders[t].next = Some(key); }
        self.orders[key].prev = prev_tail;
        let h = Handle { key, gen };
        self.index.insert(order_id, h);
        Some(h)
    }

    #[cfg(test)]
    pub fn locate(&self, order_id: i64) -> Option<Location> {
        let h = *self.index.get(&order_id)?;
        let n = self.resolve(h);
        Some(Location { side: n.side, price: n.price, handle: h })
    }

    /// Read through a handle. Stale handles resolve to `None`.
    #[cfg(test)]
    pub fn get(&self, h: Handle) -> Option<Order> {
        self.orders.get(h.key).filter(|n| n.gen == h.gen).map(Node::view)
    }

    /// Zero-based priority of the order within its level. Walks the queue.
    #[cfg(test)]
    pub fn queue_position(&self, order_id: i64) -> Option<usize> {
        let loc = self.locate(order_id)?;
        let lvl = self.ladder(loc.side).get(loc.price)?;
        lvl.iter_fifo(&self.orders).position(|n| n.order_id == order_id)
    }

    /// Orders at one price in time priority.
    #[cfg(test)]
    pub fn level_orders(&self, side: Side, price: i64) -> Vec<Order> {
        self.ladder(side)
            .get(price)
            .map(|l| l.iter_fifo(&self.orders).map(Node::view).collect())
            .unwrap_or_default()
    }

    pub fn remove(&mut self, order_id: i64) -> Option<Order> {
        let h = self.index.remove(&order_id)?;
        Some(self.unlink(h))
    }

    /// Take `qty` off a resting order, deleting it once nothing is left.
    /// A partial reduction keeps the order's place in the queue.
    pub fn reduce(&mut self, order_id: i64, qty: u32) -> Outcome {
        let Some(&h) = self.index.get(&order_id) else { return Outcome::UnknownOrder };
        let node = self.resolve_mut(h);
        if node.qty <= qty {
            self.index.remove(&order_id);
            self.unlink(h);
        } else {
            node.qty -= qty;
            let (side, price) = (node.side, node.price);
            self.ladder_mut(side).level_mut(price).total_qty -= u64::from(qty);
        }
        Outcome::Applied
    }

    /// Record a trade at the resting order's price, then reduce it by `qty`.
    pub fn execute(&mut self, order_id: i64, qty: u32) -> Outcome {
        let Some(&h) = self.index.get(&order_id) else { return Outcome::UnknownOrder };
        let (side, price) = {
            let n = self.resolve(h);
            (n.side, n.price)
        };
        self.ledger.push(Trade::against_resting(side, order_id, price, qty));
        self.reduce(order_id, qty)
    }

    fn unlink(&mut self, h: Handle) -> Order {
        let (side, price, prev, next, qty) = {
            let n = self.resolve(h);
            (n.side, n.price, n.prev, n.next, n.qty)
        };
        if let Some(p) = prev { self.orders[p].next = next; }
        if let Some(nh) = next { self.orders[nh].prev = prev; }
        let ladder = self.ladder_mut(side);
        let emptied = {
            let lvl = ladder.level_mut(price);
            if prev.is_none() { lvl.head = next; }
            if next.is_none() { lvl.tail = prev; }
            lvl.count -= 1;
            lvl.total_qty -= u64::from(qty);
            lvl.is_empty()
        };
        if emptied { ladder.levels.remove(&price); }
        self.orders.remove(h.key).view()
    }

    fn resolve(&self, h: Handle) -> &Node {
        match self.orders.get(h.key) {
            Some(n) if n.gen == h.gen => n,
            _ => panic!("order index holds stale handle {h:?}"),
        }
    }

    fn resolve_mut(&mut self, h: Handle) -> &mut Node {
        match self.orders.get_mut(h.key) {
            Some(n) if n.gen == h.gen => n,
            _ => panic!("order index holds stale handle {h:?}"),
        }
    }

    /// Recompute every level from its queue and cross-check the index.
    pub fn check_invariants(&self) -> anyhow::Result<()> {
        let mut queued = 0usize;
        for ladder in [&self.bids, &self.asks] {
            let side = ladder.side.as_str();
            for (price, lvl) in ladder.levels.iter() {
                if lvl.is_empty() {
                    anyhow::bail!("empty {side} level left at {price}");
                }
                let (mut qty, mut count, mut prev) = (0u64, 0usize, None);
                let mut cur = lvl.head;
                while let Some(k) = cur {
                    let Some(n) = self.orders.get(k) else {
                        anyhow::bail!("{side} level {price} links to free slot {k}");
                    };
                    if n.prev != prev {
                        anyhow::bail!("order {} has a broken back link", n.order_id);
                    }
                    if n.side != ladder.side || n.price != *price {
                        anyhow::bail!("order {} queued at {side} {price} but belongs to {} {}", n.order_id, n.side.as_str(), n.price);
                    }
                    match self.index.get(&n.order_id) {
                        Some(h) if h.key == k && h.gen == n.gen => {}
                        _ => anyhow::bail!("order {} is not indexed at its slot", n.order_id),
                    }
                    qty += u64::from(n.qty);
                    count += 1;
                    if count > self.orders.len() {
                        anyhow::bail!("{side} level {price} queue has a cycle");
                    }
                    prev = cur;
                    cur = n.next;
                }
                if lvl.tail != prev {
                    anyhow::bail!("{side} level {price} tail does not match its queue");
                }
                if qty != lvl.total_qty || count != lvl.count {
                    anyhow::bail!(
                        "{side} level {price} caches total={} count={} but queue holds total={qty} count={count}",
                        lvl.total_qty, lvl.count
                    );
                }
                queued += count;
            }
        }
        if queued != self.index.len() || queued != self.orders.len() {
            anyhow::bail!("{queued} queued orders, {} indexed, {} allocated", self.index.len(), self.orders.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BUY: i32 = 1;
    const SELL: i32 = -1;

    fn levels(b: &OrderBook, side: Side) -> Vec<(i64, u64, usize)> {
        b.ladder(side).iter().map(|(p, l)| (p, l.total_quantity(), l.order_count())).collect()
    }

    fn ids(b: &OrderBook, side: Side, price: i64) -> Vec<i64> {
        b.level_orders(side, price).iter().map(|o| o.order_id).collect()
    }

    #[test]
    fn fifo_within_level_and_totals() {
        let mut b = OrderBook::new();
        b.insert(1, Side::Buy, 100, 10);
        b.insert(2, Side::Buy, 100, 20);
        assert_eq!(ids(&b, Side::Buy, 100), vec![1, 2]);
        assert_eq!(levels(&b, Side::Buy), vec![(100, 30, 2)]);

        assert_eq!(b.reduce(1, 5), Outcome::Applied);
        assert_eq!(levels(&b, Side::Buy), vec![(100, 25, 2)]);
        assert_eq!(b.queue_position(1), Some(0));

        b.remove(2);
        assert_eq!(levels(&b, Side::Buy), vec![(100, 5, 1)]);
        b.check_invariants().unwrap();
    }

    #[test]
    fn remove_empty_levels() {
        let mut b = OrderBook::new();
        b.insert(1, Side::Sell, 101, 10);
        b.remove(1);
        assert!(b.asks().get(101).is_none());
        assert!(b.asks().is_empty());
        assert_eq!(b.order_count(), 0);
    }

    #[test]
    fn ladders_iterate_best_first() {
        let mut b = OrderBook::new();
        for (id, px) in [(1, 99), (2, 101), (3, 100)] { b.insert(id, Side::Buy, px, 1); }
        for (id, px) in [(4, 105), (5, 103), (6, 104)] { b.insert(id, Side::Sell, px, 1); }
        let bid_px: Vec<i64> = b.bids().iter().map(|(p, _)| p).collect();
        let ask_px: Vec<i64> = b.asks().iter().map(|(p, _)| p).collect();
        assert_eq!(bid_px, vec![101, 100, 99]);
        assert_eq!(ask_px, vec![103, 104, 105]);
        assert_eq!(b.best_bid(), Some(101));
        assert_eq!(b.best_ask(), Some(103));
    }

    #[test]
    fn removing_from_middle_keeps_relative_order() {
        let mut b = OrderBook::new();
        for id in 1..=4 { b.insert(id, Side::Sell, 200, 10); }
        b.process_message(3, 2, 0, 200, SELL);
        assert_eq!(ids(&b, Side::Sell, 200), vec![1, 3, 4]);
        assert_eq!(b.queue_position(4), Some(2));
        b.process_message(3, 1, 0, 200, SELL);
        b.process_message(3, 4, 0, 200, SELL);
        assert_eq!(ids(&b, Side::Sell, 200), vec![3]);
        b.check_invariants().unwrap();
    }

    #[test]
    fn add_then_cancel_same_qty_restores_state() {
        let mut b = OrderBook::new();
        b.process_message(1, 1, 40, 15000, BUY);
        b.process_message(1, 2, 60, 15100, SELL);
        let bids = levels(&b, Side::Buy);
        let asks = levels(&b, Side::Sell);
        let resting = b.order_count();

        b.process_message(1, 3, 25, 15000, BUY);
        b.process_message(2, 3, 25, 15000, BUY);

        assert_eq!(levels(&b, Side::Buy), bids);
        assert_eq!(levels(&b, Side::Sell), asks);
        assert_eq!(b.order_count(), resting);
        assert!(b.locate(3).is_none());
        b.check_invariants().unwrap();
    }

    #[test]
    fn unknown_ids_are_noops() {
        let mut b = OrderBook::new();
        b.process_message(1, 1, 10, 100, BUY);
        let before = levels(&b, Side::Buy);
        assert_eq!(b.apply(&Event::Cancel { order_id: 9, qty: 1 }), Outcome::UnknownOrder);
        assert_eq!(b.apply(&Event::Delete { order_id: 9 }), Outcome::UnknownOrder);
        assert_eq!(b.apply(&Event::Execute { order_id: 9, qty: 1 }), Outcome::UnknownOrder);
        assert_eq!(levels(&b, Side::Buy), before);
        assert!(b.ledger().is_empty());
        b.check_invariants().unwrap();
    }

    #[test]
    fn unsupported_event_codes_are_noops() {
        let mut b = OrderBook::new();
        b.process_message(1, 1, 10, 100, BUY);
        b.process_message(5, 1, 10, 100, BUY);
        b.process_message(7, 1, 10, 100, BUY);
        assert_eq!(levels(&b, Side::Buy), vec![(100, 10, 1)]);
        assert!(b.ledger().is_empty());
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let mut b = OrderBook::new();
        b.process_message(1, 1, 10, 100, BUY);
        let dup = Event::Add { order_id: 1, qty: 99, price: 105, side: Side::Sell };
        assert_eq!(b.apply(&dup), Outcome::DuplicateOrder);
        assert_eq!(b.order_count(), 1);
        assert!(b.asks().is_empty());
        let loc = b.locate(1).unwrap();
        assert_eq!((loc.side, loc.price), (Side::Buy, 100));
        assert_eq!(b.get(loc.handle).unwrap().quantity, 10);
        b.check_invariants().unwrap();
    }

    #[test]
    fn stale_handle_is_rejected_after_slot_reuse() {
        let mut b = OrderBook::new();
        let old = b.insert(1, Side::Buy, 100, 10).unwrap();
        b.remove(1);
        let new = b.insert(2, Side::Buy, 100, 5).unwrap();
        assert_eq!(old.key, new.key);
        assert_eq!(b.get(old), None);
        assert_eq!(b.get(new).map(|o| o.order_id), Some(2));
    }

    #[test]
    fn full_execute_leaves_contra_order_resting() {
        let mut b = OrderBook::new();
        b.process_message(1, 101, 50, 15000, SELL);
        b.process_message(1, 102, 50, 15000, BUY);
        b.process_message(4, 101, 50, 15000, SELL);

        assert_eq!(b.ledger().len(), 1);
        let t = *b.ledger().iter().next().unwrap();
        assert_eq!(
            t,
            Trade { price: 15000, quantity: 50, buy_order_id: None, sell_order_id: Some(101) }
        );
        assert!(b.asks().is_empty());
        assert!(b.locate(101).is_none());
        // The buy side's fill is not in this feed; its own delete clears it.
        assert_eq!(ids(&b, Side::Buy, 15000), vec![102]);
        b.process_message(3, 102, 0, 15000, BUY);
        assert!(b.bids().is_empty());
        assert_eq!(b.order_count(), 0);
        assert_eq!(b.ledger().len(), 1);
        b.check_invariants().unwrap();
    }

    #[test]
    fn partial_cancel_keeps_queue_position() {
        let mut b = OrderBook::new();
        b.process_message(1, 1, 50, 15000, SELL);
        b.process_message(1, 2, 10, 15000, SELL);
        b.process_message(2, 1, 20, 15000, SELL);
        let loc = b.locate(1).unwrap();
        assert_eq!(b.get(loc.handle).unwrap().quantity, 30);
        assert_eq!(b.queue_position(1), Some(0));
        assert_eq!(levels(&b, Side::Sell), vec![(15000, 40, 2)]);
    }

    #[test]
    fn partial_execute_reduces_and_over_execute_removes() {
        let mut b = OrderBook::new();
        b.process_message(1, 1, 50, 15000, BUY);
        b.process_message(4, 1, 20, 15000, BUY);
        assert_eq!(levels(&b, Side::Buy), vec![(15000, 30, 1)]);
        b.process_message(4, 1, 45, 15000, BUY);
        assert!(b.bids().is_empty());
        let qtys: Vec<u32> = b.ledger().iter().map(|t| t.quantity).collect();
        assert_eq!(qtys, vec![20, 45]);
        assert!(b.ledger().iter().all(|t| t.buy_order_id == Some(1) && t.sell_order_id.is_none()));
    }

    #[test]
    fn ledger_keeps_most_recent_twenty() {
        let mut b = OrderBook::new();
        for id in 1..=25 {
            b.process_message(1, id, 10, 20000 + id, SELL);
            b.process_message(4, id, 10, 20000 + id, SELL);
        }
        assert_eq!(b.ledger().len(), 20);
        let ids: Vec<i64> = b.ledger().iter().filter_map(|t| t.sell_order_id).collect();
        assert_eq!(ids, (6..=25).collect::<Vec<_>>());
        assert_eq!(b.order_count(), 0);
    }

    #[test]
    fn clock_never_moves_backwards() {
        let mut b = OrderBook::new();
        b.advance_clock(34200.5);
        b.advance_clock(34200.1);
        assert_eq!(b.timestamp(), 34200.5);
    }

    type Model = BTreeMap<(bool, i64), Vec<(i64, u32)>>;

    // Direct list-based restatement of the event semantics.
    fn model_apply(m: &mut Model, owner: &mut HashMap<i64, (bool, i64)>, code: i32, id: i64, qty: u32, px: i64, dir: i32) {
        let reduce = |m: &mut Model, owner: &mut HashMap<i64, (bool, i64)>, id: i64, qty: u32| {
            if let Some(&key) = owner.get(&id) {
                let q = m.get_mut(&key).unwrap();
                let pos = q.iter().position(|(o, _)| *o == id).unwrap();
                if q[pos].1 <= qty {
                    q.remove(pos);
                    owner.remove(&id);
                    if q.is_empty() { m.remove(&key); }
                } else {
                    q[pos].1 -= qty;
                }
            }
        };
        match code {
            1 if !owner.contains_key(&id) => {
                let key = (dir == 1, px);
                m.entry(key).or_default().push((id, qty));
                owner.insert(id, key);
            }
            2 | 4 => reduce(m, owner, id, qty),
            3 => reduce(m, owner, id, u32::MAX),
            _ => {}
        }
    }

    proptest! {
        #[test]
        fn random_feeds_match_list_model(
            ops in proptest::collection::vec((0i32..6, 1i64..24, 1u32..80, 98i64..104, 0i32..2), 0..400)
        ) {
            let mut b = OrderBook::with_capacity(64);
            let mut m = Model::new();
            let mut owner = HashMap::new();
            for (code, id, qty, px, dir) in ops {
                b.process_message(code, id, qty, px, dir);
                model_apply(&mut m, &mut owner, code, id, qty, px, dir);
                prop_assert!(b.check_invariants().is_ok(), "{:?}", b.check_invariants());
            }
            prop_assert_eq!(b.order_count(), owner.len());
            for ((is_buy, px), q) in &m {
                let side = if *is_buy { Side::Buy } else { Side::Sell };
                let got: Vec<(i64, u32)> = b.level_orders(side, *px).iter().map(|o| (o.order_id, o.quantity)).collect();
                prop_assert_eq!(&got, q);
            }
            prop_assert_eq!(b.bids().len() + b.asks().len(), m.len());
        }
    }
}
