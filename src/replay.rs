// src/replay.rs
use crate::event::Record;
use crate::mailbox::Publisher;
use crate::metrics;
use crate::orderbook::{OrderBook, Outcome};
use log::{info, warn};
use std::thread;
use std::time::Duration;

/// Longest single wait between two records. Larger gaps are clamped.
pub const MAX_PAUSE: Duration = Duration::from_secs(60);

/// Where the replay waits between records. Production sleeps on the wall
/// clock; tests record the requested pauses instead.
pub trait Pacer {
    fn pause(&mut self, d: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl Pacer for WallClock {
    #[inline]
    fn pause(&mut self, d: Duration) { thread::sleep(d); }
}

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Simulated seconds per wall-clock second. 0 disables pacing.
    pub speed: f64,
    /// Publish after every this many records.
    pub snapshot_every: u64,
    pub depth: usize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplayStats {
    pub records: u64,
    pub applied: u64,
    pub unknown_order: u64,
    pub duplicate_order: u64,
    pub unsupported: u64,
    pub snapshots: u64,
    pub paused: Duration,
}

pub struct Replayer<P = WallClock> {
    cfg: ReplayConfig,
    pacer: P,
    book: OrderBook,
    prev_ts: Option<f64>,
    stats: ReplayStats,
}

impl Replayer<WallClock> {
    pub fn new(cfg: ReplayConfig) -> Self { Self::with_pacer(cfg, WallClock) }
}

impl<P: Pacer> Replayer<P> {
    pub fn with_pacer(cfg: ReplayConfig, pacer: P) -> Self {
        let cfg = ReplayConfig { snapshot_every: cfg.snapshot_every.max(1), ..cfg };
        Self { cfg, pacer, book: OrderBook::new(), prev_ts: None, stats: ReplayStats::default() }
    }

    #[cfg(test)]
    pub fn book(&self) -> &OrderBook { &self.book }
    #[cfg(test)]
    pub fn stats(&self) -> &ReplayStats { &self.stats }

    /// Apply one record, pausing first if pacing is on.
    pub fn step(&mut self, rec: &Record) {
        if let Some(prev) = self.prev_ts {
            let delta = rec.timestamp - prev;
            if self.cfg.speed > 0.0 && delta > 0.0 {
                let d = pause_for(delta, self.cfg.speed);
                self.pacer.pause(d);
                self.stats.paused += d;
                metrics::observe_pause_secs(d.as_secs_f64());
            }
        }
        self.prev_ts = Some(rec.timestamp);

        match rec.event() {
            Some(ev) => {
                let trades_before = self.book.ledger().total_recorded();
                match self.book.apply(&ev) {
                    Outcome::Applied => {
                        self.stats.applied += 1;
                        metrics::inc_applied(ev.kind());
                    }
                    Outcome::UnknownOrder => {
                        self.stats.unknown_order += 1;
                        metrics::inc_ignored("unknown_order");
                    }
                    Outcome::DuplicateOrder => {
                        self.stats.duplicate_order += 1;
                        metrics::inc_ignored("duplicate_order");
                        warn!("add for resting order {} ignored at {:.6}", ev.order_id(), rec.timestamp);
                    }
                }
                if self.book.ledger().total_recorded() > trades_before {
                    metrics::inc_trades();
                }
            }
            None => {
                self.stats.unsupported += 1;
                metrics::inc_ignored("unsupported_event");
            }
        }
        self.book.advance_clock(rec.timestamp);
        self.stats.records += 1;
    }

    #[inline]
    fn snapshot_due(&self) -> bool { self.stats.records % self.cfg.snapshot_every == 0 }

    fn publish(&mut self, publisher: &Publisher) {
        let snap = self.book.snapshot(self.cfg.depth);
        metrics::set_book_gauges(self.book.order_count(), self.book.bids().len(), self.book.asks().len());
        publisher.publish(snap);
        self.stats.snapshots += 1;
        metrics::inc_snapshots_published();
    }

    /// Drive the whole feed, publishing every `snapshot_every` records and
    /// once more at the end.
    pub fn run<I>(mut self, feed: I, publisher: Publisher) -> ReplayStats
    where
        I: IntoIterator<Item = Record>,
    {
        info!(
            "replay starting: speed={} snapshot_every={} depth={}",
            self.cfg.speed, self.cfg.snapshot_every, self.cfg.depth
        );
        for rec in feed {
            self.step(&rec);
            if self.snapshot_due() {
                self.publish(&publisher);
            }
        }
        let last = self.book.snapshot(self.cfg.depth);
        metrics::set_book_gauges(self.book.order_count(), self.book.bids().len(), self.book.asks().len());
        publisher.finish(last);
        self.stats.snapshots += 1;
        metrics::inc_snapshots_published();

        if cfg!(debug_assertions) {
            if let Err(e) = self.book.check_invariants() {
                panic!("book invariants violated after replay: {e}");
            }
        }
        let s = &self.stats;
        info!(
            "replay finished: records={} applied={} unknown_order={} duplicate_order={} unsupported={} snapshots={} paused={:?} live_orders={}",
            s.records, s.applied, s.unknown_order, s.duplicate_order, s.unsupported, s.snapshots, s.paused,
            self.book.order_count()
        );
        self.stats
    }
}

/// Wall-clock wait for `delta` simulated seconds at `speed`, capped at
/// `MAX_PAUSE`. Both inputs must be positive.
fn pause_for(delta: f64, speed: f64) -> Duration {
    match Duration::try_from_secs_f64(delta / speed) {
        Ok(d) if d <= MAX_PAUSE => d,
        _ => {
            warn!("gap of {delta}s at speed {speed} exceeds max pause; waiting {MAX_PAUSE:?}");
            MAX_PAUSE
        }
    }
}

/// Run the replay on its own thread. The thread always runs the feed to the
/// end once started.
pub fn spawn<I>(cfg: ReplayConfig, feed: I, publisher: Publisher) -> anyhow::Result<thread::JoinHandle<ReplayStats>>
where
    I: IntoIterator<Item = Record> + Send + 'static,
{
    let join = thread::Builder::new()
        .name("replay".into())
        .spawn(move || Replayer::new(cfg).run(feed, publisher))?;
    Ok(join)
}
