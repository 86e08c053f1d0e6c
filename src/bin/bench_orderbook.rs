#![allow(dead_code)]
use std::time::Instant;

// Pull the book directly into this bench to avoid compiling the full binary graph
#[path = "../event.rs"]
mod event;
#[path = "../ledger.rs"]
mod ledger;
#[path = "../orderbook.rs"]
mod orderbook;
#[path = "../snapshot.rs"]
mod snapshot;
#[path = "../util.rs"]
mod util;

use crate::event::event_type;
use crate::orderbook::OrderBook;

fn parse_arg_usize(args: &[String], idx: usize, default: usize) -> usize {
    args.get(idx).and_then(|s| s.parse::<usize>().ok()).unwrap_or(default)
}

fn main() {
    // Args: [orders] [price_levels] [snapshot_depth]
    let args: Vec<String> = std::env::args().collect();
    let orders = parse_arg_usize(&args, 1, 200_000);
    let levels = parse_arg_usize(&args, 2, 200).max(1);
    let depth = parse_arg_usize(&args, 3, 10);

    let mut book = OrderBook::with_capacity(orders);
    let start_total = Instant::now();
    let mut total_events: usize = 0;

    // Phase 1: Adds, bids below 1_000_000 ticks and asks above
    let t0 = Instant::now();
    for i in 0..orders {
        let oid = i as i64 + 1;
        let offset = 1 + (i % levels) as i64;
        let (px, dir) = if (i & 1) == 0 { (1_000_000 - offset, 1) } else { (1_000_000 + offset, -1) };
        let qty = 100 + (i % 50) as u32;
        book.process_message(event_type::ADD, oid, qty, px, dir);
        total_events += 1;
    }
    let adds_dur = t0.elapsed();

    // Phase 2: Partial cancels and executions on random orders
    let t1 = Instant::now();
    let mut x: u64 = 0x9E3779B97F4A7C15; // xorshift64* state
    for n in 0..orders / 2 {
        x ^= x >> 12; x ^= x << 25; x ^= x >> 27; x = x.wrapping_mul(0x2545F4914F6CDD1D);
        let oid = (x as usize % orders) as i64 + 1;
        let qty = 1 + (x & 0x3F) as u32;
        let code = if n % 4 == 0 { event_type::EXECUTE } else { event_type::CANCEL };
        book.process_message(code, oid, qty, 0, 0);
        total_events += 1;
    }
    let reduce_dur = t1.elapsed();

    // Phase 3: Snapshots
    let t2 = Instant::now();
    let snaps = 10_000;
    for _ in 0..snaps {
        std::hint::black_box(book.snapshot(depth));
    }
    let snap_dur = t2.elapsed();

    // Phase 4: Delete every 3rd order
    let t3 = Instant::now();
    for i in (0..orders).step_by(3) {
        book.process_message(event_type::DELETE, i as i64 + 1, 0, 0, 0);
        total_events += 1;
    }
    let dels_dur = t3.elapsed();

    let total_dur = start_total.elapsed();
    if let Err(e) = book.check_invariants() {
        eprintln!("invariant check failed: {e}");
        std::process::exit(1);
    }

    println!(
        "bench_orderbook: orders={} levels={} depth={} total_events={} live={} trades={} total_time_ms={:.3} adds_ms={:.3} reduce_ms={:.3} dels_ms={:.3} snapshot_us={:.3} throughput_meps={:.3}",
        orders,
        levels,
        depth,
        total_events,
        book.order_count(),
        book.ledger().total_recorded(),
        total_dur.as_secs_f64() * 1000.0,
        adds_dur.as_secs_f64() * 1000.0,
        reduce_dur.as_secs_f64() * 1000.0,
        dels_dur.as_secs_f64() * 1000.0,
        snap_dur.as_secs_f64() * 1e6 / snaps as f64,
        (total_events as f64) / 1_000_000.0 / (total_dur - snap_dur).as_secs_f64(),
    );
}
