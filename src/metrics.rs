// src/metrics.rs
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::thread;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static EVENTS_APPLIED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(Opts::new("lob_events_applied", "Feed events that changed the book"), &["kind"])
        .expect("lob_events_applied");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static EVENTS_IGNORED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("lob_events_ignored", "Feed events that left the book unchanged"),
        &["reason"],
    )
    .expect("lob_events_ignored");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static RECORDS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("lob_records_dropped", "Feed lines rejected by the record parser").expect("lob_records_dropped");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static SNAPSHOTS_PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("lob_snapshots_published", "Snapshots handed to the consumer").expect("lob_snapshots_published");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static TRADES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("lob_trades", "Executions recorded in the trade ledger").expect("lob_trades");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static LIVE_ORDERS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("lob_live_orders", "Resting orders in the book").expect("lob_live_orders");
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

static PRICE_LEVELS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let g = IntGaugeVec::new(Opts::new("lob_price_levels", "Distinct price levels per side"), &["side"])
        .expect("lob_price_levels");
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

static REPLAY_PAUSE: Lazy<Histogram> = Lazy::new(|| {
    // Buckets in seconds: 10us .. 10s
    let buckets = vec![1e-5, 1e-4, 1e-3, 1e-2, 5e-2, 1e-1, 5e-1, 1.0, 5.0, 10.0];
    let h = Histogram::with_opts(
        HistogramOpts::new("lob_replay_pause_seconds", "Wall-clock pauses inserted to pace the replay").buckets(buckets),
    )
    .expect("lob_replay_pause_seconds");
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub fn inc_applied(kind: &str) { EVENTS_APPLIED.with_label_values(&[kind]).inc(); }
pub fn inc_ignored(reason: &str) { EVENTS_IGNORED.with_label_values(&[reason]).inc(); }
pub fn inc_records_dropped() { RECORDS_DROPPED.inc(); }
pub fn inc_snapshots_published() { SNAPSHOTS_PUBLISHED.inc(); }
pub fn inc_trades() { TRADES.inc(); }

pub fn set_book_gauges(live_orders: usize, bid_levels: usize, ask_levels: usize) {
    LIVE_ORDERS.set(live_orders as i64);
    PRICE_LEVELS.with_label_values(&["bid"]).set(bid_levels as i64);
    PRICE_LEVELS.with_label_values(&["ask"]).set(ask_levels as i64);
}

pub fn observe_pause_secs(secs: f64) { REPLAY_PAUSE.observe(secs); }

/// Text exposition of every registered metric.
pub fn render() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::with_capacity(16 * 1024);
    encoder.encode(&REGISTRY.gather(), &mut buf).ok();
    buf
}

pub fn spawn_http(addr: &str) -> anyhow::Result<thread::JoinHandle<()>> {
    let server = tiny_http::Server::http(addr).map_err(|e| anyhow::anyhow!("bind metrics http {addr}: {e}"))?;
    log::info!("prometheus metrics listening on http://{addr}/metrics");
    let join = thread::Builder::new().name("metrics-http".into()).spawn(move || serve(&server))?;
    Ok(join)
}

/// Answer scrapes until the listener fails.
fn serve(server: &tiny_http::Server) {
    let content_type = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/plain; version=0.0.4"[..]).ok();
    loop {
        let req = match server.recv() {
            Ok(req) => req,
            Err(e) => {
                log::error!("metrics http stopped: {e}");
                return;
            }
        };
        if req.url() == "/metrics" {
            let mut resp = tiny_http::Response::from_data(render()).with_status_code(200);
            if let Some(h) = content_type.clone() { resp = resp.with_header(h); }
            let _ = req.respond(resp);
        } else {
            let _ = req.respond(tiny_http::Response::empty(404));
        }
    }
}
