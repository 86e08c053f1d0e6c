// src/main.rs
mod config;
mod event;
mod ledger;
mod mailbox;
mod metrics;
mod orderbook;
mod parser;
mod replay;
mod snapshot;
mod util;

use crate::config::AppConfig;
use crate::mailbox::Update;
use crate::parser::FeedReader;
use crate::snapshot::BookSnapshot;
use crate::util::BarrierFlag;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let cfg_path = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("config.toml"));
    let mut cfg = AppConfig::from_file(&cfg_path)?;
    if let Some(feed) = args.next() {
        cfg.feed.path = feed;
    }
    info!("loaded config: {:?}", cfg);

    let shutdown = Arc::new(BarrierFlag::default());
    {
        let s = shutdown.clone();
        ctrlc::set_handler(move || {
            s.raise();
        })?;
    }

    let _metrics_handle = match &cfg.metrics {
        Some(m) => Some(metrics::spawn_http(&m.bind)?),
        None => None,
    };

    let feed = FeedReader::open(Path::new(&cfg.feed.path))?;
    let (publisher, mut subscriber) = mailbox::channel();
    let producer = replay::spawn(cfg.replay_config(), feed, publisher)?;

    // Consumer: observe whatever is newest, at most once per publication.
    let poll = Duration::from_millis(cfg.consumer.poll_ms);
    let mut observed: u64 = 0;
    let finished = loop {
        if shutdown.is_raised() {
            break false;
        }
        match subscriber.wait(poll) {
            Update::Snapshot(snap) => {
                observe(&snap);
                observed += 1;
            }
            Update::Finished(snap) => {
                if let Some(snap) = snap {
                    observe(&snap);
                    observed += 1;
                }
                break true;
            }
            Update::Idle => {}
        }
    };

    if finished {
        match producer.join() {
            Ok(stats) => info!(
                "done: records={} snapshots_published={} snapshots_observed={}",
                stats.records, stats.snapshots, observed
            ),
            Err(_) => error!("replay thread panicked"),
        }
    } else {
        warn!("shutdown requested; leaving replay thread after {observed} observed snapshots");
        if let Some(snap) = subscriber.latest() {
            info!("last published: {snap}");
        }
    }

    info!("clean shutdown");
    Ok(())
}

fn observe(snap: &BookSnapshot) {
    info!("{snap}");
}
