// src/config.rs
use crate::replay::ReplayConfig;
use serde::Deserialize;
use std::{fs, path::Path};

pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub feed: Feed,
    #[serde(default)]
    pub replay: Replay,
    #[serde(default)]
    pub consumer: Consumer,
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feed {
    /// LOBSTER message file (csv, no header)
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Replay {
    #[serde(default = "default_speed")]
    pub speed: f64,                 // 0 = as fast as possible, 1 = real time, N = N x
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,        // records between published snapshots
    #[serde(default = "default_depth")]
    pub depth: usize,               // levels per side in each snapshot
}

impl Default for Replay {
    fn default() -> Self {
        Self { speed: default_speed(), snapshot_every: default_snapshot_every(), depth: default_depth() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Consumer {
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,               // max wait per consumer iteration
}

impl Default for Consumer {
    fn default() -> Self { Self { poll_ms: default_poll_ms() } }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metrics {
    /// Bind address for Prometheus exporter (e.g. "0.0.0.0:9100")
    pub bind: String,
}

fn default_speed() -> f64 { 1.0 }
fn default_snapshot_every() -> u64 { 500 }
fn default_depth() -> usize { 10 }
fn default_poll_ms() -> u64 { 50 }

impl AppConfig {
    pub fn from_file(p: &Path) -> anyhow::Result<Self> {
        let s = fs::read_to_string(p).map_err(|e| anyhow::anyhow!("read config {:?}: {e}", p))?;
        Self::parse(&s)
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feed.path.trim().is_empty() {
            anyhow::bail!("feed.path must not be empty");
        }
        if !self.replay.speed.is_finite() || self.replay.speed < 0.0 {
            anyhow::bail!("replay.speed must be a finite number >= 0");
        }
        if self.replay.snapshot_every == 0 {
            anyhow::bail!("replay.snapshot_every must be > 0");
        }
        if self.replay.depth == 0 || self.replay.depth > MAX_DEPTH {
            anyhow::bail!("replay.depth must be in [1, {MAX_DEPTH}]");
        }
        if self.consumer.poll_ms == 0 {
            anyhow::bail!("consumer.poll_ms must be > 0");
        }
        if let Some(m) = &self.metrics {
            if m.bind.trim().is_empty() {
                anyhow::bail!("metrics.bind must not be empty");
            }
        }
        Ok(())
    }

    pub fn replay_config(&self) -> ReplayConfig {
        ReplayConfig {
            speed: self.replay.speed,
            snapshot_every: self.replay.snapshot_every,
            depth: self.replay.depth,
        }
    }
}
