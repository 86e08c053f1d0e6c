// src/util.rs
use std::sync::atomic::{AtomicBool, Ordering};

pub struct BarrierFlag(AtomicBool);

impl Default for BarrierFlag {
    fn default() -> Self { Self(AtomicBool::new(false)) }
}

impl BarrierFlag {
    #[inline]
    pub fn raise(&self) { self.0.store(true, Ordering::SeqCst); }
    #[inline]
    pub fn is_raised(&self) -> bool { self.0.load(Ordering::Relaxed) }
}

pub const PRICE_SCALE: f64 = 10_000.0;

#[inline]
pub fn ticks_to_display(ticks: i64) -> f64 { ticks as f64 / PRICE_SCALE }

/// `HH:MM:SS.ffffff` for a seconds-after-midnight timestamp. Microseconds
/// are truncated, not rounded.
pub fn format_clock(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--:--.------".to_string();
    }
    let whole = seconds.trunc();
    let micros = (((seconds - whole) * 1e6) as u64).min(999_999);
    let s = whole as u64;
    format!("{:02}:{:02}:{:02}.{:06}", s / 3600, (s % 3600) / 60, s % 60, micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_market_open() {
        assert_eq!(format_clock(34200.0), "09:30:00.000000");
        assert_eq!(format_clock(34200.5), "09:30:00.500000");
        assert_eq!(format_clock(57599.25), "15:59:59.250000");
    }

    #[test]
    fn hours_are_not_wrapped() {
        assert_eq!(format_clock(90061.0), "25:01:01.000000");
        assert_eq!(format_clock(0.0), "00:00:00.000000");
    }

    #[test]
    fn invalid_timestamps_render_placeholder() {
        assert_eq!(format_clock(f64::NAN), "--:--:--.------");
        assert_eq!(format_clock(-1.0), "--:--:--.------");
    }

    #[test]
    fn barrier_flag_latches() {
        let f = BarrierFlag::default();
        assert!(!f.is_raised());
        f.raise();
        assert!(f.is_raised());
    }
}
