//! Wind direction stability, vane/compass fusion and anemometer pulse rate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::geo::wrap_180;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_THRESHOLD_DEG: f64 = 15.0;

/// Rolling window of wind-shift samples.
///
/// Reports instability only once it has watched a full window and the mean
/// shift over that window is past the threshold, so a single gust cannot
/// move a mark.
#[derive(Debug, Clone)]
pub struct WindStabilityMonitor {
    window: Duration,
    threshold_deg: f64,
    samples: VecDeque<(Instant, f64)>,
    since: Option<Instant>,
}

impl WindStabilityMonitor {
    pub fn new(window: Duration, threshold_deg: f64) -> Self {
        Self { window, threshold_deg, samples: VecDeque::new(), since: None }
    }

    pub fn observe(&mut self, shift_deg: f64, now: Instant) {
        self.evict(now);
        self.since.get_or_insert(now);
        self.samples.push_back((now, shift_deg));
    }

    pub fn is_unstable(&mut self, now: Instant) -> bool {
        self.evict(now);
        let Some(since) = self.since else { return false };
        if now.saturating_duration_since(since) < self.window {
            return false;
        }
        self.net_shift().abs() > self.threshold_deg
    }

    /// A full window has been observed and its net shift is within the
    /// threshold. Stricter than `!is_unstable`, which also holds while the
    /// window is still filling.
    pub fn is_settled(&mut self, now: Instant) -> bool {
        self.evict(now);
        let Some(since) = self.since else { return false };
        now.saturating_duration_since(since) >= self.window && self.net_shift().abs() <= self.threshold_deg
    }

    /// Signed mean shift over the retained samples.
    pub fn net_shift(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|(_, s)| s).sum::<f64>() / self.samples.len() as f64
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.since = None;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(t, _)) = self.samples.front() {
            if now.saturating_duration_since(t) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        if self.samples.is_empty() {
            self.since = None;
        }
    }
}

impl Default for WindStabilityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_THRESHOLD_DEG)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindReading {
    /// Vane angle with the mounting offset removed; 0 = wind on the bow.
    pub relative_deg: f64,
    /// Magnetic direction the wind comes from.
    pub absolute_deg: f64,
    /// Positive = wind from starboard.
    pub heading_error_deg: f64,
}

/// Potentiometer wind vane mounted on the hull.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindVane {
    pub offset_deg: f64,
}

impl WindVane {
    pub const ADC_FULL_SCALE: f64 = 4095.0;

    pub fn raw_from_adc(adc: u16) -> f64 {
        adc as f64 / Self::ADC_FULL_SCALE * 360.0
    }

    pub fn fuse(&self, vane_raw_deg: f64, compass_deg: f64) -> WindReading {
        let relative = (vane_raw_deg - self.offset_deg).rem_euclid(360.0);
        WindReading {
            relative_deg: relative,
            absolute_deg: (compass_deg + relative).rem_euclid(360.0),
            heading_error_deg: wrap_180(relative),
        }
    }
}

pub const PULSE_DEBOUNCE_MS: u32 = 10;
pub const RATE_INTERVAL_MS: u32 = 1000;
/// Davis cup anemometer: one pulse per second is one mile per hour.
pub const KMH_PER_PULSE_HZ: f32 = 1.609344;

/// Anemometer pulse cell.
///
/// Exactly one writer calls [`PulseCounter::record`] (the edge handler) and
/// exactly one reader drains it through [`WindSpeedMeter`]. Both sides only
/// touch the atomics, so neither blocks the other.
#[derive(Debug, Default)]
pub struct PulseCounter {
    count: AtomicU32,
    last_pulse_ms: AtomicU32,
}

impl PulseCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count an edge at `now_ms` unless it falls inside the debounce window
    /// of the previous accepted edge.
    pub fn record(&self, now_ms: u32) -> bool {
        let last = self.last_pulse_ms.load(Ordering::Relaxed);
        if now_ms.wrapping_sub(last) <= PULSE_DEBOUNCE_MS {
            return false;
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        self.last_pulse_ms.store(now_ms, Ordering::Relaxed);
        true
    }

    pub fn last_pulse_ms(&self) -> u32 {
        self.last_pulse_ms.load(Ordering::Relaxed)
    }

    fn take(&self) -> u32 {
        self.count.swap(0, Ordering::AcqRel)
    }
}

/// Reader side of the pulse cell; recomputes the speed once per interval.
#[derive(Debug)]
pub struct WindSpeedMeter {
    counter: Arc<PulseCounter>,
    last_calc_ms: u32,
    speed_kmh: f32,
}

impl WindSpeedMeter {
    pub fn new(counter: Arc<PulseCounter>, now_ms: u32) -> Self {
        Self { counter, last_calc_ms: now_ms, speed_kmh: 0.0 }
    }

    pub fn update(&mut self, now_ms: u32) -> f32 {
        let elapsed = now_ms.wrapping_sub(self.last_calc_ms);
        if elapsed >= RATE_INTERVAL_MS {
            let pulses = self.counter.take();
            let pps = pulses as f32 / (elapsed as f32 / 1000.0);
            self.speed_kmh = pps * KMH_PER_PULSE_HZ;
            self.last_calc_ms = now_ms;
        }
        self.speed_kmh
    }

    pub fn speed_kmh(&self) -> f32 {
        self.speed_kmh
    }
}
