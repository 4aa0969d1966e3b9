//! Three-sonar collision avoidance.
//!
//! Forward, port-45° and starboard-45° sensors fire one after another (the
//! driver's job) so their bursts never overlap; this module only turns the
//! three distances into a decision and an indicator state.

use serde::Deserialize;
use std::time::{Duration, Instant};

/// Round trips longer than this mean nothing reflected within range.
pub const ECHO_TIMEOUT_US: u32 = 30_000;
/// Control cadence for one full three-sensor sweep.
pub const CYCLE: Duration = Duration::from_millis(90);
pub const FLASH_PERIOD: Duration = Duration::from_millis(250);

/// Distance from one sensor. `Clear` orders above every measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Range {
    Measured(u16),
    Clear,
}

impl Range {
    /// Convert an echo pulse width to centimetres (343 m/s, there and back).
    pub fn from_echo_us(us: u32) -> Self {
        if us == 0 || us >= ECHO_TIMEOUT_US {
            return Range::Clear;
        }
        Range::Measured((us as f32 * 0.034 / 2.0) as u16)
    }

    pub fn below(self, cm: u16) -> bool {
        matches!(self, Range::Measured(d) if d < cm)
    }
}

impl From<u16> for Range {
    fn from(cm: u16) -> Self {
        Range::Measured(cm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeReading {
    pub forward: Range,
    pub port: Range,
    pub starboard: Range,
}

impl RangeReading {
    pub const CLEAR: RangeReading = RangeReading {
        forward: Range::Clear,
        port: Range::Clear,
        starboard: Range::Clear,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Clear,
    AvoidPort,
    AvoidStarboard,
    Stop,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AvoidanceConfig {
    #[serde(default = "default_emergency_cm")]
    pub emergency_cm: u16,
    #[serde(default = "default_avoid_cm")]
    pub avoid_cm: u16,
}

fn default_emergency_cm() -> u16 { 50 }
fn default_avoid_cm() -> u16 { 200 }

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self { emergency_cm: default_emergency_cm(), avoid_cm: default_avoid_cm() }
    }
}

impl AvoidanceConfig {
    pub fn classify(&self, forward: Range, port: Range, starboard: Range) -> Zone {
        if [forward, port, starboard].iter().any(|r| r.below(self.emergency_cm)) {
            Zone::Stop
        } else if forward.below(self.avoid_cm) {
            // Ties go to starboard.
            if port > starboard { Zone::AvoidPort } else { Zone::AvoidStarboard }
        } else {
            Zone::Clear
        }
    }
}

/// Classify with the stock 50 cm / 200 cm thresholds.
pub fn classify(forward: Range, port: Range, starboard: Range) -> Zone {
    AvoidanceConfig::default().classify(forward, port, starboard)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub green: bool,
    pub red: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvoidanceOutput {
    pub zone: Zone,
    pub indicator: Indicator,
}

/// Per-cycle engine: classification plus the flashing indicator, which is
/// the only thing carried from one cycle to the next.
#[derive(Debug, Clone)]
pub struct CollisionAvoidance {
    cfg: AvoidanceConfig,
    last_flash: Option<Instant>,
    flash_on: bool,
}

impl CollisionAvoidance {
    pub fn new(cfg: AvoidanceConfig) -> Self {
        Self { cfg, last_flash: None, flash_on: false }
    }

    pub fn cycle(&mut self, reading: RangeReading, now: Instant) -> AvoidanceOutput {
        let zone = self.cfg.classify(reading.forward, reading.port, reading.starboard);
        let indicator = match zone {
            Zone::Stop => Indicator { green: false, red: true },
            Zone::Clear => Indicator { green: true, red: false },
            Zone::AvoidPort | Zone::AvoidStarboard => {
                let due = self
                    .last_flash
                    .map_or(true, |t| now.saturating_duration_since(t) >= FLASH_PERIOD);
                if due {
                    self.flash_on = !self.flash_on;
                    self.last_flash = Some(now);
                }
                Indicator { green: self.flash_on, red: false }
            }
        };
        AvoidanceOutput { zone, indicator }
    }

    /// Time left to pad a sweep that finished early back up to [`CYCLE`].
    pub fn pad(elapsed: Duration) -> Duration {
        CYCLE.saturating_sub(elapsed)
    }
}

impl Default for CollisionAvoidance {
    fn default() -> Self {
        Self::new(AvoidanceConfig::default())
    }
}
