pub mod coordinator;
pub mod helm;
pub mod keeper;
pub mod node;
pub mod radio;
pub mod reply;
pub mod safety;

use buoy_nav::avoid::AvoidanceConfig;
use serde::Deserialize;
use std::time::Duration;

/// Tunables for a course mark. Every field defaults to the value the fleet
/// was commissioned with.
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    /// Used when an Assign arrives with a zero radius.
    #[serde(default = "default_hold_radius_m")]
    pub default_hold_radius_m: u8,

    /// Continuous time inside the radius before Deploy becomes Hold.
    #[serde(default = "default_dwell_s")]
    pub dwell_s: u64,

    /// Silence from the coordinator that forces Failsafe.
    #[serde(default = "default_comms_timeout_s")]
    pub comms_timeout_s: u64,

    /// Minimum GSA fix mode to accept an Assign (3 = 3-D).
    #[serde(default = "default_min_fix_mode")]
    pub min_fix_mode: u8,

    /// Unsolicited Status cadence while holding a station.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    #[serde(default = "default_wind_window_s")]
    pub wind_window_s: u64,

    #[serde(default = "default_wind_threshold_deg")]
    pub wind_threshold_deg: f64,

    /// Vane mounting offset, degrees.
    #[serde(default)]
    pub vane_offset_deg: f64,

    #[serde(default)]
    pub avoidance: AvoidanceConfig,
}

fn default_hold_radius_m() -> u8 { 3 }
fn default_dwell_s() -> u64 { 10 }
fn default_comms_timeout_s() -> u64 { 60 }
fn default_min_fix_mode() -> u8 { 3 }
fn default_status_interval_ms() -> u64 { 5000 }
fn default_wind_window_s() -> u64 { 60 }
fn default_wind_threshold_deg() -> f64 { 15.0 }

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            default_hold_radius_m: default_hold_radius_m(),
            dwell_s: default_dwell_s(),
            comms_timeout_s: default_comms_timeout_s(),
            min_fix_mode: default_min_fix_mode(),
            status_interval_ms: default_status_interval_ms(),
            wind_window_s: default_wind_window_s(),
            wind_threshold_deg: default_wind_threshold_deg(),
            vane_offset_deg: 0.0,
            avoidance: AvoidanceConfig::default(),
        }
    }
}

impl StationConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_secs(self.dwell_s)
    }

    pub fn comms_timeout(&self) -> Duration {
        Duration::from_secs(self.comms_timeout_s)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn wind_window(&self) -> Duration {
        Duration::from_secs(self.wind_window_s)
    }
}
