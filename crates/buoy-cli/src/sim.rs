//! Stand-in hull for running marks without hardware.

use std::sync::Arc;
use std::time::{Duration, Instant};

use buoy_nav::avoid::{Indicator, RangeReading};
use buoy_nav::geo::offset_m;
use buoy_nav::gnss::{FixQuality, Position, FIX_3D};
use buoy_nav::wind::PulseCounter;
use buoy_proto::LatLon;
use buoy_station::helm::MotorCommand;
use buoy_station::keeper::Readings;
use buoy_station::node::Hull;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

const TOP_SPEED_MPS: f64 = 1.5;
const TURN_RATE_DPS: f64 = 60.0;
/// Steady set to the north, plus noise.
const CURRENT_MPS: f64 = 0.08;
const WIND_FROM_DEG: f64 = 270.0;

pub struct SimHull {
    pos: LatLon,
    heading_deg: f64,
    cmd: MotorCommand,
    indicator: Option<Indicator>,
    battery_v: f32,
    last: Instant,
    rng: StdRng,
    gnss: Option<watch::Receiver<Option<Position>>>,
}

impl SimHull {
    pub fn new(start: LatLon, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            pos: start,
            heading_deg: rng.gen_range(0.0..360.0),
            cmd: MotorCommand::Neutral,
            indicator: None,
            battery_v: 12.6,
            last: Instant::now(),
            rng,
            gnss: None,
        }
    }

    /// Take positions from a real receiver instead of dead reckoning.
    pub fn with_gnss(mut self, rx: watch::Receiver<Option<Position>>) -> Self {
        self.gnss = Some(rx);
        self
    }

    pub fn position(&self) -> LatLon {
        self.pos
    }

    fn advance(&mut self, dt: f64) {
        let (left, right) = match self.cmd {
            MotorCommand::Drive { left, right } => (left as f64 / 100.0, right as f64 / 100.0),
            MotorCommand::Idle | MotorCommand::Neutral => (0.0, 0.0),
        };
        self.heading_deg = (self.heading_deg + (left - right) * TURN_RATE_DPS * dt).rem_euclid(360.0);

        let speed = (left + right) / 2.0 * TOP_SPEED_MPS;
        let h = self.heading_deg.to_radians();
        let set_n = CURRENT_MPS + self.rng.gen_range(-0.03..0.03);
        let set_e = self.rng.gen_range(-0.03..0.03);
        self.pos = offset_m(self.pos, (speed * h.cos() + set_n) * dt, (speed * h.sin() + set_e) * dt);

        let load = (left.abs() + right.abs()) as f32;
        self.battery_v = (self.battery_v - 0.0005 * load * dt as f32).max(10.5);
    }
}

impl Hull for SimHull {
    fn read(&mut self) -> Readings {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.advance(dt);

        let position = match &self.gnss {
            Some(rx) => *rx.borrow(),
            None => Some(Position {
                coord: self.pos,
                quality: FixQuality { mode: FIX_3D, sats: 9, hdop: 0.9 },
                ts: OffsetDateTime::now_utc(),
            }),
        };
        let vane = (WIND_FROM_DEG - self.heading_deg + self.rng.gen_range(-4.0..4.0)).rem_euclid(360.0);
        Readings {
            position,
            heading_deg: Some(self.heading_deg),
            vane_deg: Some(vane),
            battery_v: self.battery_v,
            ranges: RangeReading::CLEAR,
        }
    }

    fn command(&mut self, cmd: MotorCommand) {
        if cmd != self.cmd {
            debug!(?cmd, "motors");
        }
        self.cmd = cmd;
    }

    fn indicate(&mut self, indicator: Indicator) {
        if self.indicator != Some(indicator) {
            debug!(?indicator, "indicator");
        }
        self.indicator = Some(indicator);
    }
}

/// Feeds the pulse counter like a cup anemometer in a steady breeze
/// (about ten pulses a second).
pub fn spawn_anemometer(counter: Arc<PulseCounter>, seed: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let boot = tokio::time::Instant::now();
        let mut rng = StdRng::seed_from_u64(seed);
        loop {
            tokio::time::sleep(Duration::from_millis(rng.gen_range(60..140))).await;
            counter.record(boot.elapsed().as_millis() as u32);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use buoy_nav::geo::haversine_m;

    #[test]
    fn idle_hull_drifts_with_the_current() {
        let start = LatLon::new(45.0, -71.0);
        let mut hull = SimHull::new(start, 7);
        hull.command(MotorCommand::Idle);
        for _ in 0..100 {
            hull.advance(0.1);
        }
        let moved = haversine_m(start, hull.position());
        assert!(moved > 0.3 && moved < 1.5, "{moved}");
        assert!(hull.position().lat > start.lat);
    }

    #[test]
    fn drive_moves_along_the_heading() {
        let start = LatLon::new(45.0, -71.0);
        let mut hull = SimHull::new(start, 1);
        hull.heading_deg = 90.0;
        hull.command(MotorCommand::Drive { left: 80, right: 80 });
        for _ in 0..50 {
            hull.advance(0.1);
        }
        assert!(hull.position().lon > start.lon);
        assert!((hull.heading_deg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn readings_carry_a_3d_fix() {
        let mut hull = SimHull::new(LatLon::new(45.0, -71.0), 3);
        let r = hull.read();
        assert_eq!(r.position.map(|p| p.quality.mode), Some(FIX_3D));
        assert!(r.vane_deg.is_some_and(|v| (0.0..360.0).contains(&v)));
    }

    #[test]
    fn external_gnss_overrides_dead_reckoning() {
        let (_tx, rx) = watch::channel(None);
        let mut hull = SimHull::new(LatLon::new(45.0, -71.0), 3).with_gnss(rx);
        assert!(hull.read().position.is_none());
    }
}
