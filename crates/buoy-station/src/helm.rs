use buoy_nav::avoid::Zone;
use buoy_nav::geo::wrap_180;

/// What the two thrusters are told each control tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    /// Disarmed, no thrust. Failsafe.
    Neutral,
    /// Armed, zero thrust.
    Idle,
    /// Differential thrust, percent of full, -100..=100 per side.
    Drive { left: i8, right: i8 },
}

impl MotorCommand {
    pub const STOP: MotorCommand = MotorCommand::Drive { left: 0, right: 0 };
}

/// Proportional steering toward the target.
#[derive(Debug, Clone, Copy)]
pub struct Helm {
    pub max_thrust_pct: f64,
    /// Distance at which forward thrust saturates.
    pub full_thrust_dist_m: f64,
    /// Heading error past which the hull pivots in place.
    pub pivot_deg: f64,
}

impl Default for Helm {
    fn default() -> Self {
        Self { max_thrust_pct: 80.0, full_thrust_dist_m: 20.0, pivot_deg: 90.0 }
    }
}

impl Helm {
    pub fn steer(&self, heading_deg: f64, bearing_deg: f64, dist_m: f64) -> MotorCommand {
        let err = wrap_180(bearing_deg - heading_deg);
        let forward = if err.abs() > self.pivot_deg {
            0.0
        } else {
            (dist_m / self.full_thrust_dist_m).clamp(0.0, 1.0) * self.max_thrust_pct
        };
        // Positive error = target to starboard: push harder on the port motor.
        let turn = err / 180.0 * self.max_thrust_pct;
        MotorCommand::Drive { left: pct(forward + turn), right: pct(forward - turn) }
    }

    /// Apply the avoidance decision on top of a steering command.
    pub fn avoid(&self, zone: Zone, cmd: MotorCommand) -> MotorCommand {
        let MotorCommand::Drive { .. } = cmd else { return cmd };
        let slow = pct(self.max_thrust_pct * 0.25);
        let fast = pct(self.max_thrust_pct * 0.75);
        match zone {
            Zone::Clear => cmd,
            Zone::Stop => MotorCommand::STOP,
            Zone::AvoidPort => MotorCommand::Drive { left: slow, right: fast },
            Zone::AvoidStarboard => MotorCommand::Drive { left: fast, right: slow },
        }
    }
}

fn pct(v: f64) -> i8 {
    v.round().clamp(-100.0, 100.0) as i8
}
