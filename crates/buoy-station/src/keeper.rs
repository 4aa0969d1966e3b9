//! Station keeping for one course mark.
//!
//! [`StationKeeper`] owns the mark's runtime state and is the only thing
//! that changes it. It never touches the radio or the hardware: each event
//! goes in with the current instant and a list of [`Output`]s comes back
//! for the control loop to dispatch.

use std::time::{Duration, Instant};

use buoy_nav::avoid::{CollisionAvoidance, Indicator, RangeReading};
use buoy_nav::geo::{bearing_deg, haversine_m, wrap_180};
use buoy_nav::gnss::Position;
use buoy_nav::wind::{WindStabilityMonitor, WindVane};
use buoy_proto::{AckAssign, Assign, Identifier, LatLon, Packet, Status};
use tracing::{debug, info, warn};

use crate::helm::{Helm, MotorCommand};
use crate::StationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuoyState {
    Init,
    Deploy,
    Hold,
    Adjust,
    Recover,
    Failsafe,
}

impl BuoyState {
    /// Holding or heading for an assigned station.
    pub fn is_under_way(self) -> bool {
        matches!(self, BuoyState::Deploy | BuoyState::Hold | BuoyState::Adjust)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    PositionLost,
    HeadingFailed,
    PropulsionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailsafeReason {
    CommsTimeout,
    Sensor(Fault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustCause {
    Drift,
    Wind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub coord: LatLon,
    pub hold_radius_m: f64,
}

/// One control tick's worth of sensor input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub position: Option<Position>,
    /// Compass heading; `None` when the compass stopped answering.
    pub heading_deg: Option<f64>,
    /// Raw vane angle before the mounting offset.
    pub vane_deg: Option<f64>,
    pub battery_v: f32,
    pub ranges: RangeReading,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Packet(Packet),
    Tick(Readings),
    Fault(Fault),
    Recall,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Transmit in this node's reply slot.
    Reply(Packet),
    Motor(MotorCommand),
    Indicator(Indicator),
}

#[derive(Debug, Clone)]
pub struct BuoyRuntime {
    pub state: BuoyState,
    pub target: Option<Target>,
    pub last_comms: Instant,
    pub on_station: Duration,
}

pub struct StationKeeper {
    id: Identifier,
    cfg: StationConfig,
    rt: BuoyRuntime,
    helm: Helm,
    vane: WindVane,
    wind: WindStabilityMonitor,
    avoidance: CollisionAvoidance,

    last_fix: Option<Position>,
    battery_v: f32,
    wind_dir: Option<f64>,
    wind_baseline: Option<f64>,
    within_since: Option<Instant>,
    adjust_cause: Option<AdjustCause>,
    failsafe_reason: Option<FailsafeReason>,
    last_tick: Option<Instant>,
    last_status: Option<Instant>,
}

impl StationKeeper {
    pub fn new(id: Identifier, cfg: StationConfig, now: Instant) -> Self {
        Self {
            id,
            rt: BuoyRuntime {
                state: BuoyState::Init,
                target: None,
                last_comms: now,
                on_station: Duration::ZERO,
            },
            helm: Helm::default(),
            vane: WindVane { offset_deg: cfg.vane_offset_deg },
            wind: WindStabilityMonitor::new(cfg.wind_window(), cfg.wind_threshold_deg),
            avoidance: CollisionAvoidance::new(cfg.avoidance),
            cfg,
            last_fix: None,
            battery_v: 0.0,
            wind_dir: None,
            wind_baseline: None,
            within_since: None,
            adjust_cause: None,
            failsafe_reason: None,
            last_tick: None,
            last_status: None,
        }
    }

    pub fn id(&self) -> Identifier {
        self.id
    }

    pub fn state(&self) -> BuoyState {
        self.rt.state
    }

    pub fn runtime(&self) -> &BuoyRuntime {
        &self.rt
    }

    pub fn adjust_cause(&self) -> Option<AdjustCause> {
        self.adjust_cause
    }

    pub fn failsafe_reason(&self) -> Option<FailsafeReason> {
        self.failsafe_reason
    }

    pub fn handle(&mut self, event: Event, now: Instant) -> Vec<Output> {
        let mut out = Vec::new();
        match event {
            Event::Packet(p) => self.on_packet(p, now, &mut out),
            Event::Tick(r) => self.on_tick(r, now, &mut out),
            Event::Fault(f) => self.enter_failsafe(FailsafeReason::Sensor(f), &mut out),
            Event::Recall => self.enter_recover(&mut out),
        }
        out
    }

    fn on_packet(&mut self, p: Packet, now: Instant, out: &mut Vec<Output>) {
        match p {
            Packet::Assign(a) => {
                // Only the coordinator sends Assigns; any of them proves the link.
                self.rt.last_comms = now;
                if a.buoy == self.id {
                    self.on_assign(a, now, out);
                } else {
                    debug!(id = %self.id, to = %a.buoy, "assign for another mark");
                }
            }
            Packet::Ping(ping) if ping.sender == Identifier::Coordinator => {
                self.rt.last_comms = now;
                self.last_status = Some(now);
                out.push(Output::Reply(self.status_packet()));
            }
            Packet::RcStop { sender: Identifier::RemoteControl } => self.enter_recover(out),
            other => debug!(id = %self.id, kind = ?other.kind(), from = %other.node(), "ignored"),
        }
    }

    fn on_assign(&mut self, a: Assign, now: Instant, out: &mut Vec<Output>) {
        let position = self.last_fix.map(|f| f.coord).unwrap_or_default();
        let fix_ok = self
            .last_fix
            .map_or(false, |f| f.quality.mode >= self.cfg.min_fix_mode);

        if !fix_ok {
            warn!(
                id = %self.id,
                state = ?self.rt.state,
                fix = ?self.last_fix.map(|f| f.quality.mode),
                "assign rejected: insufficient fix"
            );
            out.push(Output::Reply(ack(self.id, false, position)));
            return;
        }

        let radius = if a.hold_radius_m == 0 { self.cfg.default_hold_radius_m } else { a.hold_radius_m };
        self.rt.target = Some(Target { coord: a.target, hold_radius_m: radius as f64 });
        self.failsafe_reason = None;
        self.transition(BuoyState::Deploy, now, "assign accepted");
        out.push(Output::Reply(ack(self.id, true, position)));
    }

    fn on_tick(&mut self, r: Readings, now: Instant, out: &mut Vec<Output>) {
        let dt = self.last_tick.map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        self.last_tick = Some(now);
        self.last_fix = r.position;
        self.battery_v = r.battery_v;
        self.wind_dir = match (r.vane_deg, r.heading_deg) {
            (Some(vane), Some(heading)) => Some(self.vane.fuse(vane, heading).absolute_deg),
            _ => None,
        };

        if self.rt.state != BuoyState::Failsafe
            && now.saturating_duration_since(self.rt.last_comms) > self.cfg.comms_timeout()
        {
            self.enter_failsafe(FailsafeReason::CommsTimeout, out);
        }

        if self.rt.state.is_under_way() {
            if !r.position.map_or(false, |p| p.quality.has_fix()) {
                self.enter_failsafe(FailsafeReason::Sensor(Fault::PositionLost), out);
            } else if r.heading_deg.is_none() {
                self.enter_failsafe(FailsafeReason::Sensor(Fault::HeadingFailed), out);
            }
        }

        self.step_station(now, dt);

        let avoid = self.avoidance.cycle(r.ranges, now);
        let cmd = self.helm.avoid(avoid.zone, self.helm_command(r.heading_deg));
        out.push(Output::Motor(cmd));
        out.push(Output::Indicator(avoid.indicator));

        if self.rt.state.is_under_way()
            && self
                .last_status
                .map_or(true, |t| now.saturating_duration_since(t) >= self.cfg.status_interval())
        {
            self.last_status = Some(now);
            out.push(Output::Reply(self.status_packet()));
        }
    }

    fn step_station(&mut self, now: Instant, dt: Duration) {
        let (Some(target), Some(fix)) = (self.rt.target, self.last_fix) else { return };
        let dist = haversine_m(fix.coord, target.coord);
        let inside = dist <= target.hold_radius_m;

        match self.rt.state {
            BuoyState::Deploy => {
                if inside {
                    let since = *self.within_since.get_or_insert(now);
                    if now.saturating_duration_since(since) >= self.cfg.dwell() {
                        self.transition(BuoyState::Hold, now, "on station");
                    }
                } else {
                    self.within_since = None;
                }
            }
            BuoyState::Hold => {
                self.rt.on_station += dt;
                self.observe_wind(now);
                if !inside {
                    self.transition(BuoyState::Adjust, now, "drifted off station");
                    self.adjust_cause = Some(AdjustCause::Drift);
                    debug!(id = %self.id, dist_m = dist, "drift");
                } else if self.wind.is_unstable(now) {
                    self.transition(BuoyState::Adjust, now, "sustained wind shift");
                    self.adjust_cause = Some(AdjustCause::Wind);
                    debug!(id = %self.id, shift = self.wind.net_shift(), "wind");
                    self.rebaseline_wind();
                }
            }
            BuoyState::Adjust => {
                self.observe_wind(now);
                let wind_settled = match self.adjust_cause {
                    // No vane, no way to judge; drift alone decides.
                    Some(AdjustCause::Wind) if self.wind_dir.is_some() => {
                        if self.wind.is_unstable(now) {
                            debug!(id = %self.id, shift = self.wind.net_shift(), "wind still shifting");
                            self.rebaseline_wind();
                        }
                        self.wind.is_settled(now)
                    }
                    _ => true,
                };
                if inside && wind_settled {
                    self.transition(BuoyState::Hold, now, "back on station");
                }
            }
            _ => {}
        }
    }

    fn observe_wind(&mut self, now: Instant) {
        match (self.wind_dir, self.wind_baseline) {
            (Some(dir), Some(base)) => self.wind.observe(wrap_180(dir - base), now),
            // Vane came up after we reached the station.
            (Some(dir), None) => self.wind_baseline = Some(dir),
            _ => {}
        }
    }

    fn rebaseline_wind(&mut self) {
        self.wind_baseline = self.wind_dir;
        self.wind.reset();
    }

    fn helm_command(&self, heading: Option<f64>) -> MotorCommand {
        match self.rt.state {
            BuoyState::Init | BuoyState::Recover => MotorCommand::Idle,
            BuoyState::Failsafe => MotorCommand::Neutral,
            BuoyState::Deploy | BuoyState::Hold | BuoyState::Adjust => {
                let (Some(target), Some(fix), Some(heading)) = (self.rt.target, self.last_fix, heading) else {
                    return MotorCommand::Idle;
                };
                let dist = haversine_m(fix.coord, target.coord);
                if self.rt.state == BuoyState::Hold && dist <= target.hold_radius_m {
                    return MotorCommand::Idle;
                }
                self.helm.steer(heading, bearing_deg(fix.coord, target.coord), dist)
            }
        }
    }

    fn transition(&mut self, to: BuoyState, now: Instant, why: &str) {
        if self.rt.state != to {
            info!(id = %self.id, from = ?self.rt.state, to = ?to, "{}", why);
        }
        self.rt.state = to;
        self.within_since = None;
        if to == BuoyState::Hold {
            self.adjust_cause = None;
            self.rebaseline_wind();
            self.last_tick = Some(now);
        }
    }

    fn enter_failsafe(&mut self, reason: FailsafeReason, out: &mut Vec<Output>) {
        if self.rt.state == BuoyState::Failsafe {
            return;
        }
        warn!(id = %self.id, from = ?self.rt.state, ?reason, "entering failsafe");
        self.rt.state = BuoyState::Failsafe;
        self.rt.target = None;
        self.failsafe_reason = Some(reason);
        self.within_since = None;
        self.adjust_cause = None;
        out.push(Output::Motor(MotorCommand::Neutral));
    }

    fn enter_recover(&mut self, out: &mut Vec<Output>) {
        if self.rt.state == BuoyState::Recover {
            return;
        }
        info!(id = %self.id, from = ?self.rt.state, "recalled, awaiting pickup");
        self.rt.state = BuoyState::Recover;
        self.rt.target = None;
        self.within_since = None;
        self.adjust_cause = None;
        out.push(Output::Motor(MotorCommand::Idle));
    }

    pub fn status_packet(&self) -> Packet {
        let position = self.last_fix.map(|f| f.coord).unwrap_or_default();
        let dist_to_target_cm = match (self.rt.target, self.last_fix) {
            (Some(t), Some(f)) => {
                (haversine_m(f.coord, t.coord) * 100.0).round().min((Status::NO_TARGET - 1) as f64) as u16
            }
            _ => Status::NO_TARGET,
        };
        Packet::Status(Status {
            sender: self.id,
            position,
            dist_to_target_cm,
            battery_dv: (self.battery_v * 10.0).round().clamp(0.0, 255.0) as u8,
        })
    }
}

fn ack(sender: Identifier, accepted: bool, position: LatLon) -> Packet {
    Packet::AckAssign(AckAssign { sender, accepted, position })
}
