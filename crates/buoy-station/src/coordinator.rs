//! Coordinator role: enumerates the fleet with Pings and hands out targets.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use buoy_nav::course::Course;
use buoy_proto::{Assign, Identifier, LatLon, Packet, Ping, Status};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::safety::AssignRateLimit;

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Minimum gap between Assigns to the same un-acked mark.
    #[serde(default = "default_assign_interval_ms")]
    pub assign_interval_ms: u64,

    /// A peer not heard from for this long drops out of `alive`.
    #[serde(default = "default_peer_timeout_s")]
    pub peer_timeout_s: u64,

    /// Hand out targets without waiting for an RcStart.
    #[serde(default)]
    pub autostart: bool,

    #[serde(default)]
    pub course: Course,
}

fn default_ping_interval_ms() -> u64 { 2000 }
fn default_assign_interval_ms() -> u64 { 3000 }
fn default_peer_timeout_s() -> u64 { 60 }

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            assign_interval_ms: default_assign_interval_ms(),
            peer_timeout_s: default_peer_timeout_s(),
            autostart: false,
            course: Course::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PeerStatus {
    pub last_heard: Option<Instant>,
    pub position: Option<LatLon>,
    pub dist_to_target_cm: Option<u16>,
    pub battery_dv: Option<u8>,
    /// Accepted its current Assign.
    pub acked: bool,
}

impl PeerStatus {
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.last_heard.map(|t| now.saturating_duration_since(t))
    }

    fn record_status(&mut self, s: &Status) {
        self.position = Some(s.position);
        self.battery_dv = Some(s.battery_dv);
        self.dist_to_target_cm = (s.dist_to_target_cm != Status::NO_TARGET).then_some(s.dist_to_target_cm);
    }
}

pub struct Coordinator {
    cfg: CoordinatorConfig,
    boot: Instant,
    started: bool,
    peers: BTreeMap<Identifier, PeerStatus>,
    limiter: AssignRateLimit,
    last_ping: Option<Instant>,
}

impl Coordinator {
    pub fn new(cfg: CoordinatorConfig, now: Instant) -> Self {
        Self {
            started: cfg.autostart,
            limiter: AssignRateLimit::new(Duration::from_millis(cfg.assign_interval_ms)),
            cfg,
            boot: now,
            peers: BTreeMap::new(),
            last_ping: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn peer(&self, id: Identifier) -> Option<&PeerStatus> {
        self.peers.get(&id)
    }

    /// Peers heard from within the timeout, in identifier order.
    pub fn alive(&self, now: Instant) -> Vec<Identifier> {
        let timeout = Duration::from_secs(self.cfg.peer_timeout_s);
        self.peers
            .iter()
            .filter(|(_, p)| p.age(now).map_or(false, |a| a <= timeout))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn handle(&mut self, packet: Packet, now: Instant) {
        let from = packet.node();
        match packet {
            Packet::RcStart { sender: Identifier::RemoteControl } => {
                info!(from = %from, "course start");
                self.started = true;
                self.limiter.clear();
                for p in self.peers.values_mut() {
                    p.acked = false;
                }
            }
            Packet::RcStop { sender: Identifier::RemoteControl } => {
                info!(from = %from, "course stop");
                self.started = false;
            }
            Packet::AckAssign(a) => {
                let peer = self.touch(from, now);
                peer.position = Some(a.position);
                peer.acked = a.accepted;
                if a.accepted {
                    info!(peer = %from, "assign accepted");
                    self.limiter.forget(from);
                } else {
                    warn!(peer = %from, "assign rejected, will retry");
                }
            }
            Packet::Status(s) => {
                let on_course = self.cfg.course.mark(from).is_some();
                let peer = self.touch(from, now);
                peer.record_status(&s);
                debug!(peer = %from, dist_cm = s.dist_to_target_cm, battery_v = s.battery_volts(), "status");
                // A mark that has lost its target (failsafe, reboot) needs it again.
                if on_course && peer.acked && s.dist_to_target_cm == Status::NO_TARGET {
                    peer.acked = false;
                    warn!(peer = %from, "mark reports no target, reassigning");
                    self.limiter.forget(from);
                }
            }
            Packet::Assign(_) | Packet::Ping(_) | Packet::RcStart { .. } | Packet::RcStop { .. } => {
                debug!(from = %from, kind = ?packet.kind(), "ignored");
            }
        }
    }

    /// Packets due at `now`: a Ping on its interval, then Assigns for marks
    /// that have not accepted theirs.
    pub fn tick(&mut self, now: Instant) -> Vec<Packet> {
        let mut out = Vec::new();
        let ping_every = Duration::from_millis(self.cfg.ping_interval_ms);
        if self.last_ping.map_or(true, |t| now.saturating_duration_since(t) >= ping_every) {
            self.last_ping = Some(now);
            out.push(Packet::Ping(Ping {
                sender: Identifier::Coordinator,
                timestamp_ms: now.saturating_duration_since(self.boot).as_millis() as u32,
            }));
        }

        if !self.started {
            return out;
        }
        for mark in &self.cfg.course.marks {
            if self.peers.get(&mark.id).map_or(false, |p| p.acked) {
                continue;
            }
            if self.limiter.allow(mark.id, now) {
                debug!(mark = %mark.id, lat = mark.lat, lon = mark.lon, "assign");
                out.push(Packet::Assign(Assign {
                    buoy: mark.id,
                    target: mark.target(),
                    hold_radius_m: mark.hold_radius_m,
                }));
            }
        }
        out
    }

    fn touch(&mut self, id: Identifier, now: Instant) -> &mut PeerStatus {
        let peer = self.peers.entry(id).or_default();
        if peer.last_heard.is_none() {
            info!(peer = %id, "peer joined");
        }
        peer.last_heard = Some(now);
        peer
    }
}
