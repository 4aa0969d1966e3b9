use serde::{Deserialize, Serialize};

use crate::id::Identifier;

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Target hand-out from the coordinator. `buoy` names the addressed mark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assign {
    pub buoy: Identifier,
    pub target: LatLon,
    pub hold_radius_m: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AckAssign {
    pub sender: Identifier,
    pub accepted: bool,
    pub position: LatLon,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub sender: Identifier,
    pub position: LatLon,
    /// Distance to the assigned target; [`Status::NO_TARGET`] when unassigned.
    pub dist_to_target_cm: u16,
    pub battery_dv: u8,
}

impl Status {
    pub const NO_TARGET: u16 = u16::MAX;

    pub fn battery_volts(&self) -> f32 {
        self.battery_dv as f32 / 10.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub sender: Identifier,
    pub timestamp_ms: u32,
}

/// Every message that travels over the course channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Assign(Assign),
    AckAssign(AckAssign),
    Status(Status),
    Ping(Ping),
    RcStart { sender: Identifier },
    RcStop { sender: Identifier },
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Assign(_) => PacketKind::Assign,
            Packet::AckAssign(_) => PacketKind::AckAssign,
            Packet::Status(_) => PacketKind::Status,
            Packet::Ping(_) => PacketKind::Ping,
            Packet::RcStart { .. } => PacketKind::RcStart,
            Packet::RcStop { .. } => PacketKind::RcStop,
        }
    }

    /// The identifier byte carried in the frame. For an Assign this is the
    /// addressed buoy, for everything else the transmitting node.
    pub fn node(&self) -> Identifier {
        match self {
            Packet::Assign(a) => a.buoy,
            Packet::AckAssign(a) => a.sender,
            Packet::Status(s) => s.sender,
            Packet::Ping(p) => p.sender,
            Packet::RcStart { sender } | Packet::RcStop { sender } => *sender,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Assign,
    AckAssign,
    Status,
    Ping,
    RcStart,
    RcStop,
}

impl PacketKind {
    pub const ALL: [PacketKind; 6] = [
        PacketKind::Assign,
        PacketKind::AckAssign,
        PacketKind::Status,
        PacketKind::Ping,
        PacketKind::RcStart,
        PacketKind::RcStop,
    ];

    pub fn tag(self) -> u8 {
        match self {
            PacketKind::Assign => 0xA5,
            PacketKind::AckAssign => 0xAA,
            PacketKind::Status => 0x5A,
            PacketKind::Ping => 0x55,
            PacketKind::RcStart => 0xB1,
            PacketKind::RcStop => 0xB2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

/// Fault bits reserved for a future Status revision. The current fixed
/// Status layout has no field for them, so nothing encodes these yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorFlags(pub u8);

impl ErrorFlags {
    pub const GPS_LOST: u8 = 0x01;
    pub const COMPASS_FAIL: u8 = 0x02;
    pub const LOW_BATTERY: u8 = 0x04;
    pub const MOTOR_FAIL: u8 = 0x08;
    pub const COMMS_LOST: u8 = 0x10;
    pub const WIND_FAIL: u8 = 0x20;

    pub fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit == bit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_distinct_and_round_trip() {
        for k in PacketKind::ALL {
            assert_eq!(PacketKind::from_tag(k.tag()), Some(k));
        }
        assert_eq!(PacketKind::from_tag(0x01), None);
        assert_eq!(PacketKind::from_tag(0x00), None);
    }

    #[test]
    fn node_reads_the_identifier_byte() {
        let a = Packet::Assign(Assign {
            buoy: Identifier::MarkB,
            target: LatLon::new(45.0, -71.0),
            hold_radius_m: 3,
        });
        assert_eq!(a.node(), Identifier::MarkB);
        assert_eq!(a.kind(), PacketKind::Assign);
        let stop = Packet::RcStop { sender: Identifier::RemoteControl };
        assert_eq!(stop.node(), Identifier::RemoteControl);
    }

    #[test]
    fn error_flags_accumulate() {
        let mut f = ErrorFlags::default();
        f.set(ErrorFlags::GPS_LOST);
        f.set(ErrorFlags::COMMS_LOST);
        assert!(f.contains(ErrorFlags::GPS_LOST));
        assert!(!f.contains(ErrorFlags::MOTOR_FAIL));
        assert_eq!(f.0, 0x11);
    }
}
