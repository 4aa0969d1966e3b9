//! Field-by-field frame layout for both protocol generations.
//!
//! Current frames (CRC16 trailer) carry `f32` coordinates. Legacy frames
//! (XOR trailer) carry a `u16` sequence number after the identifier and
//! `f64` coordinates. All multi-byte fields are little-endian; framing comes
//! from the radio's own message boundaries.

use bytes::{Buf, BufMut};
use thiserror::Error;
use tracing::trace;

use crate::checksum::ChecksumScheme;
use crate::id::Identifier;
use crate::packet::{AckAssign, Assign, LatLon, Packet, PacketKind, Ping, Status};

/// Why a frame was dropped. None of these are fatal; radio noise produces
/// all of them routinely.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short: {actual} bytes, need {expected}")]
    Length { expected: usize, actual: usize },
    #[error("checksum mismatch")]
    Checksum,
    #[error("unknown packet tag 0x{0:02x}")]
    UnknownKind(u8),
    #[error("unknown identifier {0}")]
    UnknownIdentifier(u8),
}

#[derive(Debug, Clone)]
pub struct PacketCodec {
    scheme: ChecksumScheme,
    seq: u16,
}

impl PacketCodec {
    pub fn new(scheme: ChecksumScheme) -> Self {
        Self { scheme, seq: 0 }
    }

    pub fn scheme(&self) -> ChecksumScheme {
        self.scheme
    }

    /// Fixed frame size for `kind` under this codec's scheme, trailer included.
    pub fn frame_len(&self, kind: PacketKind) -> usize {
        let coord = self.coord_len();
        let header = match self.scheme {
            ChecksumScheme::Crc16 => 2,
            ChecksumScheme::LegacyXor => 4,
        };
        let fields = match kind {
            PacketKind::Assign => 2 * coord + 1,
            PacketKind::AckAssign => 1 + 2 * coord,
            PacketKind::Status => 2 * coord + 2 + 1,
            PacketKind::Ping => 4,
            PacketKind::RcStart | PacketKind::RcStop => 0,
        };
        header + fields + self.scheme.trailer_len()
    }

    fn coord_len(&self) -> usize {
        match self.scheme {
            ChecksumScheme::Crc16 => 4,
            ChecksumScheme::LegacyXor => 8,
        }
    }

    /// Serialize `packet`. Legacy frames are stamped with the next sequence
    /// number.
    pub fn encode(&mut self, packet: &Packet) -> Vec<u8> {
        let kind = packet.kind();
        let mut out = Vec::with_capacity(self.frame_len(kind));
        out.put_u8(kind.tag());
        out.put_u8(packet.node().ordinal());
        if self.scheme == ChecksumScheme::LegacyXor {
            self.seq = self.seq.wrapping_add(1);
            out.put_u16_le(self.seq);
        }

        match packet {
            Packet::Assign(a) => {
                self.put_coord(&mut out, a.target);
                out.put_u8(a.hold_radius_m);
            }
            Packet::AckAssign(a) => {
                out.put_u8(a.accepted as u8);
                self.put_coord(&mut out, a.position);
            }
            Packet::Status(s) => {
                self.put_coord(&mut out, s.position);
                out.put_u16_le(s.dist_to_target_cm);
                out.put_u8(s.battery_dv);
            }
            Packet::Ping(p) => out.put_u32_le(p.timestamp_ms),
            Packet::RcStart { .. } | Packet::RcStop { .. } => {}
        }

        let body = out.clone();
        self.scheme.seal(&body, &mut out);
        debug_assert_eq!(out.len(), self.frame_len(kind));
        out
    }

    fn put_coord(&self, out: &mut Vec<u8>, c: LatLon) {
        match self.scheme {
            ChecksumScheme::Crc16 => {
                out.put_f32_le(c.lat as f32);
                out.put_f32_le(c.lon as f32);
            }
            ChecksumScheme::LegacyXor => {
                out.put_f64_le(c.lat);
                out.put_f64_le(c.lon);
            }
        }
    }

    /// Decode a frame, taking the kind from its first byte.
    pub fn decode(&self, buf: &[u8]) -> Result<Packet, DecodeError> {
        let Some(&tag) = buf.first() else {
            return Err(DecodeError::Length {
                expected: self.frame_len(PacketKind::RcStart),
                actual: 0,
            });
        };
        let kind = PacketKind::from_tag(tag).ok_or(DecodeError::UnknownKind(tag))?;
        self.decode_as(buf, kind)
    }

    /// Decode a frame whose kind is already known from the receive path. A
    /// tag that disagrees with `kind` is reported as an unknown kind.
    pub fn decode_as(&self, buf: &[u8], kind: PacketKind) -> Result<Packet, DecodeError> {
        let len = self.frame_len(kind);
        if buf.len() < len {
            return Err(DecodeError::Length { expected: len, actual: buf.len() });
        }
        if buf.len() > len {
            trace!(extra = buf.len() - len, "ignoring bytes past fixed frame size");
        }
        let frame = &buf[..len];
        if frame[0] != kind.tag() {
            return Err(DecodeError::UnknownKind(frame[0]));
        }
        if !self.scheme.verify(frame) {
            return Err(DecodeError::Checksum);
        }

        let mut r = &frame[1..len - self.scheme.trailer_len()];
        let id_byte = r.get_u8();
        let node = Identifier::from_u8(id_byte).ok_or(DecodeError::UnknownIdentifier(id_byte))?;
        if self.scheme == ChecksumScheme::LegacyXor {
            let seq = r.get_u16_le();
            trace!(seq, ?kind, "legacy frame");
        }

        let packet = match kind {
            PacketKind::Assign => {
                let target = self.get_coord(&mut r);
                Packet::Assign(Assign { buoy: node, target, hold_radius_m: r.get_u8() })
            }
            PacketKind::AckAssign => {
                let accepted = r.get_u8() != 0;
                Packet::AckAssign(AckAssign { sender: node, accepted, position: self.get_coord(&mut r) })
            }
            PacketKind::Status => {
                let position = self.get_coord(&mut r);
                Packet::Status(Status {
                    sender: node,
                    position,
                    dist_to_target_cm: r.get_u16_le(),
                    battery_dv: r.get_u8(),
                })
            }
            PacketKind::Ping => Packet::Ping(Ping { sender: node, timestamp_ms: r.get_u32_le() }),
            PacketKind::RcStart => Packet::RcStart { sender: node },
            PacketKind::RcStop => Packet::RcStop { sender: node },
        };
        Ok(packet)
    }

    fn get_coord(&self, r: &mut &[u8]) -> LatLon {
        match self.scheme {
            ChecksumScheme::Crc16 => LatLon::new(r.get_f32_le() as f64, r.get_f32_le() as f64),
            ChecksumScheme::LegacyXor => LatLon::new(r.get_f64_le(), r.get_f64_le()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::crc16;

    fn samples() -> Vec<Packet> {
        vec![
            Packet::Assign(Assign {
                buoy: Identifier::MarkB,
                target: LatLon::new(45.0, -71.0),
                hold_radius_m: 3,
            }),
            Packet::AckAssign(AckAssign {
                sender: Identifier::Windward,
                accepted: true,
                position: LatLon::new(44.5, -70.25),
            }),
            Packet::Status(Status {
                sender: Identifier::Leeward,
                position: LatLon::new(-33.875, 151.125),
                dist_to_target_cm: 412,
                battery_dv: 126,
            }),
            Packet::Ping(Ping { sender: Identifier::Coordinator, timestamp_ms: 0xDEAD_BEEF }),
            Packet::RcStart { sender: Identifier::RemoteControl },
            Packet::RcStop { sender: Identifier::RemoteControl },
        ]
    }

    #[test]
    fn current_frame_sizes() {
        let c = PacketCodec::new(ChecksumScheme::Crc16);
        assert_eq!(c.frame_len(PacketKind::Assign), 13);
        assert_eq!(c.frame_len(PacketKind::AckAssign), 13);
        assert_eq!(c.frame_len(PacketKind::Status), 15);
        assert_eq!(c.frame_len(PacketKind::Ping), 8);
        assert_eq!(c.frame_len(PacketKind::RcStart), 4);
        assert_eq!(c.frame_len(PacketKind::RcStop), 4);
    }

    #[test]
    fn legacy_frame_sizes() {
        let c = PacketCodec::new(ChecksumScheme::LegacyXor);
        assert_eq!(c.frame_len(PacketKind::Assign), 22);
        assert_eq!(c.frame_len(PacketKind::AckAssign), 22);
        assert_eq!(c.frame_len(PacketKind::Status), 24);
        assert_eq!(c.frame_len(PacketKind::Ping), 9);
        assert_eq!(c.frame_len(PacketKind::RcStop), 5);
    }

    #[test]
    fn assign_wire_layout() {
        let mut c = PacketCodec::new(ChecksumScheme::Crc16);
        let frame = c.encode(&samples()[0]);
        assert_eq!(
            &frame[..11],
            &[0xA5, 0x02, 0x00, 0x00, 0x34, 0x42, 0x00, 0x00, 0x8E, 0xC2, 0x03]
        );
        assert_eq!(&frame[11..], &crc16(&frame[..11]).to_le_bytes());
    }

    #[test]
    fn crc_round_trip_reproduces_packets() {
        let mut c = PacketCodec::new(ChecksumScheme::Crc16);
        for p in samples() {
            let frame = c.encode(&p);
            assert_eq!(frame.len(), c.frame_len(p.kind()));
            assert_eq!(c.decode(&frame), Ok(p));
            assert_eq!(c.decode_as(&frame, p.kind()), Ok(p));
        }
    }

    #[test]
    fn legacy_round_trip_keeps_double_precision() {
        let mut c = PacketCodec::new(ChecksumScheme::LegacyXor);
        let p = Packet::Assign(Assign {
            buoy: Identifier::MarkA,
            target: LatLon::new(45.123456789, -71.987654321),
            hold_radius_m: 5,
        });
        let frame = c.encode(&p);
        assert_eq!(c.decode(&frame), Ok(p));
        for p in samples() {
            let frame = c.encode(&p);
            assert_eq!(c.decode(&frame), Ok(p));
        }
    }

    #[test]
    fn legacy_sequence_advances() {
        let mut c = PacketCodec::new(ChecksumScheme::LegacyXor);
        let p = Packet::RcStart { sender: Identifier::RemoteControl };
        let a = c.encode(&p);
        let b = c.encode(&p);
        assert_eq!(u16::from_le_bytes([a[2], a[3]]), 1);
        assert_eq!(u16::from_le_bytes([b[2], b[3]]), 2);
    }

    #[test]
    fn any_single_bit_flip_fails_checksum() {
        for scheme in [ChecksumScheme::Crc16, ChecksumScheme::LegacyXor] {
            let mut c = PacketCodec::new(scheme);
            for p in samples() {
                let frame = c.encode(&p);
                // Byte 0 is the tag; flipping it changes the kind instead.
                for byte in 1..frame.len() {
                    for bit in 0..8 {
                        let mut bad = frame.clone();
                        bad[byte] ^= 1 << bit;
                        assert_eq!(
                            c.decode_as(&bad, p.kind()),
                            Err(DecodeError::Checksum),
                            "{scheme:?} {:?} byte {byte} bit {bit}",
                            p.kind()
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn truncated_frames_are_length_errors() {
        let mut c = PacketCodec::new(ChecksumScheme::Crc16);
        let frame = c.encode(&samples()[2]);
        assert_eq!(
            c.decode(&frame[..14]),
            Err(DecodeError::Length { expected: 15, actual: 14 })
        );
        assert!(matches!(c.decode(&[]), Err(DecodeError::Length { actual: 0, .. })));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut c = PacketCodec::new(ChecksumScheme::Crc16);
        let p = samples()[3];
        let mut frame = c.encode(&p);
        frame.extend_from_slice(&[0xEE, 0xEE]);
        assert_eq!(c.decode(&frame), Ok(p));
    }

    #[test]
    fn unknown_tags_and_hint_mismatch() {
        let mut c = PacketCodec::new(ChecksumScheme::Crc16);
        assert_eq!(c.decode(&[0x01, 0, 0, 0]), Err(DecodeError::UnknownKind(0x01)));
        let ping = c.encode(&samples()[3]);
        assert_eq!(c.decode_as(&ping, PacketKind::RcStart), Err(DecodeError::UnknownKind(0x55)));
    }

    #[test]
    fn unknown_identifier_is_dropped() {
        let mut body = vec![0xB1, 0x09];
        ChecksumScheme::Crc16.seal(&body.clone(), &mut body);
        let c = PacketCodec::new(ChecksumScheme::Crc16);
        assert_eq!(c.decode(&body), Err(DecodeError::UnknownIdentifier(9)));
    }

    #[test]
    fn schemes_do_not_cross_decode() {
        let mut crc = PacketCodec::new(ChecksumScheme::Crc16);
        let xor = PacketCodec::new(ChecksumScheme::LegacyXor);
        let frame = crc.encode(&samples()[0]);
        assert!(xor.decode(&frame).is_err());
    }

    mod props {
        use proptest::prelude::*;

        use super::*;

        fn id_strategy() -> impl Strategy<Value = Identifier> {
            prop_oneof![
                Just(Identifier::Coordinator),
                Just(Identifier::MarkA),
                Just(Identifier::MarkB),
                Just(Identifier::Windward),
                Just(Identifier::Leeward),
                Just(Identifier::RemoteControl),
            ]
        }

        /// Current frames carry `f32` coordinates, so only those survive a
        /// round trip exactly.
        fn coord_strategy(scheme: ChecksumScheme) -> BoxedStrategy<LatLon> {
            match scheme {
                ChecksumScheme::Crc16 => (-90.0f32..=90.0, -180.0f32..=180.0)
                    .prop_map(|(lat, lon)| LatLon::new(lat as f64, lon as f64))
                    .boxed(),
                ChecksumScheme::LegacyXor => (-90.0f64..=90.0, -180.0f64..=180.0)
                    .prop_map(|(lat, lon)| LatLon::new(lat, lon))
                    .boxed(),
            }
        }

        fn packet_strategy(scheme: ChecksumScheme) -> impl Strategy<Value = Packet> {
            prop_oneof![
                (id_strategy(), coord_strategy(scheme), any::<u8>()).prop_map(|(buoy, target, hold_radius_m)| {
                    Packet::Assign(Assign { buoy, target, hold_radius_m })
                }),
                (id_strategy(), any::<bool>(), coord_strategy(scheme)).prop_map(|(sender, accepted, position)| {
                    Packet::AckAssign(AckAssign { sender, accepted, position })
                }),
                (id_strategy(), coord_strategy(scheme), any::<u16>(), any::<u8>()).prop_map(
                    |(sender, position, dist_to_target_cm, battery_dv)| {
                        Packet::Status(Status { sender, position, dist_to_target_cm, battery_dv })
                    }
                ),
                (id_strategy(), any::<u32>()).prop_map(|(sender, timestamp_ms)| {
                    Packet::Ping(Ping { sender, timestamp_ms })
                }),
                id_strategy().prop_map(|sender| Packet::RcStart { sender }),
                id_strategy().prop_map(|sender| Packet::RcStop { sender }),
            ]
        }

        fn scheme_and_packet() -> impl Strategy<Value = (ChecksumScheme, Packet)> {
            prop_oneof![Just(ChecksumScheme::Crc16), Just(ChecksumScheme::LegacyXor)]
                .prop_flat_map(|scheme| (Just(scheme), packet_strategy(scheme)))
        }

        proptest! {
            #[test]
            fn encode_decode_equivalence((scheme, packet) in scheme_and_packet()) {
                let mut c = PacketCodec::new(scheme);
                let frame = c.encode(&packet);
                prop_assert_eq!(frame.len(), c.frame_len(packet.kind()));
                prop_assert_eq!(c.decode(&frame), Ok(packet));
            }

            #[test]
            fn bit_flip_is_a_checksum_error(
                (scheme, packet) in scheme_and_packet(),
                pos in any::<prop::sample::Index>(),
                bit in 0u8..8,
            ) {
                let mut c = PacketCodec::new(scheme);
                let mut frame = c.encode(&packet);
                // Skip the tag byte; flipping it names a different kind.
                let byte = 1 + pos.index(frame.len() - 1);
                frame[byte] ^= 1 << bit;
                prop_assert_eq!(c.decode_as(&frame, packet.kind()), Err(DecodeError::Checksum));
            }
        }
    }
}
