//! Course radio protocol for the marker-buoy fleet.
//!
//! Six fixed-size message kinds travel between the coordinator, the course
//! marks and the remote-control handhelds. Every frame starts with a kind
//! tag and ends in an integrity trailer; a frame that fails its length or
//! checksum check never reaches application code.
//!
//! ```
//! use buoy_proto::{ChecksumScheme, Identifier, Packet, PacketCodec, Ping};
//!
//! let mut codec = PacketCodec::new(ChecksumScheme::Crc16);
//! let ping = Packet::Ping(Ping { sender: Identifier::Coordinator, timestamp_ms: 1200 });
//! let frame = codec.encode(&ping);
//! assert_eq!(frame.len(), 8);
//! assert_eq!(codec.decode(&frame), Ok(ping));
//! ```

pub mod checksum;
pub mod codec;
pub mod id;
pub mod packet;

pub use checksum::{crc16, xor8, ChecksumScheme};
pub use codec::{DecodeError, PacketCodec};
pub use id::Identifier;
pub use packet::{AckAssign, Assign, ErrorFlags, LatLon, Packet, PacketKind, Ping, Status};
