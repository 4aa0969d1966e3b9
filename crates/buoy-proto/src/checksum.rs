//! Frame integrity checks.
//!
//! Current frames end in a CRC16 (poly 0x1021, init 0xFFFF, MSB-first, no
//! reflection, no final XOR) stored little-endian. Legacy frames end in a
//! single byte holding the XOR of every preceding byte.

use crc::{Crc, CRC_16_IBM_3740};
use serde::{Deserialize, Serialize};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Which trailer a deployment uses. Fixed for the whole fleet, never
/// negotiated per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChecksumScheme {
    #[default]
    Crc16,
    LegacyXor,
}

impl ChecksumScheme {
    /// Bytes taken by the trailer.
    pub fn trailer_len(self) -> usize {
        match self {
            ChecksumScheme::Crc16 => 2,
            ChecksumScheme::LegacyXor => 1,
        }
    }

    /// Append the trailer for `body` to `out`.
    pub fn seal(self, body: &[u8], out: &mut Vec<u8>) {
        match self {
            ChecksumScheme::Crc16 => out.extend_from_slice(&crc16(body).to_le_bytes()),
            ChecksumScheme::LegacyXor => out.push(xor8(body)),
        }
    }

    /// Check a complete frame (body plus trailer).
    pub fn verify(self, frame: &[u8]) -> bool {
        let n = self.trailer_len();
        if frame.len() <= n {
            return false;
        }
        let (body, trailer) = frame.split_at(frame.len() - n);
        match self {
            ChecksumScheme::Crc16 => {
                let stored = u16::from_le_bytes([trailer[0], trailer[1]]);
                crc16(body) == stored
            }
            ChecksumScheme::LegacyXor => xor8(body) == trailer[0],
        }
    }
}

#[inline]
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

#[inline]
#[must_use]
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc ^ b)
}
