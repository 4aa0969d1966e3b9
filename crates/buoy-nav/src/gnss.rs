use anyhow::{Context, Result};
use buoy_proto::LatLon;
use time::OffsetDateTime;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

/// GSA fix mode for a full 3-D solution.
pub const FIX_3D: u8 = 3;
pub const FIX_2D: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixQuality {
    /// 0 or 1 = no fix, 2 = 2-D, 3 = 3-D.
    pub mode: u8,
    pub sats: u8,
    pub hdop: f32,
}

impl FixQuality {
    pub fn has_fix(&self) -> bool {
        self.mode >= FIX_2D
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coord: LatLon,
    pub quality: FixQuality,
    pub ts: OffsetDateTime,
}

pub enum GnssSource {
    Serial(BufReader<SerialStream>),
    File(BufReader<File>),
}

impl GnssSource {
    pub fn serial(dev: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(dev, baud).open_native_async()
            .with_context(|| format!("open serial {}", dev))?;
        Ok(Self::Serial(BufReader::new(port)))
    }

    pub fn file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path).with_context(|| format!("open nmea file {}", path))?;
        let f = File::from_std(f);
        Ok(Self::File(BufReader::new(f)))
    }

    /// Next position from the stream. A file source replays slowly once it
    /// hits EOF instead of spinning.
    pub async fn next_fix(&mut self, parser: &mut NmeaParser) -> Result<Position> {
        let mut line = String::new();
        loop {
            line.clear();
            match self {
                GnssSource::Serial(r) => { r.read_line(&mut line).await?; }
                GnssSource::File(r) => {
                    let n = r.read_line(&mut line).await?;
                    if n == 0 {
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                        continue;
                    }
                }
            }
            if let Some(fix) = parser.feed(line.trim()) {
                return Ok(fix);
            }
        }
    }
}

/// Minimal NMEA reader:
/// - GSA: fix mode (1/2/3)
/// - GGA: lat/lon, satellites, hdop; emits a [`Position`]
#[derive(Debug, Default)]
pub struct NmeaParser {
    last_mode: Option<u8>,
}

impl NmeaParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, s: &str) -> Option<Position> {
        let s = s.split('*').next().unwrap_or(s);
        let parts: Vec<&str> = s.split(',').collect();
        let talker = parts.first()?;

        if talker.ends_with("GSA") {
            if let Some(mode) = parts.get(2).and_then(|m| m.parse::<u8>().ok()) {
                self.last_mode = Some(mode);
            }
            return None;
        }

        if talker.ends_with("GGA") && parts.len() > 8 {
            let gga_quality: u8 = parts[6].parse().unwrap_or(0);
            let sats: u8 = parts[7].parse().unwrap_or(0);
            let hdop: f32 = parts[8].parse().unwrap_or(99.9);
            let (Some(lat), Some(lon)) = (parse_deg_min(parts[2], parts[3]), parse_deg_min(parts[4], parts[5])) else {
                debug!(sentence = s, "GGA without coordinates");
                return None;
            };
            // GGA alone says fix/no fix; without a GSA we can only claim 2-D.
            let mode = if gga_quality == 0 { 0 } else { self.last_mode.unwrap_or(FIX_2D) };
            return Some(Position {
                coord: LatLon::new(lat, lon),
                quality: FixQuality { mode, sats, hdop },
                ts: OffsetDateTime::now_utc(),
            });
        }

        None
    }
}

fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    if v.is_empty() { return None; }
    // lat: ddmm.mmmm, lon: dddmm.mmmm
    let dot = v.find('.')?;
    let deg_len = if dot > 4 { 3 } else { 2 };
    let deg: f64 = v.get(..deg_len)?.parse().ok()?;
    let min: f64 = v.get(deg_len..)?.parse().ok()?;
    let mut out = deg + (min / 60.0);
    if hemi == "S" || hemi == "W" { out = -out; }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GSA_3D: &str = "$GPGSA,A,3,04,05,09,12,24,,,,,,,,2.5,1.3,2.1*39";
    const GGA: &str = "$GPGGA,123519,4500.000,N,07100.000,W,1,08,0.9,545.4,M,46.9,M,,*47";

    #[test]
    fn gga_after_gsa_reports_3d() {
        let mut p = NmeaParser::new();
        assert!(p.feed(GSA_3D).is_none());
        let fix = p.feed(GGA).expect("position");
        assert!((fix.coord.lat - 45.0).abs() < 1e-9);
        assert!((fix.coord.lon + 71.0).abs() < 1e-9);
        assert_eq!(fix.quality.mode, FIX_3D);
        assert_eq!(fix.quality.sats, 8);
        assert!((fix.quality.hdop - 0.9).abs() < 1e-6);
    }

    #[test]
    fn gga_without_gsa_is_2d() {
        let mut p = NmeaParser::new();
        let fix = p.feed(GGA).expect("position");
        assert_eq!(fix.quality.mode, FIX_2D);
        assert!(fix.quality.has_fix());
    }

    #[test]
    fn invalid_gga_has_no_fix() {
        let mut p = NmeaParser::new();
        p.feed(GSA_3D);
        let fix = p.feed("$GNGGA,123519,4500.000,N,07100.000,W,0,00,99.9,,M,,M,,").expect("position");
        assert_eq!(fix.quality.mode, 0);
        assert!(!fix.quality.has_fix());
    }

    #[test]
    fn empty_coordinates_are_skipped() {
        let mut p = NmeaParser::new();
        assert!(p.feed("$GPGGA,123519,,,,,0,00,99.9,,M,,M,,").is_none());
        assert!(p.feed("$GPRMC,123519,A,4807.038,N,01131.000,E").is_none());
    }

    #[test]
    fn southern_and_eastern_hemispheres() {
        assert_eq!(parse_deg_min("3352.500", "S"), Some(-(33.0 + 52.5 / 60.0)));
        assert_eq!(parse_deg_min("15107.500", "E"), Some(151.0 + 7.5 / 60.0));
        assert_eq!(parse_deg_min("", "N"), None);
    }
}
