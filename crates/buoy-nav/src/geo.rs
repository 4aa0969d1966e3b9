use buoy_proto::LatLon;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in metres.
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial true bearing from `from` to `to`, 0..360 degrees.
pub fn bearing_deg(from: LatLon, to: LatLon) -> f64 {
    let (lat1, lat2) = (from.lat.to_radians(), to.lat.to_radians());
    let dlon = (to.lon - from.lon).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Fold an angle into (-180, 180].
pub fn wrap_180(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Point `north_m`/`east_m` metres away from `origin` on a local plane.
/// Good enough for the few hundred metres a course spans.
pub fn offset_m(origin: LatLon, north_m: f64, east_m: f64) -> LatLon {
    let dlat = (north_m / EARTH_RADIUS_M).to_degrees();
    let dlon = (east_m / (EARTH_RADIUS_M * origin.lat.to_radians().cos())).to_degrees();
    LatLon::new(origin.lat + dlat, origin.lon + dlon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_millidegree_of_latitude() {
        let a = LatLon::new(45.0, -71.0);
        let b = LatLon::new(45.001, -71.0);
        let d = haversine_m(a, b);
        assert!((d - 111.19).abs() < 0.1, "{d}");
    }

    #[test]
    fn offset_then_measure() {
        let a = LatLon::new(45.0, -71.0);
        let b = offset_m(a, 3.0, 4.0);
        assert!((haversine_m(a, b) - 5.0).abs() < 0.01);
    }

    #[test]
    fn cardinal_bearings() {
        let o = LatLon::new(45.0, -71.0);
        assert!((bearing_deg(o, offset_m(o, 100.0, 0.0)) - 0.0).abs() < 0.01);
        assert!((bearing_deg(o, offset_m(o, 0.0, 100.0)) - 90.0).abs() < 0.01);
        assert!((bearing_deg(o, offset_m(o, -100.0, 0.0)) - 180.0).abs() < 0.01);
        assert!((bearing_deg(o, offset_m(o, 0.0, -100.0)) - 270.0).abs() < 0.01);
    }

    #[test]
    fn wrap_folds_both_ways() {
        assert_eq!(wrap_180(190.0), -170.0);
        assert_eq!(wrap_180(-190.0), 170.0);
        assert_eq!(wrap_180(180.0), 180.0);
        assert_eq!(wrap_180(360.0), 0.0);
    }
}
