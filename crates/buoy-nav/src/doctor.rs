use anyhow::Result;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::avoid::AvoidanceConfig;
use crate::course::Course;
use crate::geo::haversine_m;

pub fn check_fix_requirement(min_fix_mode: u8) -> Result<()> {
    anyhow::ensure!((2..=3).contains(&min_fix_mode), "station.min_fix_mode should be 2 or 3");
    Ok(())
}

pub fn check_course(course: &Course, max_spread_m: f64) -> Result<()> {
    anyhow::ensure!(!course.marks.is_empty(), "coordinator.course.marks is empty");
    let mut seen = BTreeSet::new();
    for m in &course.marks {
        anyhow::ensure!(m.id.is_mark(), "course entry {} is not a mark id", m.id);
        anyhow::ensure!(seen.insert(m.id), "mark {} listed twice", m.id);
        anyhow::ensure!(m.lat.abs() <= 90.0 && m.lon.abs() <= 180.0, "mark {} coordinates invalid", m.id);
        anyhow::ensure!(m.hold_radius_m > 0, "mark {} hold radius must be > 0", m.id);
    }
    for (i, a) in course.marks.iter().enumerate() {
        for b in &course.marks[i + 1..] {
            let d = haversine_m(a.target(), b.target());
            anyhow::ensure!(d <= max_spread_m, "marks {} and {} are {}m apart", a.id, b.id, d as i64);
        }
    }
    Ok(())
}

pub fn check_wind(window: Duration, threshold_deg: f64) -> Result<()> {
    anyhow::ensure!(window >= Duration::from_secs(5), "station.wind_window_s too short");
    anyhow::ensure!(threshold_deg > 0.0 && threshold_deg < 90.0, "station.wind_threshold_deg out of range");
    Ok(())
}

pub fn check_avoidance(cfg: &AvoidanceConfig) -> Result<()> {
    anyhow::ensure!(cfg.emergency_cm < cfg.avoid_cm, "avoidance.emergency_cm must be below avoid_cm");
    Ok(())
}
