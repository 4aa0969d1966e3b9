use buoy_proto::{Identifier, LatLon};
use serde::{Deserialize, Serialize};

/// One station on the racecourse as handed out by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CourseMark {
    pub id: Identifier,
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_hold_radius_m")]
    pub hold_radius_m: u8,
}

pub fn default_hold_radius_m() -> u8 { 3 }

impl CourseMark {
    pub fn target(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Course {
    #[serde(default)]
    pub marks: Vec<CourseMark>,
}

impl Course {
    pub fn mark(&self, id: Identifier) -> Option<&CourseMark> {
        self.marks.iter().find(|m| m.id == id)
    }
}
