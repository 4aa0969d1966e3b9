pub mod avoid;
pub mod course;
pub mod doctor;
pub mod geo;
pub mod gnss;
pub mod wind;
