//! Flight snapshot - one immutable telemetry observation

use serde::{Deserialize, Serialize};

/// Meters-per-second to knots.
pub const M_S_TO_KT: f64 = 1.943_84;

/// Meters to feet.
pub const M_TO_FT: f64 = 3.280_84;

/// One tick of simulator telemetry.
///
/// Every field except the timestamp and the ground flag is optional: the
/// simulator publishes datarefs independently and a snapshot may be built
/// before all subscriptions have reported. Evaluators must short-circuit
/// on absent fields rather than substitute zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSnapshot {
    /// Wall-clock epoch seconds at snapshot construction. Monotonically
    /// non-decreasing within one producer.
    pub timestamp_sec: f64,

    // === Position ===
    pub latitude_deg: Option<f64>,
    pub longitude_deg: Option<f64>,
    /// MSL elevation (m)
    pub elevation_m: Option<f64>,

    // === Energy / attitude ===
    pub groundspeed_m_s: Option<f64>,
    pub indicated_airspeed_kt: Option<f64>,
    pub vertical_speed_fpm: Option<f64>,
    pub heading_true_deg: Option<f64>,
    pub magnetic_heading_deg: Option<f64>,
    pub roll_deg: Option<f64>,
    pub pitch_deg: Option<f64>,

    // === Controls ===
    /// Commanded throttle, clamped to [0, 1] at construction
    pub throttle_ratio: Option<f64>,
    pub flap_ratio: Option<f64>,
    /// Parking brake, clamped to [0, 1] at construction
    pub parking_brake_ratio: Option<f64>,

    // === Engines ===
    pub engine_running: Option<bool>,
    pub engine_rpm: Option<f64>,

    // === Radios ===
    pub com1_hz: Option<i64>,

    // === Discretes ===
    /// Authoritative ground-contact flag. The phase tracker never infers
    /// ground state from speed alone.
    pub on_ground: bool,
    pub stall_warning: bool,
}

impl Default for FlightSnapshot {
    fn default() -> Self {
        Self {
            timestamp_sec: 0.0,
            latitude_deg: None,
            longitude_deg: None,
            elevation_m: None,
            groundspeed_m_s: None,
            indicated_airspeed_kt: None,
            vertical_speed_fpm: None,
            heading_true_deg: None,
            magnetic_heading_deg: None,
            roll_deg: None,
            pitch_deg: None,
            throttle_ratio: None,
            flap_ratio: None,
            parking_brake_ratio: None,
            engine_running: None,
            engine_rpm: None,
            com1_hz: None,
            on_ground: false,
            stall_warning: false,
        }
    }
}

impl FlightSnapshot {
    /// Altitude above ground level (ft), given a learned field elevation.
    ///
    /// Undefined when either elevation is unknown.
    pub fn agl_ft(&self, field_elevation_m: Option<f64>) -> Option<f64> {
        match (self.elevation_m, field_elevation_m) {
            (Some(elev), Some(field)) => Some((elev - field) * M_TO_FT),
            _ => None,
        }
    }

    /// Groundspeed in knots.
    pub fn groundspeed_kt(&self) -> Option<f64> {
        self.groundspeed_m_s.map(|v| v * M_S_TO_KT)
    }

    /// Groundspeed in knots, treating absent as zero.
    pub fn groundspeed_kt_or_zero(&self) -> f64 {
        self.groundspeed_kt().unwrap_or(0.0)
    }

    /// Indicated airspeed in knots, treating absent as zero.
    pub fn ias_kt_or_zero(&self) -> f64 {
        self.indicated_airspeed_kt.unwrap_or(0.0)
    }

    /// Vertical speed in feet per minute, treating absent as zero.
    pub fn vs_fpm_or_zero(&self) -> f64 {
        self.vertical_speed_fpm.unwrap_or(0.0)
    }

    /// Absolute bank angle in degrees, treating absent as zero.
    pub fn bank_abs_deg(&self) -> f64 {
        self.roll_deg.map_or(0.0, f64::abs)
    }
}
