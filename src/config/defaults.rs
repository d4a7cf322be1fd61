//! System-wide default constants.
//!
//! Centralises magic numbers shared across the supervisor. Grouped by
//! subsystem for easy discovery.

// ============================================================================
// Session Buffer
// ============================================================================

/// Hard cap on the session snapshot buffer; trimmed from the front.
pub const SESSION_BUFFER_CAP: usize = 100_000;

/// Maximum snapshots fed into the full-flight debrief window.
///
/// Larger sessions are downsampled with stride `ceil(n / 1800)`,
/// always keeping the final snapshot.
pub const DEBRIEF_MAX_SNAPSHOTS: usize = 1_800;

// ============================================================================
// Startup
// ============================================================================

/// Minimum snapshots required before session bootstrap runs.
pub const BOOTSTRAP_MIN_SNAPSHOTS: usize = 3;

// ============================================================================
// Field Elevation Learning
// ============================================================================

/// Groundspeed below which an on-ground elevation sample updates the
/// learned field elevation (kt).
pub const FIELD_ELEVATION_MAX_GS_KT: f64 = 25.0;

// ============================================================================
// Hazard Speech
// ============================================================================

/// Maximum spoken phrase length after normalization (chars).
pub const SPEECH_PHRASE_MAX_CHARS: usize = 180;

/// Maximum speech variants retained per hazard rule after a refresh.
pub const SPEECH_VARIANTS_PER_RULE: usize = 6;

// ============================================================================
// New-Flight Detection
// ============================================================================

/// Throttle above which an on-ground engine-on aircraft counts as active.
pub const NEW_FLIGHT_THROTTLE_RATIO: f64 = 0.22;

/// Groundspeed (m/s) above which ground movement counts as activity.
pub const NEW_FLIGHT_GROUNDSPEED_M_S: f64 = 3.0;

/// IAS (kt) above which ground movement counts as activity.
pub const NEW_FLIGHT_IAS_KT: f64 = 10.0;

/// Released-brake rolling start: brake below this ratio...
pub const NEW_FLIGHT_BRAKE_RELEASED_RATIO: f64 = 0.2;

/// ...with groundspeed (m/s) above this.
pub const NEW_FLIGHT_ROLLING_GS_M_S: f64 = 1.5;
