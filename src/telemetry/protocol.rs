//! X-Plane UDP dataref protocol codec
//!
//! Two frame families, both little-endian:
//!
//! Subscription request (413 bytes):
//! `[5-byte header "RREF\0"][i32 freq_hz][i32 index][400-byte null-padded dataref name]`
//! A zero frequency cancels the subscription for that index.
//!
//! Response: prefix `"RREF,"` followed by packed 8-byte records
//! `[i32 index][f32 value]`. Indices map back to field keys through the
//! subscription table below.
//!
//! Discovery beacon: prefix `"BECN\0"`, then
//! `byte major, byte minor, i32 host_id, i32 version, i32 role, u16 port, name...`
//! so the advertised port sits at body offset 14; the sender IP is the host.

/// Response datagram prefix.
pub const RREF_RESPONSE_PREFIX: &[u8] = b"RREF,";

/// Subscription request header.
pub const RREF_REQUEST_HEADER: &[u8] = b"RREF\0";

/// Discovery beacon prefix.
pub const BEACON_PREFIX: &[u8] = b"BECN\0";

/// Total size of a subscription request frame.
pub const RREF_REQUEST_LEN: usize = 5 + 4 + 4 + 400;

/// Size of one `[i32 index][f32 value]` response record.
const RREF_RECORD_LEN: usize = 8;

/// Offset of the u16 port within the beacon body.
const BEACON_PORT_OFFSET: usize = 14;

/// The fixed set of subscribed datarefs.
///
/// Subscription indices are assigned 1..=N in declaration order; the
/// receive path maps response indices back to these keys.
pub const DATAREF_TABLE: [(&str, &str); 18] = [
    ("latitude_deg", "sim/flightmodel/position/latitude"),
    ("longitude_deg", "sim/flightmodel/position/longitude"),
    ("elevation_m", "sim/flightmodel/position/elevation"),
    ("groundspeed_m_s", "sim/flightmodel/position/groundspeed"),
    (
        "indicated_airspeed_kt",
        "sim/cockpit2/gauges/indicators/airspeed_kts_pilot",
    ),
    ("heading_true_deg", "sim/flightmodel/position/true_psi"),
    ("magnetic_heading_deg", "sim/flightmodel/position/mag_psi"),
    ("vertical_speed_fpm", "sim/flightmodel/position/vh_ind_fpm"),
    ("roll_deg", "sim/flightmodel/position/phi"),
    ("pitch_deg", "sim/flightmodel/position/theta"),
    (
        "throttle_ratio",
        "sim/cockpit2/engine/actuators/throttle_ratio_all",
    ),
    ("engine_running", "sim/flightmodel/engine/ENGN_running[0]"),
    (
        "engine_rpm",
        "sim/cockpit2/engine/indicators/engine_speed_rpm[0]",
    ),
    ("flap_ratio", "sim/flightmodel/controls/flaprqst"),
    (
        "parking_brake_ratio",
        "sim/cockpit2/controls/parking_brake_ratio",
    ),
    ("on_ground", "sim/flightmodel/failures/onground_any"),
    ("stall_warning", "sim/cockpit2/annunciators/stall_warning"),
    (
        "com1_hz",
        "sim/cockpit2/radios/actuators/com1_frequency_hz_833",
    ),
];

/// Field key for a response index, if it belongs to our subscription set.
pub fn key_for_index(index: i32) -> Option<&'static str> {
    if index < 1 {
        return None;
    }
    DATAREF_TABLE
        .get((index - 1) as usize)
        .map(|(key, _)| *key)
}

/// Build one 413-byte subscription request frame.
///
/// Dataref names longer than 399 bytes are truncated; the name field is
/// always null-terminated and null-padded to 400 bytes.
pub fn build_rref_request(freq_hz: i32, index: i32, dataref: &str) -> [u8; RREF_REQUEST_LEN] {
    let mut frame = [0u8; RREF_REQUEST_LEN];
    frame[..5].copy_from_slice(RREF_REQUEST_HEADER);
    frame[5..9].copy_from_slice(&freq_hz.to_le_bytes());
    frame[9..13].copy_from_slice(&index.to_le_bytes());

    let name = dataref.as_bytes();
    let len = name.len().min(399);
    frame[13..13 + len].copy_from_slice(&name[..len]);
    frame
}

/// Parse the fields back out of a subscription request frame.
///
/// Used by the loopback tests and the protocol round-trip property;
/// returns None on a short frame or wrong header.
pub fn parse_rref_request(frame: &[u8]) -> Option<(i32, i32, String)> {
    if frame.len() != RREF_REQUEST_LEN || &frame[..5] != RREF_REQUEST_HEADER {
        return None;
    }
    let freq_hz = i32::from_le_bytes([frame[5], frame[6], frame[7], frame[8]]);
    let index = i32::from_le_bytes([frame[9], frame[10], frame[11], frame[12]]);

    let name_field = &frame[13..];
    let end = name_field.iter().position(|&b| b == 0).unwrap_or(name_field.len());
    let name = String::from_utf8_lossy(&name_field[..end]).into_owned();
    Some((freq_hz, index, name))
}

/// Parse an RREF response datagram into `(index, value)` records.
///
/// Datagrams without the response prefix yield no records (drop policy);
/// a trailing partial record is ignored.
pub fn parse_rref_datagram(payload: &[u8]) -> Vec<(i32, f32)> {
    let Some(body) = payload.strip_prefix(RREF_RESPONSE_PREFIX) else {
        return Vec::new();
    };

    body.chunks_exact(RREF_RECORD_LEN)
        .map(|chunk| {
            let index = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let value = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            (index, value)
        })
        .collect()
}

/// Build an RREF response datagram (for tests and simulators).
pub fn build_rref_datagram(records: &[(i32, f32)]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(RREF_RESPONSE_PREFIX.len() + records.len() * RREF_RECORD_LEN);
    payload.extend_from_slice(RREF_RESPONSE_PREFIX);
    for &(index, value) in records {
        payload.extend_from_slice(&index.to_le_bytes());
        payload.extend_from_slice(&value.to_le_bytes());
    }
    payload
}

/// Extract the simulator endpoint from a discovery beacon.
///
/// Returns `(host, port)` where host is the datagram's sender IP. Returns
/// None on wrong prefix, short body, or a zero port.
pub fn parse_beacon_datagram(payload: &[u8], sender_ip: &str) -> Option<(String, u16)> {
    let body = payload.strip_prefix(BEACON_PREFIX)?;
    if body.len() < BEACON_PORT_OFFSET + 2 {
        return None;
    }
    let port = u16::from_le_bytes([body[BEACON_PORT_OFFSET], body[BEACON_PORT_OFFSET + 1]]);
    if port == 0 {
        return None;
    }
    let host = sender_ip.trim();
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}
