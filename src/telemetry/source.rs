//! UDP telemetry client with reconnection-by-resubscription resilience
//!
//! Subscribes every dataref in [`protocol::DATAREF_TABLE`] at the
//! configured rate, maintains a bounded rolling snapshot buffer, and
//! re-sends the subscription set every five seconds so a simulator
//! restart resumes the stream without supervisor involvement.

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{self, DATAREF_TABLE};
use super::{TelemetryError, TelemetrySource};
use crate::config::TelemetryConfig;
use crate::types::FlightSnapshot;

/// Interval between subscription refreshes (survives simulator restarts).
const RESUBSCRIBE_INTERVAL: Duration = Duration::from_secs(5);

/// Receive buffer size; RREF datagrams for 18 datarefs are well under this.
const RECV_BUF_LEN: usize = 4096;

/// Minimum snapshot retention regardless of review window (seconds).
const MIN_RETENTION_SEC: f64 = 30.0;

/// Connection health counters, mirrored into the telemetry journal.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SourceStats {
    pub datagrams_received: u64,
    pub datagrams_dropped: u64,
    pub snapshots_built: u64,
    pub resubscribe_rounds: u64,
}

/// State shared between the receive task and supervisor reads.
struct Shared {
    /// Latest raw value per field key, merged across datagrams.
    values: RwLock<HashMap<&'static str, f64>>,
    latest: RwLock<Option<FlightSnapshot>>,
    snapshots: RwLock<VecDeque<FlightSnapshot>>,
    capacity: usize,
    datagrams_received: AtomicU64,
    datagrams_dropped: AtomicU64,
    snapshots_built: AtomicU64,
    resubscribe_rounds: AtomicU64,
}

impl Shared {
    fn store_snapshot(&self, snapshot: FlightSnapshot) {
        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(snapshot.clone());
        }
        if let Ok(mut deque) = self.snapshots.write() {
            if deque.len() >= self.capacity {
                deque.pop_front();
            }
            deque.push_back(snapshot);
        }
        self.snapshots_built.fetch_add(1, Ordering::Relaxed);
    }
}

/// Binary UDP client for the simulator's dataref interface.
pub struct XPlaneUdpSource {
    config: TelemetryConfig,
    shared: Arc<Shared>,
    socket: Option<Arc<UdpSocket>>,
    target: Option<SocketAddr>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    running: bool,
}

impl XPlaneUdpSource {
    /// Buffer capacity follows the review cadence: keep at least 30 s,
    /// and enough for four review windows, with 2x headroom on rate.
    pub fn new(config: TelemetryConfig, review_window_sec: f64) -> Self {
        let retention_sec = MIN_RETENTION_SEC.max(4.0 * review_window_sec);
        let capacity = (retention_sec * f64::from(config.rref_hz.max(1)) * 2.0) as usize;

        Self {
            config,
            shared: Arc::new(Shared {
                values: RwLock::new(HashMap::new()),
                latest: RwLock::new(None),
                snapshots: RwLock::new(VecDeque::with_capacity(capacity)),
                capacity,
                datagrams_received: AtomicU64::new(0),
                datagrams_dropped: AtomicU64::new(0),
                snapshots_built: AtomicU64::new(0),
                resubscribe_rounds: AtomicU64::new(0),
            }),
            socket: None,
            target: None,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            running: false,
        }
    }

    /// Connection health statistics.
    pub fn stats(&self) -> SourceStats {
        SourceStats {
            datagrams_received: self.shared.datagrams_received.load(Ordering::Relaxed),
            datagrams_dropped: self.shared.datagrams_dropped.load(Ordering::Relaxed),
            snapshots_built: self.shared.snapshots_built.load(Ordering::Relaxed),
            resubscribe_rounds: self.shared.resubscribe_rounds.load(Ordering::Relaxed),
        }
    }

    async fn resolve_endpoint(&self) -> Result<SocketAddr, TelemetryError> {
        if self.should_attempt_discovery() {
            let group = self.config.beacon_multicast_group.clone();
            let port = self.config.beacon_port;
            let timeout = self.config.beacon_timeout_sec;

            let discovered = tokio::task::spawn_blocking(move || {
                discover_via_beacon(&group, port, timeout)
            })
            .await
            .ok()
            .flatten();

            if let Some((host, port)) = discovered {
                info!(host = %host, port = port, "Simulator endpoint discovered via beacon");
                return lookup(&host, port).await;
            }
            debug!("Beacon discovery timed out, falling back to configured endpoint");
        }

        let host = self.config.host.trim();
        if host.is_empty() || is_discovery_keyword(host) {
            return Err(TelemetryError::EndpointUnresolved(
                "no beacon received and no explicit simulator host configured".to_string(),
            ));
        }
        if self.config.port == 0 {
            return Err(TelemetryError::EndpointUnresolved(
                "explicit simulator host configured without a valid UDP port".to_string(),
            ));
        }
        lookup(host, self.config.port).await
    }

    /// Discovery runs only when enabled and no explicit host is set;
    /// an explicit host always wins.
    fn should_attempt_discovery(&self) -> bool {
        if !self.config.discovery_enabled {
            return false;
        }
        let host = self.config.host.trim();
        host.is_empty() || is_discovery_keyword(host)
    }
}

#[async_trait]
impl TelemetrySource for XPlaneUdpSource {
    async fn start(&mut self) -> Result<(), TelemetryError> {
        if self.running {
            return Ok(());
        }

        let target = self.resolve_endpoint().await?;
        let socket = Arc::new(bind_udp(self.config.local_port)?);
        info!(
            target = %target,
            local_port = self.config.local_port,
            rate_hz = self.config.rref_hz,
            "Telemetry subscriptions starting"
        );

        subscribe_all(&socket, target, self.config.rref_hz as i32).await?;

        self.cancel = CancellationToken::new();
        let rx_cancel = self.cancel.clone();
        let rx_socket = Arc::clone(&socket);
        let rx_shared = Arc::clone(&self.shared);
        self.tasks.push(tokio::spawn(async move {
            receive_loop(rx_socket, rx_shared, rx_cancel).await;
        }));

        let sub_cancel = self.cancel.clone();
        let sub_socket = Arc::clone(&socket);
        let sub_shared = Arc::clone(&self.shared);
        let rate = self.config.rref_hz as i32;
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(RESUBSCRIBE_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = sub_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = subscribe_all(&sub_socket, target, rate).await {
                            warn!(error = %e, "Subscription refresh failed");
                        } else {
                            sub_shared.resubscribe_rounds.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }));

        self.socket = Some(socket);
        self.target = Some(target);
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        // Best-effort cancellation; a dead simulator should not block stop.
        if let (Some(socket), Some(target)) = (&self.socket, self.target) {
            if let Err(e) = subscribe_all(socket, target, 0).await {
                debug!(error = %e, "Zero-rate cancellation failed");
            }
        }

        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.socket = None;
        self.target = None;
        info!("Telemetry source stopped");
    }

    fn latest(&self) -> Option<FlightSnapshot> {
        self.shared.latest.read().ok().and_then(|v| v.clone())
    }

    fn window(&self, seconds: f64) -> Vec<FlightSnapshot> {
        if seconds <= 0.0 {
            return Vec::new();
        }
        let cutoff = epoch_now() - seconds;
        self.shared
            .snapshots
            .read()
            .map(|deque| {
                deque
                    .iter()
                    .filter(|s| s.timestamp_sec >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>, cancel: CancellationToken) {
    let mut buf = [0u8; RECV_BUF_LEN];
    loop {
        let len = tokio::select! {
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok((len, _addr)) => len,
                Err(e) => {
                    warn!(error = %e, "Telemetry receive error");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    continue;
                }
            },
        };

        shared.datagrams_received.fetch_add(1, Ordering::Relaxed);
        let records = protocol::parse_rref_datagram(&buf[..len]);
        if records.is_empty() {
            shared.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let snapshot = {
            let Ok(mut values) = shared.values.write() else {
                continue;
            };
            for (index, value) in records {
                if let Some(key) = protocol::key_for_index(index) {
                    values.insert(key, f64::from(value));
                }
            }
            build_snapshot(&values, epoch_now())
        };
        shared.store_snapshot(snapshot);
    }
}

async fn subscribe_all(
    socket: &UdpSocket,
    target: SocketAddr,
    freq_hz: i32,
) -> Result<(), TelemetryError> {
    for (idx, (_, dataref)) in DATAREF_TABLE.iter().enumerate() {
        let frame = protocol::build_rref_request(freq_hz, (idx + 1) as i32, dataref);
        socket.send_to(&frame, target).await?;
    }
    Ok(())
}

/// Materialize a snapshot from the current value map.
///
/// Booleans collapse a float >= 0.5 to true; ratio controls are clamped
/// to [0, 1]; `com1_hz` rounds to the nearest integer.
pub(crate) fn build_snapshot(
    values: &HashMap<&'static str, f64>,
    timestamp_sec: f64,
) -> FlightSnapshot {
    let field = |key: &str| values.get(key).copied();
    let ratio = |key: &str| field(key).map(|v| v.clamp(0.0, 1.0));
    let flag = |key: &str| field(key).unwrap_or(0.0) >= 0.5;

    FlightSnapshot {
        timestamp_sec,
        latitude_deg: field("latitude_deg"),
        longitude_deg: field("longitude_deg"),
        elevation_m: field("elevation_m"),
        groundspeed_m_s: field("groundspeed_m_s"),
        indicated_airspeed_kt: field("indicated_airspeed_kt"),
        vertical_speed_fpm: field("vertical_speed_fpm"),
        heading_true_deg: field("heading_true_deg"),
        magnetic_heading_deg: field("magnetic_heading_deg"),
        roll_deg: field("roll_deg"),
        pitch_deg: field("pitch_deg"),
        throttle_ratio: ratio("throttle_ratio"),
        flap_ratio: field("flap_ratio"),
        parking_brake_ratio: ratio("parking_brake_ratio"),
        engine_running: field("engine_running").map(|v| v >= 0.5),
        engine_rpm: field("engine_rpm"),
        com1_hz: field("com1_hz").map(|v| v.round() as i64),
        on_ground: flag("on_ground"),
        stall_warning: flag("stall_warning"),
    }
}

/// Bind the local UDP socket with SO_REUSEADDR so a restarted daemon can
/// reclaim the port while the old socket drains.
fn bind_udp(local_port: u16) -> Result<UdpSocket, TelemetryError> {
    let make = || -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, local_port));
        socket.bind(&addr.into())?;
        UdpSocket::from_std(socket.into())
    };
    make().map_err(|source| TelemetryError::Bind {
        port: local_port,
        source,
    })
}

async fn lookup(host: &str, port: u16) -> Result<SocketAddr, TelemetryError> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TelemetryError::EndpointUnresolved(format!("{host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| {
            TelemetryError::EndpointUnresolved(format!("{host}:{port}: no addresses"))
        })
}

fn is_discovery_keyword(host: &str) -> bool {
    matches!(host.to_ascii_lowercase().as_str(), "auto" | "discover")
}

/// Listen for one discovery beacon on the multicast group, blocking up to
/// `timeout_sec`. Runs on the blocking pool.
fn discover_via_beacon(multicast_group: &str, beacon_port: u16, timeout_sec: f64) -> Option<(String, u16)> {
    let group: Ipv4Addr = multicast_group.trim().parse().ok()?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).ok()?;
    socket.set_reuse_address(true).ok()?;
    #[cfg(unix)]
    {
        let _ = socket.set_reuse_port(true);
    }
    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, beacon_port));
    socket.bind(&bind_addr.into()).ok()?;
    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .ok()?;

    let socket: std::net::UdpSocket = socket.into();
    let deadline = Instant::now() + Duration::from_secs_f64(timeout_sec.max(0.1));
    let mut buf = [0u8; 2048];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        socket.set_read_timeout(Some(remaining)).ok()?;
        match socket.recv_from(&mut buf) {
            Ok((len, addr)) => {
                if let Some(found) =
                    protocol::parse_beacon_datagram(&buf[..len], &addr.ip().to_string())
                {
                    return Some(found);
                }
            }
            Err(_) => return None,
        }
    }
}

fn epoch_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_build_collapses_booleans_and_clamps_ratios() {
        let mut values: HashMap<&'static str, f64> = HashMap::new();
        values.insert("on_ground", 1.0);
        values.insert("stall_warning", 0.4);
        values.insert("engine_running", 0.9);
        values.insert("throttle_ratio", 1.4);
        values.insert("parking_brake_ratio", -0.2);
        values.insert("indicated_airspeed_kt", 63.5);
        values.insert("com1_hz", 118_700.6);

        let snap = build_snapshot(&values, 100.0);
        assert!(snap.on_ground);
        assert!(!snap.stall_warning);
        assert_eq!(snap.engine_running, Some(true));
        assert_eq!(snap.throttle_ratio, Some(1.0));
        assert_eq!(snap.parking_brake_ratio, Some(0.0));
        assert_eq!(snap.indicated_airspeed_kt, Some(63.5));
        assert_eq!(snap.com1_hz, Some(118_701));
    }

    #[test]
    fn snapshot_build_leaves_unseen_fields_absent() {
        let values: HashMap<&'static str, f64> = HashMap::new();
        let snap = build_snapshot(&values, 5.0);
        assert!(!snap.on_ground);
        assert!(snap.indicated_airspeed_kt.is_none());
        assert!(snap.engine_running.is_none());
        assert_eq!(snap.timestamp_sec, 5.0);
    }

    #[tokio::test]
    async fn window_filters_by_cutoff() {
        let config = TelemetryConfig::default();
        let source = XPlaneUdpSource::new(config, 30.0);

        let now = epoch_now();
        for age in [200.0, 20.0, 1.0] {
            source.shared.store_snapshot(FlightSnapshot {
                timestamp_sec: now - age,
                ..FlightSnapshot::default()
            });
        }

        assert_eq!(source.window(60.0).len(), 2);
        assert!(source.window(0.0).is_empty());
        assert!(source.latest().is_some());
    }
}
