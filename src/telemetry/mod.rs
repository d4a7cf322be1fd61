//! Telemetry acquisition from the simulator's UDP dataref interface
//!
//! `protocol` holds the pure wire codec (RREF subscription frames, RREF
//! response records, BECN discovery beacons). `source` owns the socket,
//! the receive/re-subscribe tasks, and the rolling snapshot buffer.

pub mod protocol;
mod source;

pub use source::{SourceStats, XPlaneUdpSource};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::FlightSnapshot;

/// Telemetry source errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to bind local UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Simulator endpoint not resolved: {0}")]
    EndpointUnresolved(String),

    #[error("UDP send failed: {0}")]
    Send(#[from] std::io::Error),
}

/// Seam between the supervisor and the simulator link.
///
/// The production implementation is [`XPlaneUdpSource`]; tests substitute
/// a scripted source.
#[async_trait]
pub trait TelemetrySource: Send {
    /// Bind, resolve the simulator endpoint, subscribe, and start the
    /// receive and re-subscribe tasks.
    async fn start(&mut self) -> Result<(), TelemetryError>;

    /// Cancel subscriptions (best-effort), stop tasks, close the socket.
    async fn stop(&mut self);

    /// The most recent snapshot, if any datagram has arrived.
    fn latest(&self) -> Option<FlightSnapshot>;

    /// Snapshots with timestamp >= now - seconds, oldest first.
    fn window(&self, seconds: f64) -> Vec<FlightSnapshot>;
}
