//! Telemetry record types

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::packet::protocol::StatusFrame;

/// One status report as written to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Wall-clock time of reception (RFC 3339, UTC)
    pub timestamp: String,

    /// Rating reported by the receiver (0-66)
    pub remote_rating: u8,

    /// Receiver's majority-good flag
    pub good_signal: bool,

    /// Receiver battery voltage in volts
    pub battery: f32,

    /// Rating of the transmitter's own estimator
    pub local_rating: u8,

    /// Status round trip in ms, if measured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl StatusRecord {
    /// Stamp a received status frame with the current time
    pub fn from_status(status: &StatusFrame, local_rating: u8, latency_ms: Option<u64>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            remote_rating: status.signal_rating,
            good_signal: status.good_signal,
            battery: status.battery,
            local_rating,
            latency_ms,
        }
    }
}
