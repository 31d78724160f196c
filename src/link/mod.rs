//! # Link Module
//!
//! Half-duplex request/response link between transmitter and receiver.
//!
//! The transmitter sends a control frame every cycle. When it wants
//! something back it flags a request in that frame and listens for a bounded
//! window; the receiver answers requests and otherwise stays silent.
//!
//! ```text
//!  Transmitter                     Receiver
//!      │── Control ────────────────►│  (no request)
//!      │── Control [status] ───────►│
//!      │◄──────────────── Status ───│
//!      │── Control [cal-set ch] ───►│
//!      │── CalibrationSet ─────────►│
//!      │◄──────── CalibrationGet ───│  (echo of stored values)
//! ```
//!
//! Nothing is retransmitted: a lost frame is superseded by the next cycle.

pub mod receiver;
pub mod signal;
pub mod transmitter;

pub use receiver::{PollOutcome, ReceiverConfig, ReceiverSession};
pub use signal::SignalQualityEstimator;
pub use transmitter::{CycleReport, Reply, TransmitterConfig, TransmitterSession};

/// Timing bookkeeping of one link endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkState {
    /// When the last frame was sent
    pub last_transmit_ms: Option<u64>,
    /// When the last frame was received
    pub last_receive_ms: Option<u64>,
    /// Round trip of the last answered request
    pub latency_ms: Option<u64>,
    /// Transmitter only: a status report was requested this cycle
    pub status_due: bool,
}
