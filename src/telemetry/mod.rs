//! # Telemetry Module
//!
//! Status reports received by the transmitter, logged to JSONL files.
//!
//! This module handles:
//! - Stamping each status report with wall-clock time
//! - Formatting as JSONL (JSON Lines)
//! - Rotating files after N records and retaining only the last M files

pub mod logger;
pub mod types;

pub use logger::TelemetryLogger;
pub use types::StatusRecord;
