//! Calibration Module
//!
//! Raw-to-output value mapping and the interactive calibration workflow.

pub mod button;
pub mod engine;
pub mod mapping;

pub use engine::{CalibrationEngine, EngineConfig, EngineEvent, RemoteRequest};
pub use mapping::{ChannelCalibration, Parameter};
