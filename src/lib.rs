//! # RC Link Library
//!
//! Half-duplex control link between a hobby RC transmitter and receiver.
//!
//! This library provides the wire codec, the link sessions of both ends,
//! the signal quality estimate, the persisted calibration settings and the
//! interactive calibration page of the transmitter.

pub mod calibration;
pub mod config;
pub mod error;
pub mod hardware;
pub mod link;
pub mod packet;
pub mod runtime;
pub mod serial;
pub mod settings;
pub mod telemetry;
