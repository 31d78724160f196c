//! # Link Packet Module
//!
//! Fixed-size frames exchanged over the half-duplex radio link.
//!
//! This module handles:
//! - Frame type discriminants and payload layouts
//! - Encoding frames into 16-byte wire buffers
//! - Decoding wire buffers, including unknown frame types
//! - Request and status flag packing

pub mod protocol;
pub mod encoder;
pub mod decoder;
