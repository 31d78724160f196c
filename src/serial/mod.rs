//! # Serial Radio Module
//!
//! Host-side [`Radio`] backed by a USB radio bridge.
//!
//! The bridge owns the transceiver (payload size, data rate, auto-ack off)
//! and speaks the framing in [`bridge`]. This module handles:
//! - Opening the serial port, trying several device paths
//! - Wrapping radio frames into bridge commands
//! - Buffering received bytes and extracting radio frames with their
//!   carrier-detect flag

pub mod bridge;
pub mod crc;
pub mod port_trait;

use std::collections::VecDeque;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::error::{RcLinkError, Result};
use crate::hardware::Radio;
use crate::packet::protocol::RawFrame;
use bridge::BridgeMessage;
use port_trait::{NativeSerialPort, SerialLink};

/// Default bridge baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC bridges
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Bytes pulled from the port per read
const READ_CHUNK: usize = 64;

/// Radio bridge on a serial port
pub struct SerialRadio<L: SerialLink = NativeSerialPort> {
    link: L,
    device_path: String,
    rx_buffer: BytesMut,
    received: VecDeque<(RawFrame, bool)>,
    carrier: bool,
}

impl<L: SerialLink> std::fmt::Debug for SerialRadio<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialRadio")
            .field("device_path", &self.device_path)
            .field("buffered", &self.rx_buffer.len())
            .field("queued", &self.received.len())
            .finish_non_exhaustive()
    }
}

impl SerialRadio<NativeSerialPort> {
    /// Open the first bridge that responds on one of `paths`
    ///
    /// # Errors
    ///
    /// Returns [`RcLinkError::SerialPortNotFound`] if no path could be opened.
    pub fn open_with_paths<S: AsRef<str>>(
        paths: &[S],
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Self> {
        for path in paths.iter().map(AsRef::as_ref) {
            debug!("Trying to open radio bridge: {}", path);

            match Self::open_port(path, baud_rate, timeout) {
                Ok(port) => {
                    info!("Opened radio bridge at {}", path);
                    return Ok(Self::with_link(NativeSerialPort::new(port), path));
                }
                Err(e) => warn!("Failed to open {}: {}", path, e),
            }
        }

        let tried: Vec<&str> = paths.iter().map(AsRef::as_ref).collect();
        Err(RcLinkError::SerialPortNotFound(tried.join(", ")))
    }

    /// Open a specific port, 8N1 without flow control
    fn open_port(
        path: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn tokio_serial::SerialPort>> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| RcLinkError::Serial(format!("Failed to open {}: {}", path, e)))
    }
}

impl<L: SerialLink> SerialRadio<L> {
    /// Wrap an already open link
    pub fn with_link(link: L, device_path: &str) -> Self {
        Self {
            link,
            device_path: device_path.to_string(),
            rx_buffer: BytesMut::with_capacity(READ_CHUNK * 4),
            received: VecDeque::new(),
            carrier: false,
        }
    }

    /// Path of the opened device
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.link
            .write_all(bytes)
            .map_err(|e| RcLinkError::Serial(format!("Failed to write to bridge: {}", e)))
    }

    /// Move everything the port has buffered into the frame queue
    fn pump(&mut self) {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.link.read_available(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.rx_buffer.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    warn!("Failed to read from bridge: {}", e);
                    break;
                }
            }
        }

        while let Some(message) = bridge::decode_next(&mut self.rx_buffer) {
            match message {
                BridgeMessage::Received { frame, carrier } => {
                    self.received.push_back((frame, carrier));
                }
                BridgeMessage::Other { command } => {
                    debug!("Ignoring bridge command 0x{:02X}", command);
                }
            }
        }
    }
}

impl<L: SerialLink> Radio for SerialRadio<L> {
    fn send(&mut self, frame: &RawFrame) -> Result<()> {
        let bytes = bridge::encode_transmit(frame)?;
        self.write(&bytes)
    }

    fn try_receive(&mut self) -> Option<RawFrame> {
        if self.received.is_empty() {
            self.pump();
        }
        let (frame, carrier) = self.received.pop_front()?;
        self.carrier = carrier;
        Some(frame)
    }

    fn set_listening(&mut self, listening: bool) {
        let result = bridge::encode_listen(listening).and_then(|bytes| self.write(&bytes));
        if let Err(e) = result {
            warn!("Failed to switch bridge mode: {}", e);
        }
    }

    fn carrier_detected(&mut self) -> bool {
        self.carrier
    }
}
