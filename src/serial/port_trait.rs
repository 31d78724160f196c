//! Trait abstraction for the serial port so the bridge can be tested without hardware

use std::io::{self, Read, Write};

/// Byte-level access to the radio bridge
pub trait SerialLink: Send {
    /// Write all data and flush it to the device
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read whatever is already buffered without waiting; `Ok(0)` when nothing is
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// A native serial port opened through `tokio_serial`
pub struct NativeSerialPort {
    port: Box<dyn tokio_serial::SerialPort>,
}

impl NativeSerialPort {
    pub fn new(port: Box<dyn tokio_serial::SerialPort>) -> Self {
        Self { port }
    }
}

impl SerialLink for NativeSerialPort {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if pending == 0 {
            return Ok(0);
        }
        let len = pending.min(buf.len());
        self.port.read(&mut buf[..len])
    }
}
