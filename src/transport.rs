//! Byte channel to the device.
//!
//! The protocol engine needs two independent handles to the same duplex
//! channel: one owned by the poller thread for reading and one used by the
//! command engine for writing. [`Transport::try_clone`] provides the second
//! handle, mirroring [`serialport::SerialPort::try_clone`].

use crate::consts;
use log::debug;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// A duplex, already configured byte channel.
pub trait Transport: Send {
    /// Reads up to `buf.len()` bytes. Returns `Ok(0)` if nothing arrived
    /// within the transport's read timeout. Any error is fatal.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `bytes` to the device.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Returns a second handle to the same channel.
    fn try_clone(&self) -> io::Result<Box<dyn Transport>>;

    /// Called once when the session stops using this handle, right before
    /// it is dropped. The device itself is released when every handle is
    /// dropped, so the default does nothing.
    fn close(&mut self) {}
}

/// Settings used when opening a serial device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub baud_rate: u32,
    /// How long a single read waits for data before returning empty.
    pub read_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            baud_rate: consts::DEFAULT_BAUD_RATE,
            read_timeout: consts::DEFAULT_READ_TIMEOUT,
        }
    }
}

/// [`Transport`] backed by a serial device such as `/dev/ttyACM0`.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens the serial device at `path`.
    pub fn open(path: &str, config: &TransportConfig) -> crate::Result<Self> {
        let port = serialport::new(path, config.baud_rate)
            .timeout(config.read_timeout)
            .open()?;
        debug!(
            "Opened serial device {} ({} baud, timeout {:?})",
            path, config.baud_rate, config.read_timeout
        );
        Ok(Self { port })
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.port.name())
            .finish_non_exhaustive()
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(SerialTransport { port }))
    }
}
