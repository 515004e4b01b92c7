use thiserror::Error;

/// Errors that can occur when using Numato GPIO devices.
///
/// Everything except [`Error::Transport`], [`Error::Serial`] and
/// [`Error::TransportClosed`] is recoverable at the call site. A transport
/// failure invalidates the session: later operations fail fast with
/// [`Error::TransportClosed`].
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O failure while talking to the device.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
    /// The serial device could not be opened.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    /// The transport was closed (cleanup or a prior transport failure).
    #[error("Transport closed: the device session is no longer usable")]
    TransportClosed,
    /// The device did not echo the query that was sent.
    #[error("Query '{query}' returned unexpected echo '{echo}'")]
    QueryEcho {
        /// The query that was written.
        query: String,
        /// What the device actually echoed.
        echo: String,
    },
    /// The response did not match the expected format or content.
    #[error("Query '{query}' returned unexpected response '{response}': expected {expected}")]
    UnexpectedResponse {
        /// The query that triggered the response.
        query: String,
        /// The response text (line endings and prompt removed).
        response: String,
        /// Description of what was expected instead.
        expected: String,
    },
    /// A write was attempted on a port configured as input.
    #[error("Can't write to port #{port}: it is configured as input")]
    IoDirection {
        /// The input port that was written to.
        port: u8,
    },
    /// Port number is outside the range of the device.
    #[error("Port #{port} out of range (device has {ports} ports)")]
    PortOutOfRange {
        /// The invalid port number.
        port: u8,
        /// Number of ports of the device.
        ports: u8,
    },
    /// The port is not ADC capable on this device.
    #[error("Can't read analog value from port #{port}: ADC capable ports are {adc_ports:?}")]
    AdcPort {
        /// The requested port.
        port: u8,
        /// The ADC capable ports of the device.
        adc_ports: Vec<u8>,
    },
    /// The device does not support notifications.
    #[error("Device {device} doesn't support notifications")]
    NotifyNotSupported {
        /// Name of the device variant.
        device: String,
    },
    /// No known device variant has the given port count.
    #[error("Unknown device with {ports} ports")]
    UnknownDevice {
        /// The number of ports reported by the device.
        ports: usize,
    },
    /// Line ending detection requested while notifications are enabled.
    #[error("Line ending detection requires notifications to be disabled")]
    EolDetectionWhileNotifying,
    /// Opening and probing a device failed.
    #[error("Device {device} doesn't answer like a Numato device: {source}")]
    Initialization {
        /// Path or name of the device.
        device: String,
        /// The failure that aborted initialization.
        #[source]
        source: Box<Error>,
    },
    /// Two devices reported the same id during discovery.
    #[error("Device {device} has duplicate device id {id:#010x}")]
    DuplicateDeviceId {
        /// Path of the device that was rejected.
        device: String,
        /// The duplicated id.
        id: u32,
    },
}

/// Result type alias for Numato GPIO operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True if the error invalidated the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Serial(_) | Error::TransportClosed
        )
    }
}

pub(crate) fn unexpected_response(
    query: &str,
    response: impl Into<String>,
    expected: impl Into<String>,
) -> Error {
    Error::UnexpectedResponse {
        query: query.to_string(),
        response: response.into(),
        expected: expected.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::TransportClosed.is_fatal());
        assert!(Error::Transport(std::io::Error::other("gone")).is_fatal());
        assert!(!Error::IoDirection { port: 3 }.is_fatal());
        assert!(!unexpected_response("ver", "", "a version string").is_fatal());
    }

    #[test]
    fn test_messages_name_query_and_expectation() {
        let err = unexpected_response("gpio readall", "zz", "8 bit hexadecimal integer");
        let msg = err.to_string();
        assert!(msg.contains("gpio readall"));
        assert!(msg.contains("zz"));
        assert!(msg.contains("8 bit hexadecimal integer"));

        let err = Error::IoDirection { port: 17 };
        assert!(err.to_string().contains("port #17"));
    }
}
