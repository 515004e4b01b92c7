//! Internal constants: wire protocol characters, query strings and defaults.

use std::time::Duration;

/// Character terminating every command response.
pub const PROMPT: u8 = b'>';
/// Character introducing an unsolicited notification frame.
pub const NOTIFY_MARKER: u8 = b'#';
/// Terminator appended to every query written to the device.
pub const QUERY_TERMINATOR: &str = "\r";

// Serial defaults. Numato boards are CDC-ACM devices; the baud rate is
// accepted but ignored by the firmware.
/// Default baud rate used when opening a serial device.
pub const DEFAULT_BAUD_RATE: u32 = 19_200;
/// Default read timeout of the serial transport. Bounds how long the
/// poller takes to notice a closed session.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

// Discovery candidates
pub const DEVICE_PATH_PREFIX: &str = "/dev/ttyACM";
pub const DEFAULT_DEVICE_COUNT: usize = 10;

/// Returns the default device files probed by discovery
/// (`/dev/ttyACM0` .. `/dev/ttyACM9`).
pub fn default_device_paths() -> Vec<String> {
    (0..DEFAULT_DEVICE_COUNT)
        .map(|i| format!("{}{}", DEVICE_PATH_PREFIX, i))
        .collect()
}

// --- Queries ---
pub mod query {
    pub const ID_GET: &str = "id get";
    pub const ID_SET: &str = "id set";
    pub const VERSION: &str = "ver";
    pub const GPIO_READALL: &str = "gpio readall";
    pub const GPIO_WRITEALL: &str = "gpio writeall";
    pub const GPIO_IOMASK: &str = "gpio iomask";
    pub const GPIO_IODIR: &str = "gpio iodir";
    pub const NOTIFY_ON: &str = "gpio notify on";
    pub const NOTIFY_OFF: &str = "gpio notify off";
    pub const NOTIFY_GET: &str = "gpio notify get";
    pub const ADC_READ: &str = "adc read";

    // Responses
    pub const NOTIFY_ENABLED: &str = "gpio notify enabled";
    pub const NOTIFY_DISABLED: &str = "gpio notify disabled";
}
