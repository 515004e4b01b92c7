//! # numato-gpio
//!
//! A Rust crate for controlling Numato Lab USB GPIO expanders (8, 16, 32,
//! 64 and 128 port variants) through the text command protocol they expose
//! on their USB CDC-ACM serial interface.
//!
//! This crate uses the `serialport` crate to open the device.
//!
//! ## Features
//!
//! *   Opening and probing a device (`NumatoGpio::open`, `open_with_config`, `with_transport`).
//! *   Automatic detection of the port count, line ending, id and firmware version.
//! *   GPIO control:
//!     *   Single port direction setup (`setup`) and bulk direction (`set_iodir`).
//!     *   Reading/writing single ports (`read`, `write`) and all ports (`readall`, `writeall`).
//!     *   Write protection masks (`set_iomask`), kept in sync with the port directions.
//! *   Analog reads on ADC capable ports (`adc_read`).
//! *   Asynchronous change notifications with per-port edge callbacks
//!     (`set_notify`, `add_event_detect`, `remove_event_detect`).
//! *   Discovery of several devices keyed by device id (`DeviceRegistry`).
//!
//! ## How it works
//!
//! Every session runs a poller thread that is the only reader of the serial
//! device. Notification frames (`# <current> <previous> <iodir>`) may arrive
//! at any byte offset, even in the middle of a response; the poller cuts them
//! out of the stream and queues them for a second thread, which runs the
//! registered callbacks in order. Callbacks may therefore use the session
//! they belong to. All
//! other bytes are handed to the command engine, which writes a query,
//! verifies the device's echo and reads the response up to the `>` prompt.
//! Queries are serialized by a per-session lock.
//!
//! ## Device Support & Limitations
//!
//! *   **8 ports:** no notifications. `set_notify` and `add_event_detect` return
//!     `Error::NotifyNotSupported`.
//! *   **16/32/64/128 ports:** notifications supported.
//! *   ADC capable ports differ per model, see [`DeviceSpec::adc_ports`].
//!
//! ## Basic Usage
//!
//! ```no_run
//! use numato_gpio::{Edge, GpioDirection, GpioLevel, NumatoGpio, Result};
//! use std::{thread, time::Duration};
//!
//! fn main() -> Result<()> {
//!     // Optional: Initialize logging
//!     // env_logger::init();
//!
//!     let device = NumatoGpio::open("/dev/ttyACM0")?;
//!     println!("{}", device);
//!
//!     device.setup(0, GpioDirection::Output)?;
//!     device.write(0, GpioLevel::High)?;
//!     thread::sleep(Duration::from_millis(200));
//!     device.write(0, GpioLevel::Low)?;
//!
//!     if device.can_notify() {
//!         device.add_event_detect(
//!             1,
//!             |port, level| println!("port {} is now {:?}", port, level),
//!             Edge::Both,
//!         )?;
//!         device.set_notify(true)?;
//!     }
//!
//!     // Back to the safe state: all inputs, notifications off.
//!     device.cleanup()
//! }
//! ```
//!
//! ## Working with Multiple Devices / Custom IDs
//!
//! [`DeviceRegistry`] opens a list of candidate paths and keys the sessions
//! by the id each device reports, so a configuration can refer to a board
//! independently of the `/dev/ttyACM*` number it got. Give each board a
//! distinct id once with [`NumatoGpio::set_id`].
//!
//! ```no_run
//! use numato_gpio::{default_device_paths, DeviceRegistry};
//!
//! let mut registry = DeviceRegistry::new();
//! registry.discover(&default_device_paths());
//! for (id, device) in registry.iter() {
//!     println!("{}: {}", id, device);
//! }
//! registry.cleanup();
//! ```
//!
//! ## Hardware Setup Notes
//!
//! *   **Linux permissions:** the device shows up as `/dev/ttyACM*`. Add your
//!     user to the `dialout` group (or equivalent) to open it.
//! *   **ModemManager:** right after plugging in, ModemManager may probe the
//!     device as a modem. Wait a few seconds or blacklist the device.
//! *   **GPIO Voltage Levels:** 3.3V or 5V depending on the model. ADC readings
//!     range from 0 to `DeviceSpec::adc_max()`.

mod command;
mod consts;
mod error;
mod handoff;
mod poller;

pub mod capabilities;
pub mod device;
pub mod gpio;
pub mod interrupt;
pub mod registry;
pub mod transport;

pub use capabilities::{spec_for_port_count, DeviceSpec, DeviceType, SUPPORTED_PORT_COUNTS};
pub use command::LineEnding;
pub use consts::default_device_paths;
pub use device::NumatoGpio;
pub use error::{Error, Result};
pub use gpio::{Edge, GpioDirection, GpioLevel};
pub use interrupt::{EventCallback, NotificationFrame};
pub use registry::DeviceRegistry;
pub use transport::{SerialTransport, Transport, TransportConfig};
