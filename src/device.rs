//! Device sessions: opening, probing and the public GPIO/ADC/notify API.

use crate::capabilities::{spec_for_port_count, DeviceSpec};
use crate::command::{CommandEngine, LineEnding};
use crate::consts::query;
use crate::error::{unexpected_response, Error, Result};
use crate::gpio::{
    all_ones, bit, check_port, format_hex, parse_hex, port_mask, with_bit, Edge, GpioDirection,
    GpioLevel,
};
use crate::handoff::HandoffBuffer;
use crate::interrupt::{spawn_dispatcher, EventRegistry};
use crate::poller::Poller;
use crate::transport::{SerialTransport, Transport, TransportConfig};
use log::{debug, trace, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

const DRAIN_CHUNK: usize = 1024;

/// Mutable session state. Every access goes through the session lock, so
/// at most one exchange is in flight.
struct SessionState {
    engine: CommandEngine,
    id: Option<u32>,
    version: Option<String>,
    iodir: u128,
    iomask: u128,
    state: u128,
    notify: bool,
}

impl SessionState {
    fn new(engine: CommandEngine) -> Self {
        Self {
            engine,
            id: None,
            version: None,
            iodir: u128::MAX,
            iomask: 0,
            state: 0,
            notify: false,
        }
    }

    /// Line ending, id, version and port count, then the safe state.
    fn probe(&mut self, events: &EventRegistry) -> Result<&'static DeviceSpec> {
        let line_ending = self.engine.detect_line_ending(self.notify)?;
        let id = self.id()?;
        let version = self.version()?;
        let spec = self.resolve_spec()?;
        debug!(
            "Probed device: id={:#010x}, ver={:?}, spec={:?}",
            id, version, spec.name
        );
        events.configure(spec.ports, line_ending);
        self.set_iodir(spec, all_ones(spec.ports))?;
        if spec.supports_notification {
            self.set_notify(spec, false)?;
        }
        Ok(spec)
    }

    fn id(&mut self) -> Result<u32> {
        if let Some(id) = self.id {
            return Ok(id);
        }
        // 32 bit field, always fits.
        let id = self.engine.read_int(query::ID_GET, 32)? as u32;
        self.id = Some(id);
        Ok(id)
    }

    fn set_id(&mut self, id: u32) -> Result<()> {
        self.engine
            .query_expect(&format!("{} {:08x}", query::ID_SET, id), "")?;
        debug!("Device id set to {:#010x}", id);
        self.id = Some(id);
        Ok(())
    }

    fn version(&mut self) -> Result<String> {
        if let Some(version) = &self.version {
            return Ok(version.clone());
        }
        let version = self.engine.query_string(query::VERSION)?;
        self.version = Some(version.clone());
        Ok(version)
    }

    /// The width of a `gpio readall` response reveals the port count.
    fn resolve_spec(&mut self) -> Result<&'static DeviceSpec> {
        let response = self.engine.query_string(query::GPIO_READALL)?;
        let spec = spec_for_port_count(response.len() * 4)?;
        self.state = parse_hex(response.as_bytes(), spec.ports).ok_or_else(|| {
            unexpected_response(
                query::GPIO_READALL,
                response.as_str(),
                "a hexadecimal port bitmask",
            )
        })?;
        Ok(spec)
    }

    fn readall(&mut self, spec: &DeviceSpec) -> Result<u128> {
        self.state = self.engine.read_int(query::GPIO_READALL, spec.ports)?;
        Ok(self.state)
    }

    fn writeall(&mut self, spec: &DeviceSpec, bits: u128) -> Result<()> {
        self.state = bits & !self.iodir & all_ones(spec.ports);
        let text = format!(
            "{} {}",
            query::GPIO_WRITEALL,
            format_hex(self.state, spec.ports)
        );
        self.engine.query_expect(&text, "")
    }

    fn set_iomask(&mut self, spec: &DeviceSpec, mask: u128) -> Result<()> {
        let mask = mask & all_ones(spec.ports);
        let text = format!("{} {}", query::GPIO_IOMASK, format_hex(mask, spec.ports));
        self.engine.query_expect(&text, "")?;
        trace!("iomask = {:#x}", mask);
        self.iomask = mask;
        Ok(())
    }

    /// Unprotects all ports, changes direction, then protects the inputs.
    fn set_iodir(&mut self, spec: &DeviceSpec, direction: u128) -> Result<()> {
        let all = all_ones(spec.ports);
        let direction = direction & all;
        self.set_iomask(spec, all)?;
        let text = format!("{} {}", query::GPIO_IODIR, format_hex(direction, spec.ports));
        self.engine.query_expect(&text, "")?;
        self.set_iomask(spec, !direction & all)?;
        debug!("iodir = {:#x}", direction);
        self.iodir = direction;
        Ok(())
    }

    fn notify(&mut self, spec: &DeviceSpec) -> Result<bool> {
        check_notify_support(spec)?;
        let response = self.engine.query_string(query::NOTIFY_GET)?;
        let enabled = if response.eq_ignore_ascii_case(query::NOTIFY_ENABLED) {
            true
        } else if response.eq_ignore_ascii_case(query::NOTIFY_DISABLED) {
            false
        } else {
            return Err(unexpected_response(
                query::NOTIFY_GET,
                response,
                format!(
                    "'{}' or '{}'",
                    query::NOTIFY_ENABLED,
                    query::NOTIFY_DISABLED
                ),
            ));
        };
        self.notify = enabled;
        Ok(enabled)
    }

    fn set_notify(&mut self, spec: &DeviceSpec, enable: bool) -> Result<()> {
        check_notify_support(spec)?;
        let (text, expected) = if enable {
            (query::NOTIFY_ON, query::NOTIFY_ENABLED)
        } else {
            (query::NOTIFY_OFF, query::NOTIFY_DISABLED)
        };
        self.engine.query_expect(text, expected)?;
        debug!("Notifications {}", if enable { "enabled" } else { "disabled" });
        self.notify = enable;
        Ok(())
    }

    fn adc_read(&mut self, spec: &DeviceSpec, port: u8) -> Result<u16> {
        let text = format!(
            "{} {:0width$}",
            query::ADC_READ,
            port,
            width = spec.adc_port_digits
        );
        let response = self.engine.query_string(&text)?;
        let value = if !response.is_empty() && response.bytes().all(|b| b.is_ascii_digit()) {
            response.parse::<u16>().ok()
        } else {
            None
        };
        value.filter(|&v| v <= spec.adc_max()).ok_or_else(|| {
            unexpected_response(
                &text,
                response,
                format!("{} bit decimal integer", spec.adc_resolution_bits),
            )
        })
    }
}

fn check_notify_support(spec: &DeviceSpec) -> Result<()> {
    if spec.supports_notification {
        Ok(())
    } else {
        Err(Error::NotifyNotSupported {
            device: spec.name.to_string(),
        })
    }
}

/// Reads until the transport has nothing left to say.
fn drain(transport: &mut dyn Transport) -> Result<()> {
    let mut chunk = [0u8; DRAIN_CHUNK];
    loop {
        let n = transport.read(&mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        trace!("Drained {} stale bytes", n);
    }
}

/// A session with one Numato USB GPIO device.
///
/// The handle is `Send + Sync`; share it between threads with an `Arc`.
/// Operations from different threads are serialized.
///
/// Edge callbacks run in order on the session's event thread, apart from
/// the poller. A callback may call back into its own session; a slow
/// callback only delays the callbacks queued behind it.
pub struct NumatoGpio {
    path: String,
    spec: &'static DeviceSpec,
    state: Mutex<SessionState>,
    events: Arc<EventRegistry>,
    workers: Mutex<Option<Workers>>,
}

/// Background threads of a session.
struct Workers {
    poller: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl Workers {
    /// Joins the poller, then the dispatcher, which stops once the poller
    /// has dropped its frame sender. A worker never joins itself.
    fn join(self, path: &str) {
        for (role, handle) in [("Poller", self.poller), ("Event dispatcher", self.dispatcher)] {
            if handle.thread().id() == thread::current().id() {
                continue;
            }
            if handle.join().is_err() {
                warn!("{} of {} panicked", role, path);
            }
        }
    }
}

impl NumatoGpio {
    // --- Constructors ---

    /// Opens and initializes the device at `path` (e.g. `/dev/ttyACM0`).
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_config(path, &TransportConfig::default())
    }

    /// Opens the device at `path` with custom serial settings.
    pub fn open_with_config(path: &str, config: &TransportConfig) -> Result<Self> {
        let transport = SerialTransport::open(path, config)?;
        Self::with_transport(path, Box::new(transport))
    }

    /// Initializes a session over an already opened transport.
    ///
    /// Disables notifications, drains stale bytes, starts the poller and the
    /// event dispatcher and probes the device. Leaves all ports as protected inputs with
    /// notifications off.
    pub fn with_transport(path: &str, mut transport: Box<dyn Transport>) -> Result<Self> {
        let off = format!("{}{}", query::NOTIFY_OFF, crate::consts::QUERY_TERMINATOR);
        transport.write_all(off.as_bytes())?;
        drain(transport.as_mut())?;

        let reader = transport.try_clone()?;
        let buffer = Arc::new(HandoffBuffer::new());
        let events = Arc::new(EventRegistry::new());
        let (frames, dispatcher) = spawn_dispatcher(path, Arc::clone(&events))?;
        let poller = Poller::spawn(path, reader, Arc::clone(&buffer), Arc::clone(&events), frames)?;
        let workers = Workers { poller, dispatcher };

        let mut state = SessionState::new(CommandEngine::new(transport, buffer));
        match state.probe(&events) {
            Ok(spec) => {
                debug!("Device {} ready ({} ports)", path, spec.ports);
                Ok(Self {
                    path: path.to_string(),
                    spec,
                    state: Mutex::new(state),
                    events,
                    workers: Mutex::new(Some(workers)),
                })
            }
            Err(e) => {
                warn!("Initialization of {} failed: {}", path, e);
                state.engine.close();
                workers.join(path);
                Err(Error::Initialization {
                    device: path.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Info ---

    /// Path the session was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Capabilities of the connected device.
    pub fn spec(&self) -> &'static DeviceSpec {
        self.spec
    }

    pub fn ports(&self) -> u8 {
        self.spec.ports
    }

    pub fn can_notify(&self) -> bool {
        self.spec.supports_notification
    }

    /// Line ending detected while probing.
    pub fn line_ending(&self) -> LineEnding {
        self.lock_state().engine.line_ending()
    }

    /// False after cleanup or a transport failure.
    pub fn is_open(&self) -> bool {
        self.lock_state().engine.is_open()
    }

    /// Device id, read once and cached.
    pub fn id(&self) -> Result<u32> {
        self.lock_state().id()
    }

    /// Re-programs the device id.
    pub fn set_id(&self, id: u32) -> Result<()> {
        self.lock_state().set_id(id)
    }

    /// Firmware version string, read once and cached.
    pub fn version(&self) -> Result<String> {
        self.lock_state().version()
    }

    // --- GPIO ---

    /// Configures a single port as input or output.
    pub fn setup(&self, port: u8, direction: GpioDirection) -> Result<()> {
        check_port(port, self.spec.ports)?;
        let mut state = self.lock_state();
        let direction = with_bit(state.iodir, port, direction == GpioDirection::Input);
        state.set_iodir(self.spec, direction)
    }

    /// Sets the level of an output port.
    pub fn write(&self, port: u8, level: GpioLevel) -> Result<()> {
        check_port(port, self.spec.ports)?;
        let mut state = self.lock_state();
        if state.iodir & port_mask(port) != 0 {
            return Err(Error::IoDirection { port });
        }
        let bits = with_bit(state.state, port, level.is_high());
        state.writeall(self.spec, bits)
    }

    /// Reads the level of a single port.
    pub fn read(&self, port: u8) -> Result<GpioLevel> {
        check_port(port, self.spec.ports)?;
        Ok(bit(self.readall()?, port))
    }

    /// Reads all port levels as one bitmask.
    pub fn readall(&self) -> Result<u128> {
        self.lock_state().readall(self.spec)
    }

    /// Writes all output levels at once. Bits of input ports are dropped.
    pub fn writeall(&self, bits: u128) -> Result<()> {
        self.lock_state().writeall(self.spec, bits)
    }

    /// Last known port levels (written outputs or last `readall`).
    pub fn state(&self) -> u128 {
        self.lock_state().state
    }

    /// Current write protection mask (1 = writable).
    pub fn iomask(&self) -> u128 {
        self.lock_state().iomask
    }

    pub fn set_iomask(&self, mask: u128) -> Result<()> {
        self.lock_state().set_iomask(self.spec, mask)
    }

    /// Current direction of all ports (1 = input).
    pub fn iodir(&self) -> u128 {
        self.lock_state().iodir
    }

    /// Sets the direction of all ports. Input ports end up write protected.
    pub fn set_iodir(&self, direction: u128) -> Result<()> {
        self.lock_state().set_iodir(self.spec, direction)
    }

    // --- Notifications ---

    /// Queries whether the device sends change notifications.
    pub fn notify(&self) -> Result<bool> {
        self.lock_state().notify(self.spec)
    }

    /// Enables or disables change notifications.
    pub fn set_notify(&self, enable: bool) -> Result<()> {
        self.lock_state().set_notify(self.spec, enable)
    }

    /// Registers `callback` for level changes of `port` matching `edge`.
    /// Notifications must be enabled with [`NumatoGpio::set_notify`].
    pub fn add_event_detect<F>(&self, port: u8, callback: F, edge: Edge) -> Result<()>
    where
        F: Fn(u8, GpioLevel) + Send + Sync + 'static,
    {
        check_notify_support(self.spec)?;
        check_port(port, self.spec.ports)?;
        self.events.register(port, Arc::new(callback), edge);
        Ok(())
    }

    /// Removes the callback of `port`.
    pub fn remove_event_detect(&self, port: u8) -> Result<()> {
        check_notify_support(self.spec)?;
        check_port(port, self.spec.ports)?;
        self.events.unregister(port);
        Ok(())
    }

    /// True if a callback is registered for `port`.
    pub fn has_event_detect(&self, port: u8) -> bool {
        self.events.is_registered(port)
    }

    // --- ADC ---

    /// Reads the raw analog value of an ADC capable port.
    pub fn adc_read(&self, port: u8) -> Result<u16> {
        if !self.spec.is_adc_port(port) {
            return Err(Error::AdcPort {
                port,
                adc_ports: self.spec.adc_port_numbers(),
            });
        }
        self.lock_state().adc_read(self.spec, port)
    }

    // --- Shutdown ---

    /// Restores the safe state (all inputs, protected, notifications off),
    /// closes the transport and stops the poller and the event dispatcher.
    ///
    /// Every step is attempted even if an earlier one fails; the first
    /// failure is returned. Calling it again is a no-op.
    pub fn cleanup(&self) -> Result<()> {
        let mut first_error = None;
        {
            let mut state = self.lock_state();
            if state.engine.is_open() {
                let all = all_ones(self.spec.ports);
                if let Err(e) = state.set_iomask(self.spec, all) {
                    warn!("Cleanup of {}: iomask failed: {}", self.path, e);
                    first_error.get_or_insert(e);
                }
                if let Err(e) = state.set_iodir(self.spec, all) {
                    warn!("Cleanup of {}: iodir failed: {}", self.path, e);
                    first_error.get_or_insert(e);
                }
                if self.spec.supports_notification {
                    if let Err(e) = state.set_notify(self.spec, false) {
                        warn!("Cleanup of {}: notify off failed: {}", self.path, e);
                        first_error.get_or_insert(e);
                    }
                }
            }
            state.engine.close();
        }
        self.join_workers();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn join_workers(&self) {
        let workers = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(workers) = workers {
            workers.join(&self.path);
            debug!("Device {} closed", self.path);
        }
    }
}

impl Drop for NumatoGpio {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            debug!("Cleanup on drop of {} failed: {}", self.path, e);
        }
    }
}

impl fmt::Display for NumatoGpio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        let ports = self.spec.ports;
        write!(
            f,
            "dev: {} | id: {} | ver: {} | ports: {} | iodir: 0x{} | iomask: 0x{} | state: 0x{}",
            self.path,
            state.id.map_or_else(|| "?".to_string(), |id| id.to_string()),
            state.version.as_deref().unwrap_or("?"),
            ports,
            format_hex(state.iodir, ports),
            format_hex(state.iomask, ports),
            format_hex(state.state, ports),
        )
    }
}

impl fmt::Debug for NumatoGpio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumatoGpio")
            .field("path", &self.path)
            .field("device", &self.spec.name)
            .finish_non_exhaustive()
    }
}
