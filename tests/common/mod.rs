//! Simulated Numato device for integration tests.
//!
//! Answers queries much like the firmware does: echo, optional response
//! line, prompt. Line endings and notification injection are configurable.

#![allow(dead_code)]

use numato_gpio::{NumatoGpio, Transport};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

pub const PORTS: [u8; 5] = [8, 16, 32, 64, 128];
pub const LINE_ENDINGS: [&str; 4] = ["\r\n", "\n\r", "\r", "\n"];
pub const DEFAULT_ID: u32 = 0x4711;
pub const DEFAULT_VERSION: &str = "00000008";
pub const SIM_PATH: &str = "/dev/ttySIM";

/// Where a notification frame is spliced into the next reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Before the echo.
    Front,
    /// Inside the echoed query text.
    Middle,
    /// After the echo's line ending, between the response's hex digits.
    Body,
    /// Right before the prompt.
    Back,
}

pub struct SimState {
    pub ports: u8,
    pub eol: String,
    pub id: u32,
    pub version: String,
    pub iodir: u128,
    pub iomask: u128,
    pub outputs: u128,
    pub inputs: u128,
    pub notify: bool,
    pub adc: HashMap<u8, String>,
    /// Answer nothing at all.
    pub mute: bool,
    pub fail_writes: bool,
    pub closed: bool,
    pub inject: Option<(Position, u128, u128)>,
    pub commands: Vec<String>,
    rx: Vec<u8>,
    tx: VecDeque<u8>,
}

impl SimState {
    fn all_ones(&self) -> u128 {
        if self.ports >= 128 {
            u128::MAX
        } else {
            (1u128 << self.ports) - 1
        }
    }

    fn hex(&self, value: u128) -> String {
        format!(
            "{:0width$X}",
            value & self.all_ones(),
            width = usize::from(self.ports) / 4
        )
    }

    fn can_notify(&self) -> bool {
        self.ports != 8
    }

    pub fn levels(&self) -> u128 {
        (self.outputs & !self.iodir) | (self.inputs & self.iodir)
    }

    fn frame(&self, current: u128, previous: u128) -> Vec<u8> {
        format!(
            "{}# {} {} {}",
            self.eol,
            self.hex(current),
            self.hex(previous),
            self.hex(self.iodir)
        )
        .into_bytes()
    }

    fn parse_arg(arg: Option<&str>) -> u128 {
        arg.and_then(|a| u128::from_str_radix(a, 16).ok())
            .unwrap_or_default()
    }

    fn body(&mut self, command: &str) -> Option<String> {
        let mut words = command.split(' ');
        let head = words.next().unwrap_or_default();
        let sub = words.next();
        let arg = words.next();
        match (head, sub) {
            ("id", Some("get")) => Some(format!("{:08X}", self.id)),
            ("id", Some("set")) => {
                self.id = Self::parse_arg(arg) as u32;
                None
            }
            ("ver", None) => Some(self.version.clone()),
            ("gpio", Some("readall")) => Some(self.hex(self.levels())),
            ("gpio", Some("writeall")) => {
                let value = Self::parse_arg(arg);
                self.outputs = (self.outputs & !self.iomask) | (value & self.iomask);
                None
            }
            ("gpio", Some("iomask")) => {
                self.iomask = Self::parse_arg(arg) & self.all_ones();
                None
            }
            ("gpio", Some("iodir")) => {
                let value = Self::parse_arg(arg);
                self.iodir = (self.iodir & !self.iomask) | (value & self.iomask);
                None
            }
            ("gpio", Some("notify")) if self.can_notify() => {
                match arg {
                    Some("on") => self.notify = true,
                    Some("off") => self.notify = false,
                    _ => {}
                }
                Some(format!(
                    "gpio notify {}",
                    if self.notify { "enabled" } else { "disabled" }
                ))
            }
            ("adc", Some("read")) => {
                let port = arg.and_then(|a| a.parse::<u8>().ok()).unwrap_or_default();
                Some(
                    self.adc
                        .get(&port)
                        .cloned()
                        .unwrap_or_else(|| "512".to_string()),
                )
            }
            _ => None,
        }
    }

    fn respond(&mut self, command: &str) {
        self.commands.push(command.to_string());
        if self.mute {
            return;
        }
        let mut reply = format!("{}{}", command, self.eol).into_bytes();
        let echo_len = reply.len();
        let mut body_len = 0;
        if let Some(body) = self.body(command) {
            body_len = body.len();
            reply.extend_from_slice(body.as_bytes());
            reply.extend_from_slice(self.eol.as_bytes());
        }
        reply.push(b'>');
        if let Some((position, current, previous)) = self.inject.take() {
            let at = match position {
                Position::Front => 0,
                Position::Middle => command.len() / 2,
                Position::Body => echo_len + body_len / 2,
                Position::Back => reply.len() - 1,
            };
            let tail = reply.split_off(at);
            reply.extend(self.frame(current, previous));
            reply.extend(tail);
        }
        self.tx.extend(reply);
    }
}

/// Test-side handle controlling the simulated device.
#[derive(Clone)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    pub fn new(ports: u8) -> Self {
        Self::with_eol(ports, "\r\n")
    }

    pub fn with_eol(ports: u8, eol: &str) -> Self {
        let state = SimState {
            ports,
            eol: eol.to_string(),
            id: DEFAULT_ID,
            version: DEFAULT_VERSION.to_string(),
            iodir: 0,
            iomask: 0,
            outputs: 0,
            inputs: 0,
            notify: false,
            adc: HashMap::new(),
            mute: false,
            fail_writes: false,
            closed: false,
            inject: None,
            commands: Vec::new(),
            rx: Vec::new(),
            // Leftovers from an earlier session, to be drained.
            tx: b"stale>".iter().copied().collect(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(SimTransport {
            state: Arc::clone(&self.state),
        })
    }

    pub fn open(&self) -> numato_gpio::Result<NumatoGpio> {
        NumatoGpio::with_transport(SIM_PATH, self.transport())
    }

    /// Number of commands received so far.
    pub fn command_count(&self) -> usize {
        self.state().commands.len()
    }

    pub fn commands_since(&self, start: usize) -> Vec<String> {
        self.state().commands[start..].to_vec()
    }

    /// Queues a spontaneous notification frame.
    pub fn push_notification(&self, current: u128, previous: u128) {
        let mut state = self.state();
        let frame = state.frame(current, previous);
        state.tx.extend(frame);
    }

    /// Splices a notification into the next reply.
    pub fn inject_into_next_reply(&self, position: Position, current: u128, previous: u128) {
        self.state().inject = Some((position, current, previous));
    }

    /// Simulates unplugging the device.
    pub fn close(&self) {
        self.state().closed = true;
    }
}

pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

impl Transport for SimTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if state.tx.is_empty() {
            drop(state);
            thread::sleep(Duration::from_millis(1));
            return Ok(0);
        }
        let n = buf.len().min(state.tx.len());
        for (slot, byte) in buf.iter_mut().zip(state.tx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed || state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        state.rx.extend_from_slice(bytes);
        while let Some(end) = state.rx.iter().position(|&b| b == b'\r') {
            let line: Vec<u8> = state.rx.drain(..=end).collect();
            let command = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            state.respond(&command);
        }
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(SimTransport {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Opens a session on a fresh simulated device.
pub fn open_sim(ports: u8) -> (SimDevice, NumatoGpio) {
    init_logging();
    let sim = SimDevice::new(ports);
    let device = sim.open().expect("simulated device should open");
    (sim, device)
}

pub fn all_ones(ports: u8) -> u128 {
    if ports >= 128 {
        u128::MAX
    } else {
        (1u128 << ports) - 1
    }
}

/// Waits until `seen` holds at least `count` entries and returns them.
/// Callbacks run on the session's event thread, so they may lag behind the
/// reply that carried their frame.
pub fn wait_for<T: Clone>(seen: &Mutex<Vec<T>>, count: usize) -> Vec<T> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let current = seen.lock().unwrap().clone();
        if current.len() >= count || Instant::now() > deadline {
            return current;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
