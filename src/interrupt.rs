//! Port change notifications and edge detection callbacks.

use crate::command::LineEnding;
use crate::gpio::{bit, parse_hex, Edge, GpioLevel};
use log::{debug, trace, warn};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Callback invoked with `(port, new_level)` when an edge is detected.
pub type EventCallback = Arc<dyn Fn(u8, GpioLevel) + Send + Sync>;

/// A decoded notification frame.
///
/// On the wire: `#`, then three `ports / 4` digit hex fields each preceded
/// by one separator byte: current value, previous value, iodir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationFrame {
    /// Port levels after the change.
    pub current: u128,
    /// Port levels before the change.
    pub previous: u128,
    /// I/O direction echoed by the device. Not used for dispatch.
    pub iodir: u128,
}

impl NotificationFrame {
    /// Length of a frame body (everything after the marker).
    #[inline]
    pub fn body_len(ports: u8) -> usize {
        3 * (1 + usize::from(ports) / 4)
    }

    /// Decodes a frame body. Returns `None` if the body has the wrong
    /// length or a field is not hexadecimal.
    pub fn parse(body: &[u8], ports: u8) -> Option<Self> {
        if body.len() != Self::body_len(ports) {
            return None;
        }
        let digits = usize::from(ports) / 4;
        let field = |index: usize| {
            let start = index * (digits + 1) + 1;
            parse_hex(&body[start..start + digits], ports)
        };
        Some(Self {
            current: field(0)?,
            previous: field(1)?,
            iodir: field(2)?,
        })
    }

    /// Bitmask of ports whose level changed.
    #[inline]
    pub fn edges(&self) -> u128 {
        self.current ^ self.previous
    }

    /// Ports that changed, paired with their new level.
    pub fn changes(&self, ports: u8) -> impl Iterator<Item = (u8, GpioLevel)> + '_ {
        let edges = self.edges();
        (0..ports)
            .filter(move |&port| edges & (1u128 << port) != 0)
            .map(move |port| (port, bit(self.current, port)))
    }
}

struct EventHandler {
    callback: EventCallback,
    edge: Edge,
}

/// What the poller needs to know to cut frames out of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameLayout {
    pub(crate) ports: u8,
    /// Line ending the device sends in front of every frame.
    pub(crate) line_ending: LineEnding,
}

/// Per-port callbacks consulted by the event dispatcher.
///
/// Has its own locks, independent of the session lock, so the poller never
/// waits on a caller that is in the middle of a query.
pub(crate) struct EventRegistry {
    layout: Mutex<Option<FrameLayout>>,
    handlers: Mutex<Vec<Option<EventHandler>>>,
}

impl EventRegistry {
    pub(crate) fn new() -> Self {
        Self {
            layout: Mutex::new(None),
            handlers: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<EventHandler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sizes the registry once the device was probed. Until then the
    /// poller treats `#` as an ordinary byte.
    pub(crate) fn configure(&self, ports: u8, line_ending: LineEnding) {
        let mut handlers = self.lock();
        handlers.clear();
        handlers.resize_with(usize::from(ports), || None);
        *self.layout.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(FrameLayout { ports, line_ending });
    }

    /// `None` before the device was probed.
    pub(crate) fn layout(&self) -> Option<FrameLayout> {
        *self.layout.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, port: u8, callback: EventCallback, edge: Edge) {
        if let Some(slot) = self.lock().get_mut(usize::from(port)) {
            *slot = Some(EventHandler { callback, edge });
        }
    }

    pub(crate) fn unregister(&self, port: u8) {
        if let Some(slot) = self.lock().get_mut(usize::from(port)) {
            *slot = None;
        }
    }

    pub(crate) fn is_registered(&self, port: u8) -> bool {
        self.lock()
            .get(usize::from(port))
            .is_some_and(|slot| slot.is_some())
    }

    /// Invokes the matching callbacks for every changed port. Returns the
    /// number of callbacks invoked.
    pub(crate) fn dispatch(&self, frame: &NotificationFrame) -> usize {
        let Some(FrameLayout { ports, .. }) = self.layout() else {
            return 0;
        };
        // Collect under the lock, call without it: callbacks may register
        // or remove handlers themselves.
        let pending: Vec<(u8, GpioLevel, EventCallback)> = {
            let handlers = self.lock();
            frame
                .changes(ports)
                .filter_map(|(port, level)| {
                    handlers
                        .get(usize::from(port))
                        .and_then(Option::as_ref)
                        .filter(|handler| handler.edge.matches(level))
                        .map(|handler| (port, level, Arc::clone(&handler.callback)))
                })
                .collect()
        };
        for (port, level, callback) in &pending {
            trace!("Edge on port {}: {:?}", port, level);
            if catch_unwind(AssertUnwindSafe(|| callback(*port, *level))).is_err() {
                warn!("Event callback for port {} panicked", port);
            }
        }
        pending.len()
    }
}

/// Starts the thread that runs edge callbacks, in frame order.
///
/// The poller only decodes frames and sends them here, so it keeps feeding
/// responses while a callback runs, even one that queries its own session.
/// The thread exits once every sender is gone and the queue is drained.
pub(crate) fn spawn_dispatcher(
    name: &str,
    events: Arc<EventRegistry>,
) -> io::Result<(Sender<NotificationFrame>, JoinHandle<()>)> {
    let (frames, queue) = mpsc::channel::<NotificationFrame>();
    let handle = thread::Builder::new()
        .name(format!("numato-events {}", name))
        .spawn(move || {
            debug!("Event dispatcher started");
            for frame in queue {
                events.dispatch(&frame);
            }
            debug!("Event dispatcher stopped");
        })?;
    Ok((frames, handle))
}
