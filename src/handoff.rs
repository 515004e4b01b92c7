//! Blocking byte queue between the poller thread and the command engine.

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct BufferState {
    bytes: VecDeque<u8>,
    closed: bool,
}

/// Ordered, unbounded byte queue. One producer (the poller) appends; one
/// logical consumer at a time (serialized by the session lock) takes.
#[derive(Debug, Default)]
pub(crate) struct HandoffBuffer {
    state: Mutex<BufferState>,
    available: Condvar,
}

impl HandoffBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends bytes and wakes waiting consumers. Ignored once closed.
    pub(crate) fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.bytes.extend(bytes);
        self.available.notify_all();
    }

    /// Blocks until `n` bytes are available, then removes and returns them.
    /// Fails with [`Error::TransportClosed`] if the buffer is closed before
    /// enough bytes arrived.
    pub(crate) fn take_exactly(&self, n: usize) -> Result<Vec<u8>> {
        let mut state = self.lock();
        while state.bytes.len() < n {
            if state.closed {
                return Err(Error::TransportClosed);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(state.bytes.drain(..n).collect())
    }

    /// Takes a single byte.
    pub(crate) fn take_byte(&self) -> Result<u8> {
        let mut state = self.lock();
        loop {
            if let Some(byte) = state.bytes.pop_front() {
                return Ok(byte);
            }
            if state.closed {
                return Err(Error::TransportClosed);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Marks the buffer closed and releases every blocked consumer.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.available.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
