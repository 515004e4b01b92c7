//! Background reader demultiplexing notification frames from responses.

use crate::consts;
use crate::handoff::HandoffBuffer;
use crate::interrupt::{EventRegistry, NotificationFrame};
use crate::transport::Transport;
use log::{debug, trace, warn};
use std::io;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// The sole reader of the transport. Runs until the transport fails or the
/// handoff buffer is closed.
pub(crate) struct Poller {
    reader: Box<dyn Transport>,
    buffer: Arc<HandoffBuffer>,
    events: Arc<EventRegistry>,
    /// Decoded frames go to the event dispatcher.
    frames: Sender<NotificationFrame>,
    /// CR/LF bytes held back until the next byte shows whether they are
    /// the preamble of a notification frame.
    pending_eol: Vec<u8>,
}

impl Poller {
    pub(crate) fn spawn(
        name: &str,
        reader: Box<dyn Transport>,
        buffer: Arc<HandoffBuffer>,
        events: Arc<EventRegistry>,
        frames: Sender<NotificationFrame>,
    ) -> io::Result<JoinHandle<()>> {
        let poller = Poller {
            reader,
            buffer,
            events,
            frames,
            pending_eol: Vec::new(),
        };
        thread::Builder::new()
            .name(format!("numato-poller {}", name))
            .spawn(move || poller.run())
    }

    fn run(mut self) {
        debug!("Poller started");
        match self.poll() {
            Ok(()) => debug!("Poller stopped: transport closed"),
            Err(e) => warn!("Poller stopped on transport error: {}", e),
        }
        // Releases consumers blocked on a response that will never come.
        self.buffer.close();
    }

    fn poll(&mut self) -> io::Result<()> {
        while let Some(byte) = self.next_byte()? {
            match byte {
                b'\r' | b'\n' => self.pending_eol.push(byte),
                consts::NOTIFY_MARKER => match self.events.layout() {
                    Some(layout) => {
                        let preamble = layout.line_ending.as_bytes();
                        if self.pending_eol.ends_with(preamble) {
                            let keep = self.pending_eol.len() - preamble.len();
                            self.pending_eol.truncate(keep);
                            trace!("Dropped frame preamble {:02X?}", preamble);
                        }
                        self.flush();
                        if !self.read_notification(layout.ports)? {
                            return Ok(());
                        }
                    }
                    None => self.forward(byte),
                },
                _ => self.forward(byte),
            }
        }
        Ok(())
    }

    fn forward(&mut self, byte: u8) {
        self.pending_eol.push(byte);
        self.flush();
    }

    /// Hands held back bytes to the command engine.
    fn flush(&mut self) {
        if !self.pending_eol.is_empty() {
            self.buffer.append(&self.pending_eol);
            self.pending_eol.clear();
        }
    }

    /// Reads one byte, retrying on empty reads. `None` once the session
    /// is closed.
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            if self.buffer.is_closed() {
                return Ok(None);
            }
            if self.reader.read(&mut byte)? == 1 {
                return Ok(Some(byte[0]));
            }
        }
    }

    /// Reads the frame following a marker and queues it for dispatch.
    /// Returns false if the session closed mid-frame.
    fn read_notification(&mut self, ports: u8) -> io::Result<bool> {
        let len = NotificationFrame::body_len(ports);
        let mut body = Vec::with_capacity(len);
        while body.len() < len {
            match self.next_byte()? {
                Some(byte) => body.push(byte),
                None => return Ok(false),
            }
        }
        match NotificationFrame::parse(&body, ports) {
            Some(frame) => {
                trace!("Notification: {:?}", frame);
                if self.frames.send(frame).is_err() {
                    debug!("Event dispatcher gone, dropping {:?}", frame);
                }
            }
            None => warn!(
                "Discarding malformed notification frame: {:?}",
                String::from_utf8_lossy(&body)
            ),
        }
        Ok(true)
    }
}
