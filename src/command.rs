//! Request/response exchanges with the device.
//!
//! Every query is echoed by the device, followed by an optional response
//! line and the `>` prompt:
//!
//! ```text
//! gpio readall<eol>0000ffff<eol>>
//! ```

use crate::consts::{self, query};
use crate::error::{unexpected_response, Error, Result};
use crate::gpio::parse_hex;
use crate::handoff::HandoffBuffer;
use crate::transport::Transport;
use log::{debug, trace};
use std::sync::Arc;

/// Line ending sequence used by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    CrLf,
    LfCr,
    Cr,
    Lf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::CrLf => b"\r\n",
            LineEnding::LfCr => b"\n\r",
            LineEnding::Cr => b"\r",
            LineEnding::Lf => b"\n",
        }
    }

    /// Derives the line ending from the two bytes preceding a prompt. If
    /// the first is CR or LF, both form the line ending; otherwise the
    /// second one alone does.
    pub fn from_tail(first: u8, second: u8) -> Option<Self> {
        match (first, second) {
            (b'\r', b'\n') => Some(LineEnding::CrLf),
            (b'\n', b'\r') => Some(LineEnding::LfCr),
            (b'\r' | b'\n', _) => None,
            (_, b'\r') => Some(LineEnding::Cr),
            (_, b'\n') => Some(LineEnding::Lf),
            _ => None,
        }
    }
}

/// Serializes queries over the transport and parses responses out of the
/// handoff buffer. Owned by the session state, so its lock guards every
/// exchange.
pub(crate) struct CommandEngine {
    writer: Option<Box<dyn Transport>>,
    buffer: Arc<HandoffBuffer>,
    eol: LineEnding,
}

impl CommandEngine {
    pub(crate) fn new(writer: Box<dyn Transport>, buffer: Arc<HandoffBuffer>) -> Self {
        Self {
            writer: Some(writer),
            buffer,
            eol: LineEnding::default(),
        }
    }

    pub(crate) fn line_ending(&self) -> LineEnding {
        self.eol
    }

    pub(crate) fn is_open(&self) -> bool {
        self.writer.is_some() && !self.buffer.is_closed()
    }

    /// Closes and drops the write handle, then closes the buffer.
    /// Idempotent.
    pub(crate) fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            writer.close();
        }
        self.buffer.close();
    }

    fn write_query(&mut self, text: &str) -> Result<()> {
        if self.buffer.is_closed() {
            return Err(Error::TransportClosed);
        }
        let writer = self.writer.as_mut().ok_or(Error::TransportClosed)?;
        trace!("Query: {:?}", text);
        let line = format!("{}{}", text, consts::QUERY_TERMINATOR);
        if let Err(e) = writer.write_all(line.as_bytes()) {
            self.close();
            return Err(Error::Transport(e));
        }
        Ok(())
    }

    /// Writes `text` and verifies the device's echo.
    pub(crate) fn query(&mut self, text: &str) -> Result<()> {
        self.write_query(text)?;
        let eol = self.eol.as_bytes();
        let echo = self.buffer.take_exactly(text.len() + eol.len())?;
        let mut expected = text.as_bytes().to_vec();
        expected.extend_from_slice(eol);
        if !echo.eq_ignore_ascii_case(&expected) {
            // The next query must start on a fresh reply.
            if !echo.contains(&consts::PROMPT) {
                self.skip_to_prompt()?;
            }
            return Err(Error::QueryEcho {
                query: text.to_string(),
                echo: String::from_utf8_lossy(&echo).into_owned(),
            });
        }
        Ok(())
    }

    /// Discards bytes up to and including the next prompt.
    fn skip_to_prompt(&mut self) -> Result<()> {
        let mut skipped = 0usize;
        while self.buffer.take_byte()? != consts::PROMPT {
            skipped += 1;
        }
        trace!("Skipped {} bytes up to the prompt", skipped);
        Ok(())
    }

    /// Reads up to the prompt, stripping line endings. If `expected` is
    /// given, the response must match it case-insensitively.
    pub(crate) fn read_response(&mut self, text: &str, expected: Option<&str>) -> Result<String> {
        let eol = self.eol.as_bytes();
        let mut response = Vec::new();
        loop {
            let byte = self.buffer.take_byte()?;
            if byte == consts::PROMPT {
                break;
            }
            response.push(byte);
            if response.ends_with(eol) {
                response.truncate(response.len() - eol.len());
            }
        }
        let response = String::from_utf8_lossy(&response).into_owned();
        trace!("Response to {:?}: {:?}", text, response);
        if let Some(expected) = expected {
            if !response.eq_ignore_ascii_case(expected) {
                return Err(unexpected_response(text, response, format!("'{}'", expected)));
            }
        }
        Ok(response)
    }

    /// Query followed by a response read.
    pub(crate) fn query_string(&mut self, text: &str) -> Result<String> {
        self.query(text)?;
        self.read_response(text, None)
    }

    /// Query whose response must equal `expected`.
    pub(crate) fn query_expect(&mut self, text: &str, expected: &str) -> Result<()> {
        self.query(text)?;
        self.read_response(text, Some(expected)).map(|_| ())
    }

    /// Query whose response is a `bits / 4` digit hex integer.
    pub(crate) fn read_int(&mut self, text: &str, bits: u8) -> Result<u128> {
        let response = self.query_string(text)?;
        parse_hex(response.as_bytes(), bits).ok_or_else(|| {
            unexpected_response(
                text,
                response,
                format!("{} bit hexadecimal integer", bits),
            )
        })
    }

    /// Determines the device's line ending from the `id get` response.
    /// Must run while notifications are off, since frames would otherwise
    /// be taken for response bytes.
    pub(crate) fn detect_line_ending(&mut self, notify_enabled: bool) -> Result<LineEnding> {
        if notify_enabled {
            return Err(Error::EolDetectionWhileNotifying);
        }
        let text = query::ID_GET;
        self.write_query(text)?;
        let mut raw = Vec::new();
        loop {
            let byte = self.buffer.take_byte()?;
            if byte == consts::PROMPT {
                break;
            }
            raw.push(byte);
        }
        trace!("Raw response to {:?}: {:02X?}", text, raw);
        let eol = match raw.as_slice() {
            [.., first, second] => LineEnding::from_tail(*first, *second),
            _ => None,
        }
        .ok_or_else(|| {
            unexpected_response(
                text,
                String::from_utf8_lossy(&raw),
                "a response terminated by a line ending",
            )
        })?;
        let echo_len = text.len() + eol.as_bytes().len();
        let echo_ok = raw.len() >= echo_len
            && raw[..text.len()].eq_ignore_ascii_case(text.as_bytes())
            && &raw[text.len()..echo_len] == eol.as_bytes();
        if !echo_ok {
            return Err(Error::QueryEcho {
                query: text.to_string(),
                echo: String::from_utf8_lossy(&raw).into_owned(),
            });
        }
        debug!("Detected line ending {:?}", eol);
        self.eol = eol;
        Ok(eol)
    }
}
