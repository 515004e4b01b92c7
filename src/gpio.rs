use crate::error::{Error, Result};

/// Direction of a port. Encoded as a 1 bit (input) or 0 bit (output) in `iodir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioLevel {
    Low,
    High,
}

/// Edge filter for event detection callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Edge {
    /// Low to high transitions only.
    Rising,
    /// High to low transitions only.
    Falling,
    #[default]
    Both,
}

impl GpioLevel {
    #[inline]
    pub fn is_high(self) -> bool {
        self == GpioLevel::High
    }
}

impl From<bool> for GpioLevel {
    fn from(high: bool) -> Self {
        if high {
            GpioLevel::High
        } else {
            GpioLevel::Low
        }
    }
}

impl From<GpioLevel> for bool {
    fn from(level: GpioLevel) -> Self {
        level.is_high()
    }
}

impl Edge {
    /// Returns true if a transition to `level` passes this filter.
    #[inline]
    pub fn matches(self, level: GpioLevel) -> bool {
        match self {
            Edge::Rising => level == GpioLevel::High,
            Edge::Falling => level == GpioLevel::Low,
            Edge::Both => true,
        }
    }
}

// --- Bitmask helpers ---

/// Bitmask with the lowest `ports` bits set.
#[inline]
pub(crate) fn all_ones(ports: u8) -> u128 {
    if ports >= 128 {
        u128::MAX
    } else {
        (1u128 << ports) - 1
    }
}

#[inline]
pub(crate) fn port_mask(port: u8) -> u128 {
    1u128 << port
}

#[inline]
pub(crate) fn bit(value: u128, port: u8) -> GpioLevel {
    GpioLevel::from(value & port_mask(port) != 0)
}

#[inline]
pub(crate) fn with_bit(value: u128, port: u8, set: bool) -> u128 {
    if set {
        value | port_mask(port)
    } else {
        value & !port_mask(port)
    }
}

pub(crate) fn check_port(port: u8, ports: u8) -> Result<()> {
    if port < ports {
        Ok(())
    } else {
        Err(Error::PortOutOfRange { port, ports })
    }
}

/// Formats a bitmask as exactly `ports / 4` lowercase hex digits.
pub(crate) fn format_hex(value: u128, ports: u8) -> String {
    let digits = usize::from(ports) / 4;
    format!("{:0width$x}", value & all_ones(ports), width = digits)
}

/// Parses a field of exactly `bits / 4` hex digits. Returns `None` on
/// length mismatch or non-hex content.
pub(crate) fn parse_hex(text: &[u8], bits: u8) -> Option<u128> {
    if text.len() != usize::from(bits) / 4 || !text.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(text).ok()?;
    u128::from_str_radix(text, 16).ok()
}
