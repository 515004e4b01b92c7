//! Fixed properties of the supported Numato USB GPIO device variants.

use crate::error::{Error, Result};

/// Immutable capability description of one device variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Human readable product name.
    pub name: &'static str,
    /// Product documentation page.
    pub url: &'static str,
    /// Number of GPIO ports (8, 16, 32, 64 or 128).
    pub ports: u8,
    /// Whether the firmware implements `gpio notify`.
    pub supports_notification: bool,
    /// ADC resolution in bits.
    pub adc_resolution_bits: u8,
    /// Digits used when formatting an ADC port number in a query.
    pub adc_port_digits: usize,
    /// ADC capable ports and their labels, ordered by port.
    pub adc_ports: &'static [(u8, &'static str)],
}

impl DeviceSpec {
    /// Number of hex digits of every bitmask field (`ports / 4`).
    #[inline]
    pub fn hex_digits(&self) -> usize {
        usize::from(self.ports) / 4
    }

    /// Returns true if `port` can be used with `adc_read`.
    pub fn is_adc_port(&self, port: u8) -> bool {
        self.adc_ports.iter().any(|&(p, _)| p == port)
    }

    /// Returns the label of an ADC capable port (e.g. `"ADC4"`).
    pub fn adc_label(&self, port: u8) -> Option<&'static str> {
        self.adc_ports
            .iter()
            .find(|&&(p, _)| p == port)
            .map(|&(_, label)| label)
    }

    /// ADC capable port numbers.
    pub fn adc_port_numbers(&self) -> Vec<u8> {
        self.adc_ports.iter().map(|&(p, _)| p).collect()
    }

    /// Largest raw value the ADC can report.
    #[inline]
    pub fn adc_max(&self) -> u16 {
        (1u16 << self.adc_resolution_bits) - 1
    }

    /// Converts a raw ADC reading into volts for the given reference voltage.
    pub fn adc_voltage(&self, raw: u16, reference_volts: f64) -> f64 {
        f64::from(raw) * reference_volts / f64::from(self.adc_max())
    }
}

/// The supported device variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    UsbGpio8,
    UsbGpio16,
    UsbGpio32,
    UsbGpio64,
    UsbGpio128,
}

const ADC_PORTS_8: &[(u8, &str)] = &[
    (0, "ADC0"),
    (1, "ADC1"),
    (2, "ADC2"),
    (3, "ADC3"),
    (6, "ADC4"),
    (7, "ADC5"),
];

const ADC_PORTS_16: &[(u8, &str)] = &[
    (0, "ADC0"),
    (1, "ADC1"),
    (2, "ADC2"),
    (3, "ADC3"),
    (4, "ADC4"),
    (5, "ADC5"),
    (6, "ADC6"),
];

const ADC_PORTS_32: &[(u8, &str)] = &[
    (1, "ADC1"),
    (2, "ADC2"),
    (3, "ADC3"),
    (4, "ADC4"),
    (5, "ADC5"),
    (6, "ADC6"),
    (7, "ADC7"),
];

// Ports 0-31 double as ADC0-ADC31 on the large boards.
const ADC_PORTS_WIDE: &[(u8, &str)] = &[
    (0, "ADC0"),
    (1, "ADC1"),
    (2, "ADC2"),
    (3, "ADC3"),
    (4, "ADC4"),
    (5, "ADC5"),
    (6, "ADC6"),
    (7, "ADC7"),
    (8, "ADC8"),
    (9, "ADC9"),
    (10, "ADC10"),
    (11, "ADC11"),
    (12, "ADC12"),
    (13, "ADC13"),
    (14, "ADC14"),
    (15, "ADC15"),
    (16, "ADC16"),
    (17, "ADC17"),
    (18, "ADC18"),
    (19, "ADC19"),
    (20, "ADC20"),
    (21, "ADC21"),
    (22, "ADC22"),
    (23, "ADC23"),
    (24, "ADC24"),
    (25, "ADC25"),
    (26, "ADC26"),
    (27, "ADC27"),
    (28, "ADC28"),
    (29, "ADC29"),
    (30, "ADC30"),
    (31, "ADC31"),
];

static USB_GPIO_8: DeviceSpec = DeviceSpec {
    name: "8 Channel USB GPIO Module With Analog Inputs",
    url: "https://numato.com/docs/8-channel-usb-gpio-module-with-analog-inputs",
    ports: 8,
    supports_notification: false,
    adc_resolution_bits: 10,
    adc_port_digits: 1,
    adc_ports: ADC_PORTS_8,
};

static USB_GPIO_16: DeviceSpec = DeviceSpec {
    name: "16 Channel USB GPIO Module With Analog Inputs",
    url: "https://numato.com/docs/16-channel-usb-gpio-module-with-analog-inputs",
    ports: 16,
    supports_notification: true,
    adc_resolution_bits: 10,
    adc_port_digits: 1,
    adc_ports: ADC_PORTS_16,
};

static USB_GPIO_32: DeviceSpec = DeviceSpec {
    name: "32 Channel USB GPIO Module With Analog Inputs",
    url: "https://numato.com/docs/32-channel-usb-gpio-module-with-analog-inputs",
    ports: 32,
    supports_notification: true,
    adc_resolution_bits: 10,
    adc_port_digits: 1,
    adc_ports: ADC_PORTS_32,
};

static USB_GPIO_64: DeviceSpec = DeviceSpec {
    name: "64 Channel USB GPIO Module With Analog Inputs",
    url: "https://numato.com/docs/64-channel-usb-gpio-module-analog-inputs",
    ports: 64,
    supports_notification: true,
    adc_resolution_bits: 10,
    adc_port_digits: 2,
    adc_ports: ADC_PORTS_WIDE,
};

static USB_GPIO_128: DeviceSpec = DeviceSpec {
    name: "128 Channel USB GPIO Module With Analog Inputs",
    url: "https://numato.com/docs/128-channel-usb-gpio-module-with-analog-inputs",
    ports: 128,
    supports_notification: true,
    adc_resolution_bits: 10,
    adc_port_digits: 2,
    adc_ports: ADC_PORTS_WIDE,
};

impl DeviceType {
    /// All supported variants, smallest first.
    pub const ALL: [DeviceType; 5] = [
        DeviceType::UsbGpio8,
        DeviceType::UsbGpio16,
        DeviceType::UsbGpio32,
        DeviceType::UsbGpio64,
        DeviceType::UsbGpio128,
    ];

    /// The capability description of this variant.
    pub fn spec(self) -> &'static DeviceSpec {
        match self {
            DeviceType::UsbGpio8 => &USB_GPIO_8,
            DeviceType::UsbGpio16 => &USB_GPIO_16,
            DeviceType::UsbGpio32 => &USB_GPIO_32,
            DeviceType::UsbGpio64 => &USB_GPIO_64,
            DeviceType::UsbGpio128 => &USB_GPIO_128,
        }
    }
}

/// Port counts of all supported devices.
pub const SUPPORTED_PORT_COUNTS: [u8; 5] = [8, 16, 32, 64, 128];

/// Looks up the device variant with `ports` ports.
pub fn spec_for_port_count(ports: usize) -> Result<&'static DeviceSpec> {
    DeviceType::ALL
        .iter()
        .map(|t| t.spec())
        .find(|spec| usize::from(spec.ports) == ports)
        .ok_or(Error::UnknownDevice { ports })
}
