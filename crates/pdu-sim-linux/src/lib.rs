//! Concrete Linux implementations of the `pdu-sim-core` HAL traits: an
//! RS422 serial transport over a `serialport` handle, and an MCP23017
//! expander bank plus ADC reader over a Linux `/dev/i2c-*` bus.
//!
//! Mirrors the shape this corpus already uses for its network driver: a
//! struct wraps the OS handle, a constructor opens it and maps open failures
//! into the crate's error type, and the trait impl maps per-call I/O errors
//! the same way (a timeout is not a fault; anything else is).

use std::collections::HashMap;
use std::time::Duration;

use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;
use log::warn;
use serialport::SerialPort;

use pdu_sim_core::error::PduError;
use pdu_sim_core::hal::{GpioExpanderDriver, SerialTransport};

/// RS422 link over a Linux serial device.
pub struct Rs422Port {
    port: Box<dyn SerialPort>,
}

impl Rs422Port {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, PduError> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(200))
            .open()
            .map_err(|err| {
                warn!("failed to open serial port {path}: {err}");
                PduError::TransportFault
            })?;
        Ok(Self { port })
    }
}

impl SerialTransport for Rs422Port {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, PduError> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(_) => Err(PduError::TransportFault),
        }
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), PduError> {
        self.port.write_all(frame).map_err(|_| PduError::TransportFault)
    }
}

const REG_IODIRA: u8 = 0x00;
const REG_IODIRB: u8 = 0x01;
const REG_OLATA: u8 = 0x14;
const REG_OLATB: u8 = 0x15;

/// I2C address of the ADC used for channel sampling. No ADC part number is
/// specified by the interface this crate targets; this assumes a single
/// address-mapped device taking a one-byte channel select and returning a
/// big-endian sample, the common shape for this class of part. See DESIGN.md.
const ADC_I2C_ADDRESS: u8 = 0x48;

/// An MCP23017's IODIR/OLAT registers, shadowed in memory because the chip
/// only exposes whole-byte writes and this driver changes one pin at a time.
#[derive(Clone, Copy)]
struct ExpanderShadow {
    iodir: [u8; 2],
    olat: [u8; 2],
}

impl Default for ExpanderShadow {
    fn default() -> Self {
        // Reset default: every pin an input, every latch low.
        Self { iodir: [0xFF, 0xFF], olat: [0x00, 0x00] }
    }
}

/// Six MCP23017 expanders and one ADC, all on the same I2C bus.
pub struct I2cExpanderBank {
    bus: I2cdev,
    shadows: HashMap<u8, ExpanderShadow>,
}

impl I2cExpanderBank {
    pub fn open(bus_path: &str) -> Result<Self, PduError> {
        let bus = I2cdev::new(bus_path).map_err(|err| {
            warn!("failed to open i2c bus {bus_path}: {err}");
            PduError::HardwareFault
        })?;
        Ok(Self { bus, shadows: HashMap::new() })
    }

    fn shadow_mut(&mut self, expander_address: u8) -> &mut ExpanderShadow {
        self.shadows.entry(expander_address).or_default()
    }

    fn port_and_bit(pin: u8) -> (usize, u8) {
        ((pin / 8) as usize, pin % 8)
    }
}

impl GpioExpanderDriver for I2cExpanderBank {
    fn configure_pin_as_output(&mut self, expander_address: u8, pin: u8) -> Result<(), PduError> {
        let (port, bit) = Self::port_and_bit(pin);
        let shadow = self.shadow_mut(expander_address);
        shadow.iodir[port] &= !(1 << bit);
        let value = shadow.iodir[port];
        let register = if port == 0 { REG_IODIRA } else { REG_IODIRB };
        self.bus.write(expander_address, &[register, value]).map_err(|_| PduError::HardwareFault)
    }

    fn write_pin(&mut self, expander_address: u8, pin: u8, level: bool) -> Result<(), PduError> {
        let (port, bit) = Self::port_and_bit(pin);
        let shadow = self.shadow_mut(expander_address);
        if level {
            shadow.olat[port] |= 1 << bit;
        } else {
            shadow.olat[port] &= !(1 << bit);
        }
        let value = shadow.olat[port];
        let register = if port == 0 { REG_OLATA } else { REG_OLATB };
        self.bus.write(expander_address, &[register, value]).map_err(|_| PduError::HardwareFault)
    }

    fn read_adc(&mut self, channel_index: usize) -> Result<u16, PduError> {
        let mut sample = [0u8; 2];
        self.bus
            .write_read(ADC_I2C_ADDRESS, &[channel_index as u8], &mut sample)
            .map_err(|_| PduError::HardwareFault)?;
        Ok(u16::from_be_bytes(sample) & 0x0FFF)
    }
}
