//! Hardware Abstraction Layer traits (§6): the seam the concrete driver
//! crate implements so the protocol core stays free of any device dependency.
//! Mirrors the blocking, buffer-based style this corpus already uses for its
//! network interface abstraction.

use crate::error::PduError;

/// Abstracts one RS422 serial device.
pub trait SerialTransport {
    /// Reads whatever is available into `buffer`, blocking up to the
    /// transport's configured poll timeout. `Ok(0)` means the poll elapsed
    /// with nothing to read, not end-of-stream (§4.5's soft read timeout).
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, PduError>;

    /// Writes the entirety of `frame`, blocking until done.
    fn write(&mut self, frame: &[u8]) -> Result<(), PduError>;
}

/// Abstracts the six MCP23017 GPIO expanders and the ADC sampling path (§6).
pub trait GpioExpanderDriver {
    /// Configures `pin` on the expander at `expander_address` as an output.
    /// Called once per wired pin during projector startup.
    fn configure_pin_as_output(&mut self, expander_address: u8, pin: u8) -> Result<(), PduError>;

    /// Drives `pin` on the expander at `expander_address` to `level`
    /// (`true` = logic high). Polarity inversion (§4.6) is the caller's
    /// responsibility; this trait only moves the requested level.
    fn write_pin(&mut self, expander_address: u8, pin: u8, level: bool) -> Result<(), PduError>;

    /// Samples ADC channel `channel_index`, returning a 12-bit unsigned count.
    fn read_adc(&mut self, channel_index: usize) -> Result<u16, PduError>;
}
