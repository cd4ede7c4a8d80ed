use core::fmt;

/// Portable error type for the PDU simulator core.
///
/// Command-level variants (everything up to and including `UnknownLogicalUnit`)
/// never terminate an endpoint; they are mapped to a status byte in the response
/// payload and bump a counter in `Status`. `HardwareFault` and `TransportFault`
/// are endpoint/driver-level and are logged rather than answered synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduError {
    /// Decoder-level structural failure (bad length, bad delimiter).
    MalformedFrame,
    /// Valid structure, unrecognized Message ID.
    UnknownMessage,
    /// The requested mode transition is not one of the edges in the state machine.
    InvalidStateTransition,
    /// A line transition was requested outside of Operate/Maintenance (I2).
    LineTransitionForbidden,
    /// Logical Unit ID outside 0..=8.
    UnknownLogicalUnit,
    /// An I2C/GPIO operation on the expander bus failed.
    HardwareFault,
    /// The underlying socket/serial transport failed.
    TransportFault,
}

impl PduError {
    /// The one-octet status code this error maps to in a response payload.
    pub const fn status_code(self) -> u8 {
        match self {
            PduError::MalformedFrame => 0x05,
            PduError::UnknownMessage => 0x04,
            PduError::InvalidStateTransition => 0x01,
            PduError::LineTransitionForbidden => 0x02,
            PduError::UnknownLogicalUnit => 0x03,
            // HardwareFault and TransportFault never reach the wire; 0xFF is a
            // defensive placeholder should a caller serialize one by mistake.
            PduError::HardwareFault | PduError::TransportFault => 0xFF,
        }
    }
}

impl fmt::Display for PduError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PduError::MalformedFrame => write!(f, "malformed frame"),
            PduError::UnknownMessage => write!(f, "unrecognized message id"),
            PduError::InvalidStateTransition => write!(f, "invalid mode state transition"),
            PduError::LineTransitionForbidden => write!(f, "line transition forbidden in current mode"),
            PduError::UnknownLogicalUnit => write!(f, "unknown logical unit id"),
            PduError::HardwareFault => write!(f, "gpio/i2c hardware fault"),
            PduError::TransportFault => write!(f, "transport i/o fault"),
        }
    }
}

impl std::error::Error for PduError {}

impl From<std::io::Error> for PduError {
    fn from(_: std::io::Error) -> Self {
        PduError::TransportFault
    }
}
