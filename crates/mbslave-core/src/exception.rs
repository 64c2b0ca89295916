//! Modbus exception codes.
//!
//! A response signals an exception by setting [`EXCEPTION_BIT`] on the
//! request's function code and carrying the one-byte code as its payload.

use std::fmt;

/// High bit of the function code that marks an exception response.
pub const EXCEPTION_BIT: u8 = 0x80;

/// Modbus exception codes, plus `Success` for "no exception".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Exception {
    /// No exception; never serialized.
    #[default]
    Success = 0x00,
    /// Function code not supported by this slave.
    IllegalFunction = 0x01,
    /// Address or address range outside the bank.
    IllegalDataAddress = 0x02,
    /// Quantity or value outside what the function allows.
    IllegalDataValue = 0x03,
    /// Unrecoverable error while serving the request.
    SlaveDeviceFailure = 0x04,
    /// Request accepted, processing takes a while.
    Acknowledge = 0x05,
    /// Slave busy with a long-running command.
    SlaveDeviceBusy = 0x06,
    /// Program function cannot be performed.
    NegativeAcknowledge = 0x07,
    /// Parity error in extended memory.
    MemoryParityError = 0x08,
    /// Gateway could not allocate a path.
    GatewayPathUnavailable = 0x0A,
    /// Gateway target device did not respond.
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl Exception {
    /// Parse an exception code from a byte value.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::SlaveDeviceFailure),
            0x05 => Some(Self::Acknowledge),
            0x06 => Some(Self::SlaveDeviceBusy),
            0x07 => Some(Self::NegativeAcknowledge),
            0x08 => Some(Self::MemoryParityError),
            0x0A => Some(Self::GatewayPathUnavailable),
            0x0B => Some(Self::GatewayTargetDeviceFailedToRespond),
            _ => None,
        }
    }

    /// Wire value of the exception.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether this is the "no exception" sentinel.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::IllegalFunction => write!(f, "Illegal Function"),
            Self::IllegalDataAddress => write!(f, "Illegal Data Address"),
            Self::IllegalDataValue => write!(f, "Illegal Data Value"),
            Self::SlaveDeviceFailure => write!(f, "Slave Device Failure"),
            Self::Acknowledge => write!(f, "Acknowledge"),
            Self::SlaveDeviceBusy => write!(f, "Slave Device Busy"),
            Self::NegativeAcknowledge => write!(f, "Negative Acknowledge"),
            Self::MemoryParityError => write!(f, "Memory Parity Error"),
            Self::GatewayPathUnavailable => write!(f, "Gateway Path Unavailable"),
            Self::GatewayTargetDeviceFailedToRespond => {
                write!(f, "Gateway Target Device Failed to Respond")
            }
        }
    }
}
