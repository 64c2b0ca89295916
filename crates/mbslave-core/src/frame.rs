//! Transport-neutral frame contract.
//!
//! Everything above this layer (accessors, dispatch, handlers, tracing)
//! is written against [`Frame`] only. RTU and TCP are the two shipped
//! implementations; a new transport plugs in by implementing the trait.

use crate::exception::{Exception, EXCEPTION_BIT};
use std::fmt;

/// One wire-encoded Modbus message.
pub trait Frame: fmt::Debug + Send + Sync {
    /// Full wire encoding, including transport header and trailer.
    fn bytes(&self) -> Vec<u8>;

    /// Independent deep copy.
    fn copy(&self) -> Box<dyn Frame>;

    /// Payload following the function code.
    fn data(&self) -> &[u8];

    /// Replace the payload, keeping transport fields consistent.
    fn set_data(&mut self, data: Vec<u8>);

    /// Function code byte.
    fn function(&self) -> u8;

    /// Replace the function code byte.
    fn set_function(&mut self, function: u8);

    /// Unit / slave identifier carried by the frame.
    fn address(&self) -> u8;

    /// Short transport name used in traces (e.g. `"RTUFrame"`).
    fn kind(&self) -> &'static str;

    /// Transport-specific header/trailer fields, in wire order, for traces.
    fn header_fields(&self) -> Vec<(&'static str, u16)>;

    /// Turn this frame into an exception response.
    ///
    /// Sets the high bit of the function code and replaces the payload with
    /// the single exception byte.
    fn set_exception(&mut self, exception: Exception) {
        self.set_function(self.function() | EXCEPTION_BIT);
        self.set_data(vec![exception.code()]);
    }
}

impl Clone for Box<dyn Frame> {
    fn clone(&self) -> Self {
        self.copy()
    }
}

/// Exception carried by a response frame, or `Success` if there is none.
///
/// An exception frame with a missing, zero or unknown code byte is
/// reported as `SlaveDeviceFailure`.
#[must_use]
pub fn get_exception(frame: &dyn Frame) -> Exception {
    if frame.function() & EXCEPTION_BIT == 0 {
        return Exception::Success;
    }
    frame
        .data()
        .first()
        .and_then(|&code| Exception::from_byte(code))
        .filter(|exception| !exception.is_success())
        .unwrap_or(Exception::SlaveDeviceFailure)
}
