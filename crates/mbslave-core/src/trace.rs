//! Human-readable frame dumps for the trace sink.

use crate::accessors::register_address_and_number;
use crate::frame::Frame;
use crate::function::{function_name, FunctionCode};
use std::fmt::Write as _;
use std::time::SystemTime;

/// Marker pushed before a request dump.
pub const REQUEST_MARKER: &str = "<<--Request<<--";

/// Marker pushed before a response dump.
pub const RESPONSE_MARKER: &str = "-->>Response-->>";

/// Multi-line description of `frame` as seen at `time`.
#[must_use]
pub fn frame_to_string(frame: &dyn Frame, time: SystemTime) -> String {
    let mut msg = String::new();
    let _ = write!(msg, "\nTime : {}", humantime::format_rfc3339_micros(time));

    msg.push_str("\nBytes : ");
    for byte in frame.bytes() {
        let _ = write!(msg, " {byte:02x}");
    }

    let function = frame.function();
    let _ = write!(msg, "\nFunctionCode : {function}");
    let _ = write!(msg, "\nFunctionName : {}", function_name(function));
    let _ = write!(msg, "\nAddress : {}", frame.address());

    let _ = write!(msg, "\n{}", frame.kind());
    for (name, value) in frame.header_fields() {
        let _ = write!(msg, "\n{name} : {value}");
    }

    if FunctionCode::from_byte(function).is_some_and(FunctionCode::is_read) {
        if let Ok(range) = register_address_and_number(frame) {
            let _ = write!(msg, "\nStart-Register  {}", range.register);
            let _ = write!(msg, "\nNumber of Registers  {}", range.count);
        }
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtu::RtuFrame;
    use crate::tcp::TcpFrame;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_rtu_dump() {
        let frame = RtuFrame::new(1, 0x03, vec![0x00, 0x00, 0x00, 0x0A]);
        let dump = frame_to_string(&frame, UNIX_EPOCH + Duration::from_secs(1));

        assert!(dump.contains("Time : 1970-01-01T00:00:01.000000Z"));
        assert!(dump.contains("Bytes :  01 03 00 00 00 0a c5 cd"));
        assert!(dump.contains("FunctionCode : 3"));
        assert!(dump.contains("FunctionName : Read Holding Registers"));
        assert!(dump.contains("Address : 1"));
        assert!(dump.contains("\nRTUFrame"));
        assert!(dump.contains("CRC : 52677"));
        assert!(dump.contains("Start-Register  0"));
        assert!(dump.contains("Number of Registers  10"));
    }

    #[test]
    fn test_tcp_dump() {
        let frame = TcpFrame::new(9, 17, 0x06, vec![0x00, 0x0A, 0x12, 0x34]);
        let dump = frame_to_string(&frame, SystemTime::now());

        assert!(dump.contains("\nTCPFrame"));
        assert!(dump.contains("TransactionIdentifier : 9"));
        assert!(dump.contains("ProtocolIdentifier : 0"));
        assert!(dump.contains("Length : 6"));
        assert!(dump.contains("Address : 17"));
        assert!(!dump.contains("Start-Register"));
    }

    #[test]
    fn test_exception_dump() {
        let mut frame = TcpFrame::new(1, 1, 0x03, vec![0x00, 0x00, 0x00, 0x01]);
        frame.set_exception(crate::exception::Exception::IllegalDataAddress);
        let dump = frame_to_string(&frame, SystemTime::now());
        assert!(dump.contains("FunctionCode : 131"));
        assert!(dump.contains("(Exception)"));
        assert!(!dump.contains("Start-Register"));
    }
}
