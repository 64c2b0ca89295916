//! Modbus TCP frame: MBAP header followed by function code and data.
//!
//! ```text
//! [transaction:2][protocol:2][length:2][unit:1][function:1][data:length-2]
//! ```

use crate::frame::Frame;
use mbslave_common::error::{SlaveError, SlaveResult};

/// MBAP header size in bytes, including the unit identifier.
pub const MBAP_HEADER_SIZE: usize = 7;

/// Largest `length` field accepted for reassembly: unit, function code,
/// a write-multiple header and a full 255-byte value block. Oversized
/// quantities are left to the handlers to reject.
const MAX_LENGTH: u16 = 2 + 5 + 255;

/// Modbus TCP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpFrame {
    /// Transaction identifier (echoed by the slave).
    transaction_id: u16,
    /// Protocol identifier (0 for Modbus).
    protocol_id: u16,
    /// Byte count of unit, function code and data.
    length: u16,
    /// Unit identifier.
    unit_id: u8,
    /// Function code.
    function: u8,
    /// Payload after the function code.
    data: Vec<u8>,
}

impl TcpFrame {
    /// Smallest legal frame: MBAP header plus function code.
    pub const MIN_SIZE: usize = MBAP_HEADER_SIZE + 1;

    /// Build a frame with protocol identifier 0 and a consistent length.
    #[must_use]
    pub fn new(transaction_id: u16, unit_id: u8, function: u8, data: Vec<u8>) -> Self {
        Self {
            transaction_id,
            protocol_id: 0,
            length: pdu_length(&data),
            unit_id,
            function,
            data,
        }
    }

    /// Decode one complete MBAP frame.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::Frame`] if the packet is shorter than
    /// [`Self::MIN_SIZE`] or the header length disagrees with the packet.
    pub fn decode(packet: &[u8]) -> SlaveResult<Self> {
        if packet.len() < Self::MIN_SIZE {
            return Err(SlaveError::Frame(format!(
                "TCP frame too short: {} bytes",
                packet.len()
            )));
        }

        let length = u16::from_be_bytes([packet[4], packet[5]]);
        if usize::from(length) != packet.len() - 6 {
            return Err(SlaveError::Frame(format!(
                "MBAP length {length} does not match {} trailing bytes",
                packet.len() - 6
            )));
        }

        Ok(Self {
            transaction_id: u16::from_be_bytes([packet[0], packet[1]]),
            protocol_id: u16::from_be_bytes([packet[2], packet[3]]),
            length,
            unit_id: packet[6],
            function: packet[7],
            data: packet[8..].to_vec(),
        })
    }

    /// Transaction identifier.
    #[must_use]
    pub fn transaction_id(&self) -> u16 {
        self.transaction_id
    }

    /// Protocol identifier.
    #[must_use]
    pub fn protocol_id(&self) -> u16 {
        self.protocol_id
    }

    /// MBAP length field.
    #[must_use]
    pub fn length(&self) -> u16 {
        self.length
    }
}

#[allow(clippy::cast_possible_truncation)]
fn pdu_length(data: &[u8]) -> u16 {
    // unit + function + data; payloads never approach u16::MAX
    (2 + data.len()) as u16
}

impl Frame for TcpFrame {
    fn bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MBAP_HEADER_SIZE + 1 + self.data.len());
        bytes.extend_from_slice(&self.transaction_id.to_be_bytes());
        bytes.extend_from_slice(&self.protocol_id.to_be_bytes());
        bytes.extend_from_slice(&self.length.to_be_bytes());
        bytes.push(self.unit_id);
        bytes.push(self.function);
        bytes.extend_from_slice(&self.data);
        bytes
    }

    fn copy(&self) -> Box<dyn Frame> {
        Box::new(self.clone())
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn set_data(&mut self, data: Vec<u8>) {
        self.length = pdu_length(&data);
        self.data = data;
    }

    fn function(&self) -> u8 {
        self.function
    }

    fn set_function(&mut self, function: u8) {
        self.function = function;
    }

    fn address(&self) -> u8 {
        self.unit_id
    }

    fn kind(&self) -> &'static str {
        "TCPFrame"
    }

    fn header_fields(&self) -> Vec<(&'static str, u16)> {
        vec![
            ("TransactionIdentifier", self.transaction_id),
            ("ProtocolIdentifier", self.protocol_id),
            ("Length", self.length),
        ]
    }
}

/// Size of the first complete MBAP frame buffered in `buf`.
///
/// Returns `Ok(None)` until the header and the announced body have arrived.
///
/// # Errors
///
/// Returns [`SlaveError::Frame`] if the header cannot start a valid frame
/// (non-zero protocol identifier or an out-of-range length); the stream
/// cannot be resynchronized after that.
pub fn split_frame(buf: &[u8]) -> SlaveResult<Option<usize>> {
    if buf.len() < 6 {
        return Ok(None);
    }

    let protocol_id = u16::from_be_bytes([buf[2], buf[3]]);
    if protocol_id != 0 {
        return Err(SlaveError::Frame(format!(
            "invalid protocol ID: {protocol_id}"
        )));
    }

    let length = u16::from_be_bytes([buf[4], buf[5]]);
    if !(2..=MAX_LENGTH).contains(&length) {
        return Err(SlaveError::Frame(format!("invalid MBAP length: {length}")));
    }

    let total = 6 + usize::from(length);
    Ok((buf.len() >= total).then_some(total))
}
