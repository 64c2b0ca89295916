//! Modbus RTU frame: `[unit][function][data..][crc lo][crc hi]`.

use crate::crc::crc16;
use crate::frame::Frame;
use mbslave_common::error::{SlaveError, SlaveResult};

/// Modbus RTU frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtuFrame {
    /// Unit (slave) identifier.
    address: u8,
    /// Function code.
    function: u8,
    /// Payload after the function code.
    data: Vec<u8>,
    /// Checksum over address, function and data.
    crc: u16,
}

impl RtuFrame {
    /// Smallest legal frame: unit, function and checksum.
    pub const MIN_SIZE: usize = 4;

    /// Largest legal frame on a serial line.
    pub const MAX_SIZE: usize = 256;

    /// Largest request [`request_len`] can describe (byte count 255).
    pub const MAX_REQUEST_SIZE: usize = 9 + 255;

    /// Build a frame, computing its checksum.
    #[must_use]
    pub fn new(address: u8, function: u8, data: Vec<u8>) -> Self {
        let mut frame = Self {
            address,
            function,
            data,
            crc: 0,
        };
        frame.crc = frame.compute_crc();
        frame
    }

    /// Decode a complete RTU frame and verify its checksum.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::Frame`] if the packet is shorter than
    /// [`Self::MIN_SIZE`] or the checksum does not match.
    pub fn decode(packet: &[u8]) -> SlaveResult<Self> {
        if packet.len() < Self::MIN_SIZE {
            return Err(SlaveError::Frame(format!(
                "RTU frame too short: {} bytes",
                packet.len()
            )));
        }

        let (body, trailer) = packet.split_at(packet.len() - 2);
        let received = u16::from_le_bytes([trailer[0], trailer[1]]);
        let computed = crc16(body);
        if received != computed {
            return Err(SlaveError::Frame(format!(
                "RTU checksum mismatch: received 0x{received:04X}, computed 0x{computed:04X}"
            )));
        }

        Ok(Self {
            address: body[0],
            function: body[1],
            data: body[2..].to_vec(),
            crc: received,
        })
    }

    /// Checksum as last computed or received.
    #[must_use]
    pub fn crc(&self) -> u16 {
        self.crc
    }

    fn body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(2 + self.data.len());
        body.push(self.address);
        body.push(self.function);
        body.extend_from_slice(&self.data);
        body
    }

    fn compute_crc(&self) -> u16 {
        crc16(&self.body())
    }
}

impl Frame for RtuFrame {
    fn bytes(&self) -> Vec<u8> {
        let mut bytes = self.body();
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }

    fn copy(&self) -> Box<dyn Frame> {
        Box::new(self.clone())
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
        self.crc = self.compute_crc();
    }

    fn function(&self) -> u8 {
        self.function
    }

    fn set_function(&mut self, function: u8) {
        self.function = function;
        self.crc = self.compute_crc();
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn kind(&self) -> &'static str {
        "RTUFrame"
    }

    fn header_fields(&self) -> Vec<(&'static str, u16)> {
        vec![("CRC", self.crc)]
    }
}

/// Expected length of the request frame at the start of `buf`.
///
/// Returns `None` while the length cannot be known yet, or for function
/// codes whose request length is not fixed by the header; those frames
/// are delimited by line silence instead.
#[must_use]
pub fn request_len(buf: &[u8]) -> Option<usize> {
    let function = *buf.get(1)?;
    match function {
        // address(2) + quantity/value(2)
        0x01..=0x06 => Some(8),
        // address(2) + quantity(2) + byte count(1) + values
        0x0F | 0x10 => buf.get(6).map(|&count| 9 + usize::from(count)),
        _ => None,
    }
}
