//! Field accessors over a frame's payload, independent of transport.
//!
//! All multi-byte fields are big-endian.

use crate::exception::Exception;
use crate::frame::Frame;

/// Start address and quantity of a multi-unit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRange {
    /// First address.
    pub register: usize,
    /// Number of units.
    pub count: usize,
    /// One past the last address (`register + count`).
    pub end: usize,
}

/// Read `[register:2][count:2]` from the start of the payload.
///
/// # Errors
///
/// Returns `IllegalDataValue` if the payload is shorter than four bytes.
pub fn register_address_and_number(frame: &dyn Frame) -> Result<RegisterRange, Exception> {
    let (register, count) = two_words(frame.data())?;
    let register = usize::from(register);
    let count = usize::from(count);
    Ok(RegisterRange {
        register,
        count,
        end: register + count,
    })
}

/// Read `[register:2][value:2]` from the start of the payload.
///
/// # Errors
///
/// Returns `IllegalDataValue` if the payload is shorter than four bytes.
pub fn register_address_and_value(frame: &dyn Frame) -> Result<(usize, u16), Exception> {
    let (register, value) = two_words(frame.data())?;
    Ok((usize::from(register), value))
}

fn two_words(data: &[u8]) -> Result<(u16, u16), Exception> {
    match data {
        [a, b, c, d, ..] => Ok((
            u16::from_be_bytes([*a, *b]),
            u16::from_be_bytes([*c, *d]),
        )),
        _ => Err(Exception::IllegalDataValue),
    }
}

/// Four-byte `[register][count]` payload.
#[must_use]
pub fn encode_register_and_number(register: u16, number: u16) -> Vec<u8> {
    let mut data = Vec::with_capacity(4);
    data.extend_from_slice(&register.to_be_bytes());
    data.extend_from_slice(&number.to_be_bytes());
    data
}

/// Set the payload to `[register][count]`.
pub fn set_data_with_register_and_number(frame: &mut dyn Frame, register: u16, number: u16) {
    frame.set_data(encode_register_and_number(register, number));
}

/// Set the payload to `[register][count][byteCount][values as u16 BE]`.
pub fn set_data_with_register_and_number_and_values(
    frame: &mut dyn Frame,
    register: u16,
    number: u16,
    values: &[u16],
) {
    set_data_with_register_and_number_and_bytes(frame, register, number, &uint16_to_bytes(values));
}

/// Set the payload to `[register][count][byteCount][bytes]`.
///
/// `bytes` longer than 255 is truncated by the one-byte count field; no
/// standard function produces such a payload.
#[allow(clippy::cast_possible_truncation)]
pub fn set_data_with_register_and_number_and_bytes(
    frame: &mut dyn Frame,
    register: u16,
    number: u16,
    bytes: &[u8],
) {
    let mut data = encode_register_and_number(register, number);
    data.push(bytes.len() as u8);
    data.extend_from_slice(bytes);
    frame.set_data(data);
}

/// Encode registers as consecutive big-endian words.
#[must_use]
pub fn uint16_to_bytes(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Decode consecutive big-endian words; a trailing odd byte is ignored.
#[must_use]
pub fn bytes_to_uint16(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Pack one-byte-per-bit values into Modbus bit order (LSB first).
#[must_use]
pub fn pack_bits(bits: &[u8]) -> Vec<u8> {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit != 0 {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

/// Unpack `count` bits from LSB-first packed bytes, one byte (0 or 1) per bit.
#[must_use]
pub fn unpack_bits(packed: &[u8], count: usize) -> Vec<u8> {
    (0..count)
        .map(|i| {
            packed
                .get(i / 8)
                .map_or(0, |byte| (byte >> (i % 8)) & 0x01)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtu::RtuFrame;
    use crate::tcp::TcpFrame;

    #[test]
    fn test_register_address_and_number() {
        let frame = TcpFrame::new(1, 1, 0x03, vec![0x00, 0x0A, 0x00, 0x03]);
        let range = register_address_and_number(&frame).unwrap();
        assert_eq!(range.register, 10);
        assert_eq!(range.count, 3);
        assert_eq!(range.end, 13);
    }

    #[test]
    fn test_register_range_does_not_wrap() {
        let frame = RtuFrame::new(1, 0x03, vec![0xFF, 0xFF, 0xFF, 0xFF]);
        let range = register_address_and_number(&frame).unwrap();
        assert_eq!(range.end, 0x1FFFE);
    }

    #[test]
    fn test_register_address_and_value() {
        let frame = RtuFrame::new(1, 0x06, vec![0x00, 0x0A, 0x12, 0x34]);
        assert_eq!(register_address_and_value(&frame), Ok((10, 0x1234)));
    }

    #[test]
    fn test_short_payload_is_illegal_value() {
        let frame = RtuFrame::new(1, 0x03, vec![0x00, 0x0A, 0x00]);
        assert_eq!(
            register_address_and_number(&frame),
            Err(Exception::IllegalDataValue)
        );
        assert_eq!(
            register_address_and_value(&frame),
            Err(Exception::IllegalDataValue)
        );
    }

    #[test]
    fn test_set_data_builders() {
        let mut frame = TcpFrame::new(1, 1, 0x10, vec![]);
        set_data_with_register_and_number(&mut frame, 0x0102, 0x0003);
        assert_eq!(frame.data(), &[0x01, 0x02, 0x00, 0x03]);

        set_data_with_register_and_number_and_values(&mut frame, 1, 2, &[0xABCD, 0x0001]);
        assert_eq!(
            frame.data(),
            &[0x00, 0x01, 0x00, 0x02, 0x04, 0xAB, 0xCD, 0x00, 0x01]
        );

        set_data_with_register_and_number_and_bytes(&mut frame, 0, 10, &[0xFF, 0x03]);
        assert_eq!(frame.data(), &[0x00, 0x00, 0x00, 0x0A, 0x02, 0xFF, 0x03]);
    }

    #[test]
    fn test_word_conversion() {
        assert_eq!(uint16_to_bytes(&[0x1234, 0x00FF]), vec![0x12, 0x34, 0x00, 0xFF]);
        assert_eq!(bytes_to_uint16(&[0x12, 0x34, 0x56]), vec![0x1234]);
    }

    #[test]
    fn test_pack_bits_lsb_first() {
        assert_eq!(pack_bits(&[1, 0, 1, 1, 0, 0, 1, 1, 1, 0]), vec![0xCD, 0x01]);
        assert_eq!(pack_bits(&[0; 8]), vec![0x00]);
        assert!(pack_bits(&[]).is_empty());
    }

    #[test]
    fn test_unpack_bits() {
        assert_eq!(unpack_bits(&[0xCD, 0x01], 10), vec![1, 0, 1, 1, 0, 0, 1, 1, 1, 0]);
        assert_eq!(unpack_bits(&[0x01], 3), vec![1, 0, 0]);
    }
}
