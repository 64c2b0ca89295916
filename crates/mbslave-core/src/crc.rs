//! CRC-16/MODBUS checksum used by RTU framing.
//!
//! Reflected polynomial 0xA001, initial value 0xFFFF. The checksum goes on
//! the wire low byte first.

const POLY: u16 = 0xA001;

/// Compute the Modbus RTU checksum of `data`.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}
