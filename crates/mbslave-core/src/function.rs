//! Function codes and the standard Modbus handlers.
//!
//! Every handler validates quantity first (`IllegalDataValue`), then the
//! address range against the bank (`IllegalDataAddress`), and only then
//! touches memory, so a rejected request never mutates state.

use crate::accessors::{
    pack_bits, register_address_and_number, register_address_and_value, unpack_bits,
    RegisterRange,
};
use crate::exception::Exception;
use crate::frame::Frame;
use crate::memory::MemoryMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Largest bit count in one read request.
pub const MAX_READ_BITS: usize = 2000;

/// Largest register count in one read request.
pub const MAX_READ_REGISTERS: usize = 125;

/// Largest coil count in one write-multiple request.
pub const MAX_WRITE_BITS: usize = 1968;

/// Largest register count in one write-multiple request.
pub const MAX_WRITE_REGISTERS: usize = 123;

/// Coil "on" value in a WriteSingleCoil request.
pub const COIL_ON: u16 = 0xFF00;

/// Coil "off" value in a WriteSingleCoil request.
pub const COIL_OFF: u16 = 0x0000;

/// Payload for the response, or the exception to answer with.
///
/// `Err(Exception::Success)` leaves the request payload in place.
pub type HandlerResult = Result<Vec<u8>, Exception>;

/// A function handler, shared between the dispatch table and the engine.
pub type FunctionHandler = Arc<dyn Fn(&mut MemoryMap, &dyn Frame) -> HandlerResult + Send + Sync>;

/// Standard Modbus function codes served out of the box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read coils (0x01).
    ReadCoils = 0x01,
    /// Read discrete inputs (0x02).
    ReadDiscreteInputs = 0x02,
    /// Read holding registers (0x03).
    ReadHoldingRegisters = 0x03,
    /// Read input registers (0x04).
    ReadInputRegisters = 0x04,
    /// Write single coil (0x05).
    WriteSingleCoil = 0x05,
    /// Write single holding register (0x06).
    WriteHoldingRegister = 0x06,
    /// Write multiple coils (0x0F).
    WriteMultipleCoils = 0x0F,
    /// Write multiple holding registers (0x10).
    WriteHoldingRegisters = 0x10,
}

impl FunctionCode {
    /// Parse a standard function code.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::ReadCoils),
            0x02 => Some(Self::ReadDiscreteInputs),
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x05 => Some(Self::WriteSingleCoil),
            0x06 => Some(Self::WriteHoldingRegister),
            0x0F => Some(Self::WriteMultipleCoils),
            0x10 => Some(Self::WriteHoldingRegisters),
            _ => None,
        }
    }

    /// Wire value.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether this function reads a `[start][count]` range.
    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
        )
    }

    /// Every standard function code, in wire order.
    #[must_use]
    pub fn all() -> [Self; 8] {
        [
            Self::ReadCoils,
            Self::ReadDiscreteInputs,
            Self::ReadHoldingRegisters,
            Self::ReadInputRegisters,
            Self::WriteSingleCoil,
            Self::WriteHoldingRegister,
            Self::WriteMultipleCoils,
            Self::WriteHoldingRegisters,
        ]
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadCoils => "Read Coils",
            Self::ReadDiscreteInputs => "Read Discrete Inputs",
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::ReadInputRegisters => "Read Input Registers",
            Self::WriteSingleCoil => "Write Single Coil",
            Self::WriteHoldingRegister => "Write Holding Register",
            Self::WriteMultipleCoils => "Write Multiple Coils",
            Self::WriteHoldingRegisters => "Write Holding Registers",
        };
        f.write_str(name)
    }
}

/// Human-readable name of any function code byte, exception bit included.
#[must_use]
pub fn function_name(code: u8) -> String {
    let base = code & !crate::exception::EXCEPTION_BIT;
    match FunctionCode::from_byte(base) {
        Some(function) if base == code => function.to_string(),
        Some(function) => format!("{function} (Exception)"),
        None => String::from("Unknown Function"),
    }
}

/// The standard handler table.
#[must_use]
pub fn default_handlers() -> HashMap<u8, FunctionHandler> {
    let mut table: HashMap<u8, FunctionHandler> = HashMap::new();
    table.insert(FunctionCode::ReadCoils.code(), Arc::new(read_coils));
    table.insert(
        FunctionCode::ReadDiscreteInputs.code(),
        Arc::new(read_discrete_inputs),
    );
    table.insert(
        FunctionCode::ReadHoldingRegisters.code(),
        Arc::new(read_holding_registers),
    );
    table.insert(
        FunctionCode::ReadInputRegisters.code(),
        Arc::new(read_input_registers),
    );
    table.insert(FunctionCode::WriteSingleCoil.code(), Arc::new(write_single_coil));
    table.insert(
        FunctionCode::WriteHoldingRegister.code(),
        Arc::new(write_holding_register),
    );
    table.insert(
        FunctionCode::WriteMultipleCoils.code(),
        Arc::new(write_multiple_coils),
    );
    table.insert(
        FunctionCode::WriteHoldingRegisters.code(),
        Arc::new(write_holding_registers),
    );
    table
}

/// Range whose count is within `1..=max`.
fn checked_quantity(frame: &dyn Frame, max: usize) -> Result<RegisterRange, Exception> {
    let range = register_address_and_number(frame)?;
    if range.count == 0 || range.count > max {
        return Err(Exception::IllegalDataValue);
    }
    Ok(range)
}

fn checked_bounds(range: RegisterRange, bank_len: usize) -> Result<RegisterRange, Exception> {
    if range.end > bank_len {
        return Err(Exception::IllegalDataAddress);
    }
    Ok(range)
}

/// Validated range: `1..=max` units, ending within `bank_len` units.
fn checked_range(
    frame: &dyn Frame,
    max: usize,
    bank_len: usize,
) -> Result<RegisterRange, Exception> {
    checked_bounds(checked_quantity(frame, max)?, bank_len)
}

#[allow(clippy::cast_possible_truncation)]
fn with_byte_count(values: Vec<u8>) -> Vec<u8> {
    // bounded by MAX_READ_BITS / MAX_READ_REGISTERS: at most 250 bytes
    let mut data = Vec::with_capacity(1 + values.len());
    data.push(values.len() as u8);
    data.extend(values);
    data
}

fn read_bits(frame: &dyn Frame, bank: &[u8]) -> HandlerResult {
    let range = checked_range(frame, MAX_READ_BITS, bank.len())?;
    Ok(with_byte_count(pack_bits(&bank[range.register..range.end])))
}

fn read_registers(frame: &dyn Frame, bank: &[u8]) -> HandlerResult {
    let range = checked_range(frame, MAX_READ_REGISTERS, bank.len() / 2)?;
    Ok(with_byte_count(
        bank[range.register * 2..range.end * 2].to_vec(),
    ))
}

/// Function 0x01: `[start][count]` to `[byteCount][packed bits]`.
///
/// # Errors
///
/// `IllegalDataValue` for a count outside `1..=2000`, `IllegalDataAddress`
/// past the end of the coil bank.
pub fn read_coils(memory: &mut MemoryMap, frame: &dyn Frame) -> HandlerResult {
    read_bits(frame, &memory.coils)
}

/// Function 0x02: `[start][count]` to `[byteCount][packed bits]`.
///
/// # Errors
///
/// As [`read_coils`], against the discrete input bank.
pub fn read_discrete_inputs(memory: &mut MemoryMap, frame: &dyn Frame) -> HandlerResult {
    read_bits(frame, &memory.discrete_inputs)
}

/// Function 0x03: `[start][count]` to `[byteCount][registers]`.
///
/// # Errors
///
/// `IllegalDataValue` for a count outside `1..=125`, `IllegalDataAddress`
/// past the end of the holding register bank.
pub fn read_holding_registers(memory: &mut MemoryMap, frame: &dyn Frame) -> HandlerResult {
    read_registers(frame, &memory.holding_registers)
}

/// Function 0x04: `[start][count]` to `[byteCount][registers]`.
///
/// # Errors
///
/// As [`read_holding_registers`], against the input register bank.
pub fn read_input_registers(memory: &mut MemoryMap, frame: &dyn Frame) -> HandlerResult {
    read_registers(frame, &memory.input_registers)
}

/// Function 0x05: `[address][0xFF00 | 0x0000]`, echoed back.
///
/// # Errors
///
/// `IllegalDataValue` for any other value, `IllegalDataAddress` past the
/// end of the coil bank.
pub fn write_single_coil(memory: &mut MemoryMap, frame: &dyn Frame) -> HandlerResult {
    let (register, value) = register_address_and_value(frame)?;
    let on = match value {
        COIL_ON => true,
        COIL_OFF => false,
        _ => return Err(Exception::IllegalDataValue),
    };
    if !memory.set_coil(register, on) {
        return Err(Exception::IllegalDataAddress);
    }
    Ok(frame.data()[..4].to_vec())
}

/// Function 0x06: `[address][value]`, echoed back.
///
/// # Errors
///
/// `IllegalDataAddress` past the end of the holding register bank.
pub fn write_holding_register(memory: &mut MemoryMap, frame: &dyn Frame) -> HandlerResult {
    let (register, value) = register_address_and_value(frame)?;
    if !memory.set_holding_register(register, value) {
        return Err(Exception::IllegalDataAddress);
    }
    Ok(frame.data()[..4].to_vec())
}

/// Byte count and values of a write-multiple request, checked against `expected`.
fn write_values(frame: &dyn Frame, expected: usize) -> Result<&[u8], Exception> {
    let data = frame.data();
    let byte_count = usize::from(*data.get(4).ok_or(Exception::IllegalDataValue)?);
    if byte_count != expected {
        return Err(Exception::IllegalDataValue);
    }
    data.get(5..5 + byte_count)
        .ok_or(Exception::IllegalDataValue)
}

/// Function 0x0F: `[start][count][byteCount][packed bits]` to `[start][count]`.
///
/// # Errors
///
/// `IllegalDataValue` for a count outside `1..=1968` or a byte count other
/// than `ceil(count / 8)`, then `IllegalDataAddress` past the end of the
/// coil bank.
pub fn write_multiple_coils(memory: &mut MemoryMap, frame: &dyn Frame) -> HandlerResult {
    let range = checked_quantity(frame, MAX_WRITE_BITS)?;
    let packed = write_values(frame, range.count.div_ceil(8))?;
    let range = checked_bounds(range, memory.coils.len())?;
    let bits = unpack_bits(packed, range.count);
    memory.coils[range.register..range.end].copy_from_slice(&bits);
    Ok(frame.data()[..4].to_vec())
}

/// Function 0x10: `[start][count][byteCount][registers]` to `[start][count]`.
///
/// # Errors
///
/// `IllegalDataValue` for a count outside `1..=123` or a byte count other
/// than `2 * count`, `IllegalDataAddress` past the end of the holding
/// register bank.
pub fn write_holding_registers(memory: &mut MemoryMap, frame: &dyn Frame) -> HandlerResult {
    let range = checked_quantity(frame, MAX_WRITE_REGISTERS)?;
    let values = write_values(frame, range.count * 2)?;
    let range = checked_bounds(range, memory.holding_registers.len() / 2)?;
    memory.holding_registers[range.register * 2..range.end * 2].copy_from_slice(values);
    Ok(frame.data()[..4].to_vec())
}
