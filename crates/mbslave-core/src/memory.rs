//! The four Modbus memory banks.
//!
//! Bit banks (coils, discrete inputs) store one byte per bit, 0 or 1.
//! Register banks store two bytes per register, big-endian.

/// Addressable units per bank when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 512;

/// Coils, discrete inputs, holding registers and input registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMap {
    /// Read-only bits, one byte per bit.
    pub discrete_inputs: Vec<u8>,
    /// Read/write bits, one byte per bit.
    pub coils: Vec<u8>,
    /// Read/write registers, two bytes each.
    pub holding_registers: Vec<u8>,
    /// Read-only registers, two bytes each.
    pub input_registers: Vec<u8>,
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMap {
    /// Allocate every bank with [`DEFAULT_CAPACITY`] units.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacities(
            DEFAULT_CAPACITY,
            DEFAULT_CAPACITY,
            DEFAULT_CAPACITY,
            DEFAULT_CAPACITY,
        )
    }

    /// Allocate banks with explicit unit counts.
    #[must_use]
    pub fn with_capacities(
        discrete_inputs: usize,
        coils: usize,
        holding_registers: usize,
        input_registers: usize,
    ) -> Self {
        Self {
            discrete_inputs: vec![0; discrete_inputs],
            coils: vec![0; coils],
            holding_registers: vec![0; holding_registers * 2],
            input_registers: vec![0; input_registers * 2],
        }
    }

    /// Number of addressable coils.
    #[must_use]
    pub fn coil_count(&self) -> usize {
        self.coils.len()
    }

    /// Number of addressable discrete inputs.
    #[must_use]
    pub fn discrete_input_count(&self) -> usize {
        self.discrete_inputs.len()
    }

    /// Number of addressable holding registers.
    #[must_use]
    pub fn holding_register_count(&self) -> usize {
        self.holding_registers.len() / 2
    }

    /// Number of addressable input registers.
    #[must_use]
    pub fn input_register_count(&self) -> usize {
        self.input_registers.len() / 2
    }

    /// Coil value, or `None` past the end of the bank.
    #[must_use]
    pub fn coil(&self, address: usize) -> Option<bool> {
        self.coils.get(address).map(|&b| b != 0)
    }

    /// Set a coil; returns `false` if the address is out of range.
    pub fn set_coil(&mut self, address: usize, value: bool) -> bool {
        set_bit(&mut self.coils, address, value)
    }

    /// Discrete input value, or `None` past the end of the bank.
    #[must_use]
    pub fn discrete_input(&self, address: usize) -> Option<bool> {
        self.discrete_inputs.get(address).map(|&b| b != 0)
    }

    /// Set a discrete input; returns `false` if the address is out of range.
    pub fn set_discrete_input(&mut self, address: usize, value: bool) -> bool {
        set_bit(&mut self.discrete_inputs, address, value)
    }

    /// Holding register value, or `None` past the end of the bank.
    #[must_use]
    pub fn holding_register(&self, address: usize) -> Option<u16> {
        get_register(&self.holding_registers, address)
    }

    /// Set a holding register; returns `false` if the address is out of range.
    pub fn set_holding_register(&mut self, address: usize, value: u16) -> bool {
        set_register(&mut self.holding_registers, address, value)
    }

    /// Input register value, or `None` past the end of the bank.
    #[must_use]
    pub fn input_register(&self, address: usize) -> Option<u16> {
        get_register(&self.input_registers, address)
    }

    /// Set an input register; returns `false` if the address is out of range.
    pub fn set_input_register(&mut self, address: usize, value: u16) -> bool {
        set_register(&mut self.input_registers, address, value)
    }
}

fn set_bit(bank: &mut [u8], address: usize, value: bool) -> bool {
    match bank.get_mut(address) {
        Some(slot) => {
            *slot = u8::from(value);
            true
        }
        None => false,
    }
}

fn get_register(bank: &[u8], address: usize) -> Option<u16> {
    let offset = address.checked_mul(2)?;
    let bytes = bank.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn set_register(bank: &mut [u8], address: usize, value: u16) -> bool {
    let Some(end) = address.checked_mul(2).and_then(|o| o.checked_add(2)) else {
        return false;
    };
    match bank.get_mut(end - 2..end) {
        Some(slot) => {
            slot.copy_from_slice(&value.to_be_bytes());
            true
        }
        None => false,
    }
}
