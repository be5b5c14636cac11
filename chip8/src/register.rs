//! Fixed width registers.

/// Integer cell holding a value of a declared width.
///
/// Values are masked to the width on every store, so a register
/// can never hold more bits than the hardware it models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    value: u32,
    mask: u32,
}

impl Register {
    /// Create a register that is `width` bytes wide.
    pub const fn new(width: u32) -> Self {
        Self::with_bits(width * 8)
    }

    /// Create a register that is `bits` wide, for values that don't align to bytes.
    pub const fn with_bits(bits: u32) -> Self {
        let mask = if bits >= 32 { u32::MAX } else { (1 << bits) - 1 };
        Self { value: 0, mask }
    }

    #[inline(always)]
    pub fn get(&self) -> u32 {
        self.value
    }

    #[inline(always)]
    pub fn set(&mut self, value: u32) {
        self.value = value & self.mask;
    }

    /// Largest value the register can hold.
    pub fn max(&self) -> u32 {
        self.mask
    }
}
