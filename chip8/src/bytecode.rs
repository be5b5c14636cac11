//! Helpers for extracting data from opcodes.
use crate::constants::*;

/// A 16-bit instruction word, split into its operand nibbles.
///
/// ```text
/// 0xD123
///   |||'- n
///   ||'-- y
///   |'--- x
///   '---- op
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Combine two bytes, the first being most significant.
    #[inline(always)]
    pub fn from_bytes(a: u8, b: u8) -> Self {
        Self(((a as u16) << 8) | b as u16)
    }

    /// Instruction type, in the upper nibble.
    #[inline(always)]
    pub fn op(self) -> u8 {
        ((self.0 & 0xF000) >> 12) as u8
    }

    /// Extract register operand VX.
    #[inline(always)]
    pub fn x(self) -> usize {
        ((self.0 & 0x0F00) >> 8) as usize
    }

    /// Extract register operand VY.
    #[inline(always)]
    pub fn y(self) -> usize {
        ((self.0 & 0x00F0) >> 4) as usize
    }

    /// Extract the last nibble.
    #[inline(always)]
    pub fn n(self) -> u8 {
        (self.0 & 0x000F) as u8
    }

    /// Extract the lower byte.
    #[inline(always)]
    pub fn nn(self) -> u8 {
        (self.0 & 0x00FF) as u8
    }

    /// Extract the 12-bit address.
    #[inline(always)]
    pub fn nnn(self) -> Address {
        self.0 & 0x0FFF
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

impl From<Opcode> for u16 {
    fn from(opcode: Opcode) -> Self {
        opcode.0
    }
}

/// Ensure that the program can fit in memory.
#[inline]
pub fn check_program_size(bytecode: &[u8]) -> bool {
    bytecode.len() <= MEM_SIZE - MEM_START
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_fields() {
        let op = Opcode::from_bytes(0xD1, 0x23);

        assert_eq!(op.0, 0xD123);
        assert_eq!(op.op(), 0xD);
        assert_eq!(op.x(), 0x1);
        assert_eq!(op.y(), 0x2);
        assert_eq!(op.n(), 0x3);
        assert_eq!(op.nn(), 0x23);
        assert_eq!(op.nnn(), 0x123);
        assert_eq!(op.to_string(), "D123");
    }

    #[test]
    fn test_program_size() {
        assert!(check_program_size(&[0; MEM_SIZE - MEM_START]));
        assert!(!check_program_size(&[0; MEM_SIZE - MEM_START + 1]));
    }
}
