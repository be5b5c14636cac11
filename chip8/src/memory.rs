//! Main memory.
use crate::constants::*;

/// Flat, byte addressable RAM.
///
/// Addresses wrap around the end of memory, so every access is valid.
pub struct Memory {
    bytes: Box<[u8; MEM_SIZE]>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            bytes: Box::new([0; MEM_SIZE]),
        }
    }
}

impl Memory {
    pub fn new() -> Self {
        Default::default()
    }

    #[inline(always)]
    pub fn get(&self, addr: usize) -> u8 {
        self.bytes[addr & (MEM_SIZE - 1)]
    }

    /// Stores the lowest 8 bits of `value` at the wrapped address.
    #[inline(always)]
    pub fn set(&mut self, addr: usize, value: usize) {
        self.bytes[addr & (MEM_SIZE - 1)] = (value & 0xFF) as u8;
    }

    /// Copies a block of bytes into memory, starting at `addr`.
    ///
    /// Data running past the end of memory continues at address zero.
    pub fn load(&mut self, addr: usize, data: &[u8]) {
        for (offset, byte) in data.iter().enumerate() {
            self.set(addr + offset, *byte as usize);
        }
    }

    /// Erase all memory contents.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_address_wraps() {
        let mut mem = Memory::new();

        mem.set(MEM_SIZE + 3, 0xAB);
        assert_eq!(mem.get(3), 0xAB);
        assert_eq!(mem.get(MEM_SIZE * 2 + 3), 0xAB);
    }

    #[test]
    fn test_value_masked() {
        let mut mem = Memory::new();

        mem.set(0x300, 0x1FF);
        assert_eq!(mem.get(0x300), 0xFF);
    }

    #[test]
    fn test_load_wraps_at_end() {
        let mut mem = Memory::new();

        mem.load(MEM_SIZE - 1, &[1, 2, 3]);
        assert_eq!(mem.get(MEM_SIZE - 1), 1);
        assert_eq!(mem.get(0), 2);
        assert_eq!(mem.get(1), 3);
    }
}
