//! CPU and memory state.
use crate::{
    constants::*, devices::Keypad, display::Display, memory::Memory, register::Register,
    stack::Stack,
};

/// Core state for a chip8 interpreter.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the current position in the bytecode.
    pub(crate) pc: Register,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [Register; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address.
    pub(crate) address: Register,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: Register,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound_timer: Register,
    /// Keyboard input state.
    pub(crate) keys: Keypad,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Memory,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: Stack,
    /// Screen buffer that is drawn too.
    pub(crate) display: Display,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        Self {
            pc: Register::with_bits(12),
            registers: [Register::new(1); REGISTER_COUNT],
            address: Register::new(2),
            delay_timer: Register::new(1),
            sound_timer: Register::new(1),
            keys: Keypad::default(),

            ram: Memory::new(),
            stack: Stack::new(),
            display: Display::new(),
        }
    }
}

impl Chip8Cpu {
    pub fn new() -> Self {
        Default::default()
    }

    /// Erase the contents of the memory buffers `ram`, `stack` and `display`.
    pub(crate) fn clear_memory(&mut self) {
        self.ram.clear();
        self.stack.clear();
        self.display.clear();
    }

    /// Value of general purpose register `Vx`.
    #[inline(always)]
    pub fn v(&self, x: usize) -> u8 {
        self.registers[x & 0xF].get() as u8
    }

    #[inline(always)]
    pub(crate) fn set_v(&mut self, x: usize, value: u32) {
        self.registers[x & 0xF].set(value);
    }

    #[inline(always)]
    pub(crate) fn set_flag(&mut self, flag: bool) {
        self.registers[0xF].set(flag as u32);
    }

    #[inline(always)]
    pub fn pc(&self) -> Address {
        self.pc.get() as Address
    }

    /// Jump, wrapping the address to 12 bits.
    #[inline(always)]
    pub(crate) fn jump(&mut self, address: u32) {
        self.pc.set(address);
    }

    /// Advance the program counter past the next instruction.
    #[inline(always)]
    pub(crate) fn skip(&mut self) {
        self.pc.set(self.pc.get() + 2);
    }

    /// Move the program counter back to the previous instruction.
    #[inline(always)]
    pub(crate) fn rewind(&mut self) {
        self.pc.set(self.pc.get().wrapping_sub(2));
    }

    #[inline(always)]
    pub fn address(&self) -> u16 {
        self.address.get() as u16
    }

    /// Count down the delay and sound timers, stopping at zero.
    #[inline]
    pub fn tick_timers(&mut self) {
        let delay = self.delay_timer.get();
        if delay > 0 {
            self.delay_timer.set(delay - 1);
        }

        let sound = self.sound_timer.get();
        if sound > 0 {
            self.sound_timer.set(sound - 1);
        }
    }
}
