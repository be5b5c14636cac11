//! Call stack of return addresses.
use crate::{
    constants::*,
    error::{Chip8Error, Chip8Result},
};

/// Bounded LIFO of subroutine return addresses.
pub struct Stack {
    slots: [Address; STACK_SIZE],
    /// Number of addresses currently on the stack.
    depth: usize,
}

impl Default for Stack {
    fn default() -> Self {
        Self {
            slots: [0; STACK_SIZE],
            depth: 0,
        }
    }
}

impl Stack {
    pub fn new() -> Self {
        Default::default()
    }

    /// Push a return address.
    ///
    /// Fails with [`Chip8Error::StackOverflow`] when the stack is full,
    /// in which case the stack is left untouched.
    pub fn push(&mut self, address: Address) -> Chip8Result<()> {
        if self.depth >= STACK_SIZE {
            return Err(Chip8Error::StackOverflow);
        }

        self.slots[self.depth] = address;
        self.depth += 1;

        Ok(())
    }

    /// Pop the most recently pushed return address.
    pub fn pop(&mut self) -> Chip8Result<Address> {
        if self.depth == 0 {
            return Err(Chip8Error::StackUnderflow);
        }

        self.depth -= 1;
        Ok(self.slots[self.depth])
    }

    pub fn len(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    pub fn capacity(&self) -> usize {
        STACK_SIZE
    }

    pub fn clear(&mut self) {
        self.slots.fill(0);
        self.depth = 0;
    }
}
