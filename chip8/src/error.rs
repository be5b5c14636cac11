//! Result and errors.
use std::fmt::{self, Display, Formatter};

use crate::constants::STACK_SIZE;

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

#[derive(Debug)]
pub enum Chip8Error {
    /// Subroutine call nested deeper than the call stack allows.
    StackOverflow,
    /// Return from a subroutine with an empty call stack.
    StackUnderflow,
    /// Attempt to load a bytecode program that can't fit in memory.
    LargeProgram,
    Io(std::io::Error),
    Fmt(fmt::Error),
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackOverflow => write!(f, "call stack overflow, depth limit is {STACK_SIZE}"),
            Self::StackUnderflow => write!(f, "call stack underflow"),
            Self::LargeProgram => write!(f, "program too large for VM memory"),
            Self::Io(err) => write!(f, "{}", err),
            Self::Fmt(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Chip8Error {}

impl From<std::io::Error> for Chip8Error {
    fn from(err: std::io::Error) -> Self {
        Chip8Error::Io(err)
    }
}

impl From<fmt::Error> for Chip8Error {
    fn from(err: fmt::Error) -> Self {
        Chip8Error::Fmt(err)
    }
}
