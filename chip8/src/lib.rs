mod bytecode;
mod clock;
pub mod constants;
mod cpu;
mod devices;
mod display;
mod error;
mod memory;
mod queued;
mod register;
mod stack;
mod vm;

pub use self::{
    bytecode::Opcode,
    clock::{Clock, Hz},
    devices::{InputEvent, InvalidKeyCode, KeyCode, Keypad},
    display::Display,
    error::{Chip8Error, Chip8Result},
    memory::Memory,
    queued::{InputError, InputSender, QueuedVm},
    register::Register,
    stack::Stack,
    vm::{Chip8Conf, Chip8Vm, Flow, Steppable, TimerMode},
};

pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        error::{Chip8Error, Chip8Result},
        queued::QueuedVm,
        vm::{Chip8Conf, Chip8Vm, Steppable},
    };
}
