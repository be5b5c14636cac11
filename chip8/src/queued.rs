//! Interpreter fed by a queue of input events.
//!
//! Input producers usually live on another thread than the machine.
//! Rather than locking the keyboard state, events are sent over a
//! bounded channel and folded into the key state right before each
//! batch of instructions.
use std::{
    fmt,
    sync::mpsc::{self, Receiver, SyncSender, TrySendError},
};

use log::trace;

use crate::{
    devices::InputEvent,
    display::Display,
    error::Chip8Result,
    vm::{Chip8Vm, Steppable},
};

pub struct QueuedVm {
    vm: Chip8Vm,
    events: Receiver<InputEvent>,
}

impl QueuedVm {
    /// Wrap a machine, returning the handle used to queue input for it.
    ///
    /// At most `capacity` events can wait between two cycles.
    pub fn new(vm: Chip8Vm, capacity: usize) -> (Self, InputSender) {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        (Self { vm, events: rx }, InputSender(tx))
    }

    /// Apply every queued event to the key state, oldest first.
    ///
    /// Returns the number of events applied.
    pub fn drain_input(&mut self) -> usize {
        let mut count = 0;

        for event in self.events.try_iter() {
            trace!("input {} {}", event.key, if event.pressed { "down" } else { "up" });
            self.vm.apply_input(event);
            count += 1;
        }

        count
    }

    pub fn vm(&self) -> &Chip8Vm {
        &self.vm
    }

    pub fn into_inner(self) -> Chip8Vm {
        self.vm
    }
}

impl Steppable for QueuedVm {
    fn cycle(&mut self, count: usize) -> Chip8Result<()> {
        self.drain_input();
        self.vm.cycle(count)
    }

    fn display(&self) -> &Display {
        self.vm.display()
    }
}

/// Producer side of a [`QueuedVm`] input queue.
#[derive(Debug, Clone)]
pub struct InputSender(SyncSender<InputEvent>);

impl InputSender {
    /// Queue an event without blocking.
    ///
    /// When the queue is full the new event is rejected, and the
    /// events already queued are kept.
    pub fn send(&self, event: InputEvent) -> Result<(), InputError> {
        self.0.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => InputError::Full,
            TrySendError::Disconnected(_) => InputError::Disconnected,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputError {
    /// Too many events are waiting for the next cycle.
    Full,
    /// The machine was dropped.
    Disconnected,
}

impl std::error::Error for InputError {}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Full => write!(f, "input queue is full"),
            Self::Disconnected => write!(f, "machine is no longer receiving input"),
        }
    }
}
