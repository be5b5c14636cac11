//! Hosting of many concurrent CHIP-8 machines.
//!
//! Every session owns one machine and runs it on its own thread,
//! pushing a display frame to its client at a fixed rate. The
//! [`VmManager`] admits, steers and evicts sessions.
mod conf;
mod error;
mod manager;
mod message;
mod session;
mod sink;

pub use self::{
    conf::{ManagerConf, Rom, RomDescriptor},
    error::{ErrorKind, SessionError, SessionResult},
    manager::{Stats, Sweeper, VmManager, CAPACITY_MESSAGE},
    message::{InputEvent, Outbound, ParamChange, SessionId},
    session::{Gate, RunState, Session, SessionControl, Tick},
    sink::{BoxedSink, ChannelSink, FrameSink, JsonLinesSink, SinkError},
};

pub mod prelude {
    pub use super::{
        conf::{ManagerConf, Rom},
        error::{SessionError, SessionResult},
        manager::VmManager,
        message::{InputEvent, ParamChange, SessionId},
        sink::FrameSink,
    };
}
