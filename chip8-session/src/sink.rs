//! Outbound channels from a session to its client.
use std::{
    fmt,
    io::{self, Write},
    sync::mpsc::{self, Receiver, Sender},
};

use crate::message::Outbound;

/// Destination for the messages a session produces.
///
/// A sink belongs to exactly one session at a time. When the session
/// stops, the sink is handed back to the manager, which either closes
/// it or passes it on to the next session for the same client.
pub trait FrameSink: Send {
    fn send(&mut self, message: Outbound) -> Result<(), SinkError>;

    /// Release the underlying channel. Sends after closing fail.
    fn close(&mut self) {}
}

pub type BoxedSink = Box<dyn FrameSink>;

impl FrameSink for BoxedSink {
    fn send(&mut self, message: Outbound) -> Result<(), SinkError> {
        (**self).send(message)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[derive(Debug)]
pub enum SinkError {
    /// The client went away or the sink was closed.
    Closed,
    Io(io::Error),
    Json(serde_json::Error),
}

impl std::error::Error for SinkError {}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "sink is closed"),
            Self::Io(err) => write!(f, "sink write failed: {err}"),
            Self::Json(err) => write!(f, "message encoding failed: {err}"),
        }
    }
}

impl From<io::Error> for SinkError {
    fn from(err: io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Json(err)
    }
}

/// Sink backed by an in-process channel.
pub struct ChannelSink {
    tx: Option<Sender<Outbound>>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Some(tx) }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn send(&mut self, message: Outbound) -> Result<(), SinkError> {
        match &self.tx {
            Some(tx) => tx.send(message).map_err(|_| SinkError::Closed),
            None => Err(SinkError::Closed),
        }
    }

    fn close(&mut self) {
        self.tx = None;
    }
}

/// Sink writing one JSON document per line.
pub struct JsonLinesSink<W> {
    writer: Option<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }
}

impl<W: Write + Send> FrameSink for JsonLinesSink<W> {
    fn send(&mut self, message: Outbound) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        serde_json::to_writer(&mut *writer, &message)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}
