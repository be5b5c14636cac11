use std::{fmt, io};

use chip8::{Chip8Error, InputError};

use crate::{message::SessionId, sink::SinkError};

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug)]
pub struct SessionError {
    pub kind: ErrorKind,
}

#[derive(Debug)]
pub enum ErrorKind {
    /// No session is registered under the id.
    NotFound(SessionId),
    AlreadyExists(SessionId),
    /// The session is registered but has no running machine,
    /// for example after it was unloaded.
    NotRunning(SessionId),
    CapacityReached { max_sessions: usize },
    /// The session thread panicked and its sink was lost.
    Panicked(SessionId),
    ParamQueueFull(SessionId),
    Chip8(Chip8Error),
    Input(InputError),
    Sink(SinkError),
    Config(serde_yaml::Error),
    Io(io::Error),
}

impl SessionError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound(_))
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Chip8(err) => Some(err),
            ErrorKind::Input(err) => Some(err),
            ErrorKind::Sink(err) => Some(err),
            ErrorKind::Config(err) => Some(err),
            ErrorKind::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::NotFound(id) => write!(f, "session {id} not found"),
            ErrorKind::AlreadyExists(id) => write!(f, "session {id} already exists"),
            ErrorKind::NotRunning(id) => write!(f, "session {id} is not running"),
            ErrorKind::CapacityReached { max_sessions } => {
                write!(f, "session limit of {max_sessions} reached")
            }
            ErrorKind::Panicked(id) => write!(f, "session {id} panicked"),
            ErrorKind::ParamQueueFull(id) => {
                write!(f, "session {id} has too many pending parameter changes")
            }
            ErrorKind::Chip8(err) => write!(f, "interpreter error: {err}"),
            ErrorKind::Input(err) => write!(f, "input error: {err}"),
            ErrorKind::Sink(err) => write!(f, "{err}"),
            ErrorKind::Config(err) => write!(f, "configuration error: {err}"),
            ErrorKind::Io(err) => write!(f, "{err}"),
        }
    }
}

impl From<ErrorKind> for SessionError {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

impl From<Chip8Error> for SessionError {
    fn from(err: Chip8Error) -> Self {
        Self::new(ErrorKind::Chip8(err))
    }
}

impl From<InputError> for SessionError {
    fn from(err: InputError) -> Self {
        Self::new(ErrorKind::Input(err))
    }
}

impl From<SinkError> for SessionError {
    fn from(err: SinkError) -> Self {
        Self::new(ErrorKind::Sink(err))
    }
}

impl From<serde_yaml::Error> for SessionError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::new(ErrorKind::Config(err))
    }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::Io(err))
    }
}
