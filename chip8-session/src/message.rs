//! Payloads exchanged with clients.
use std::{fmt, num::NonZeroU32};

use rand::Rng;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub use chip8::InputEvent;

/// Unique name of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(SmolStr);

impl SessionId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }

    /// 128 random bits, hex encoded.
    pub fn random() -> Self {
        let bits: u128 = rand::thread_rng().gen();
        Self(SmolStr::new(format!("{bits:032x}")))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Request to change how fast a session runs.
///
/// Every field that is present is applied at the next frame boundary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles_per_frame: Option<NonZeroU32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<NonZeroU32>,
}

impl ParamChange {
    pub fn is_empty(&self) -> bool {
        self.cycles_per_frame.is_none() && self.frame_rate.is_none()
    }
}

/// Messages pushed from a session to its client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outbound {
    /// Row-major 64x32 display, one 0 or 1 per pixel.
    Frame { frame: Vec<u8> },
    Started {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    Error { error: String },
}

impl Outbound {
    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }
}
