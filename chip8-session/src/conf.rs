//! Manager configuration and ROM catalog.
use std::{
    collections::BTreeMap,
    fs,
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Duration,
};

use chip8::TimerMode;
use log::debug;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::SessionResult;

pub const DEFAULT_MAX_SESSIONS: usize = 20;
pub const DEFAULT_IDLE_TTL_SECS: u64 = 300;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_INPUT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_PARAM_QUEUE_CAPACITY: usize = 16;

/// Session manager settings.
///
/// Loaded from YAML. Every field is optional and falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConf {
    /// Upper bound on concurrently registered sessions.
    pub max_sessions: usize,
    /// Sessions without input for longer than this are evicted.
    pub idle_ttl_secs: u64,
    /// How often the background sweeper looks for idle sessions.
    pub sweep_interval_secs: u64,
    pub input_queue_capacity: usize,
    pub param_queue_capacity: usize,
    pub timer_mode: TimerMode,
    /// Catalog entry used when a client does not name a ROM.
    pub default_rom: Option<SmolStr>,
    pub roms: BTreeMap<SmolStr, RomDescriptor>,
}

impl Default for ManagerConf {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_ttl_secs: DEFAULT_IDLE_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            input_queue_capacity: DEFAULT_INPUT_QUEUE_CAPACITY,
            param_queue_capacity: DEFAULT_PARAM_QUEUE_CAPACITY,
            timer_mode: TimerMode::default(),
            default_rom: None,
            roms: BTreeMap::new(),
        }
    }
}

impl ManagerConf {
    pub fn from_file(filepath: impl AsRef<Path>) -> SessionResult<Self> {
        let file = fs::File::open(filepath.as_ref())?;
        let conf: ManagerConf = serde_yaml::from_reader(file)?;
        debug!("loaded manager configuration: {conf:#?}");
        Ok(conf)
    }

    pub fn from_yaml(source: &str) -> SessionResult<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn rom(&self, name: &str) -> Option<&RomDescriptor> {
        self.roms.get(name)
    }

    /// The named ROM, or the configured default when no name is given.
    pub fn resolve_rom(&self, name: Option<&str>) -> Option<&RomDescriptor> {
        match name {
            Some(name) => self.rom(name),
            None => self.default_rom.as_deref().and_then(|name| self.rom(name)),
        }
    }
}

/// Catalog entry describing a ROM on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RomDescriptor {
    pub path: PathBuf,
    pub frame_rate: NonZeroU32,
    pub cycles_per_frame: NonZeroU32,
}

impl RomDescriptor {
    /// Read the ROM bytes from disk.
    pub fn load(&self) -> SessionResult<Rom> {
        let bytes = fs::read(&self.path)?;
        Ok(Rom {
            bytes,
            frame_rate: self.frame_rate,
            cycles_per_frame: self.cycles_per_frame,
        })
    }
}

/// Program ready to be loaded into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    pub bytes: Vec<u8>,
    /// Frames produced per second.
    pub frame_rate: NonZeroU32,
    /// Instructions executed per frame.
    pub cycles_per_frame: NonZeroU32,
}

impl Rom {
    pub fn new(bytes: Vec<u8>, frame_rate: NonZeroU32, cycles_per_frame: NonZeroU32) -> Self {
        Self {
            bytes,
            frame_rate,
            cycles_per_frame,
        }
    }
}
