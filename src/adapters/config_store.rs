//! Config persistence adapter.
//!
//! Implements [`ConfigPort`] over a single `postcard` blob, the same shape
//! as an NVS blob entry on the module. The host backend keeps the blob in
//! memory; tests can seed it with arbitrary bytes to exercise the corrupted
//! path.

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::LevelConfig;

/// Upper bound on a stored config blob.
const MAX_BLOB_SIZE: usize = 512;

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    blob: Option<Vec<u8>>,
    saves: u32,
    /// Simulate a failing flash write.
    read_only: bool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        info!("MemoryConfigStore: simulation backend");
        Self::default()
    }

    /// Start from raw stored bytes.
    pub fn with_blob(blob: Vec<u8>) -> Self {
        Self {
            blob: Some(blob),
            ..Self::default()
        }
    }

    /// Refuse every save with [`ConfigError::IoError`].
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn blob(&self) -> Option<&[u8]> {
        self.blob.as_deref()
    }

    /// Successful saves so far.
    pub fn saves(&self) -> u32 {
        self.saves
    }
}

impl ConfigPort for MemoryConfigStore {
    fn load(&self) -> Result<LevelConfig, ConfigError> {
        let Some(bytes) = &self.blob else {
            info!("MemoryConfigStore: no stored config, using defaults");
            return Ok(LevelConfig::default());
        };
        let cfg: LevelConfig = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        let (cfg, rejected) = cfg.sanitize();
        if rejected > 0 {
            warn!("MemoryConfigStore: {} stored field(s) out of range", rejected);
        }
        info!("MemoryConfigStore: loaded config from store");
        Ok(cfg)
    }

    fn save(&mut self, config: &LevelConfig) -> Result<(), ConfigError> {
        if self.read_only {
            return Err(ConfigError::IoError);
        }
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::IoError);
        }
        self.blob = Some(bytes);
        self.saves += 1;
        Ok(())
    }
}

/// Load from `store`, falling back to defaults on any error. Boot must
/// never stall on bad storage.
pub fn load_or_default(store: &impl ConfigPort) -> LevelConfig {
    match store.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("config load failed ({}), using defaults", e);
            LevelConfig::default()
        }
    }
}
