//! Persistent configuration for droidq.
//!
//! Stores user settings in `~/.droidq/config.json`. Every field has a default,
//! so a missing or partial file is fine.
//!
//! # Example
//!
//! ```no_run
//! use droidq_core::config::DroidqConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = DroidqConfig::load();
//! println!("adb binary: {}", config.adb_path.display());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

const CONFIG_FILENAME: &str = "config.json";

/// Returns the droidq data directory (`~/.droidq`), creating it if needed.
///
/// Falls back to a relative `.droidq` directory when no home directory can
/// be determined.
pub fn droidq_dir() -> PathBuf {
    let dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".droidq");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Persistent droidq configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroidqConfig {
    /// Path to (or name of) the `adb` executable.
    pub adb_path: PathBuf,

    /// Device serial used when none is given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_serial: Option<String>,

    /// Delay between dump attempts while the device reports `ERROR`.
    pub dump_retry_delay_ms: u64,

    /// Maximum number of dump attempts before giving up.
    pub dump_max_attempts: u32,

    /// How many times a failing `adb` invocation is retried.
    pub command_retries: u32,

    /// Default long-press duration.
    pub long_press_ms: u64,
}

impl Default for DroidqConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            default_serial: None,
            dump_retry_delay_ms: 500,
            dump_max_attempts: 20,
            command_retries: 5,
            long_press_ms: 250,
        }
    }
}

impl DroidqConfig {
    /// Load config from `~/.droidq/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&droidq_dir().join(CONFIG_FILENAME))
    }

    /// Load config from an explicit path, with the same fallback rules as [`load`](Self::load).
    pub fn load_from(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                debug!(path = %path.display(), error = %e, "Ignoring unparseable config");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to `~/.droidq/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        let path = droidq_dir().join(CONFIG_FILENAME);
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// [`dump_retry_delay_ms`](Self::dump_retry_delay_ms) as a [`Duration`].
    pub fn dump_retry_delay(&self) -> Duration {
        Duration::from_millis(self.dump_retry_delay_ms)
    }
}
