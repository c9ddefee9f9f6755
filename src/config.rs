//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::WatchdogError;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker loop configuration
    pub controller: ControllerConfig,

    /// Liveness watchdog configuration
    pub watchdog: WatchdogConfig,

    /// Playback subsystem
    pub playback: PlaybackConfig,

    /// Capture subsystem
    pub record: RecordConfig,

    /// Simulated backend used by the demo host
    pub simulation: SimulationConfig,
}

/// Worker loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Idle sleep between mailbox polls. Bounds worst-case command latency.
    pub poll_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ControllerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject a zero poll interval; the idle worker would spin
    pub fn validate(&self) -> crate::Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(crate::Error::Config(
                "controller poll interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Watchdog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Fatal escalation timeout
    pub timeout_ms: u64,

    /// Supervisory check period; half the timeout when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_interval_ms: Option<u64>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WATCHDOG_TIMEOUT_MS,
            check_interval_ms: None,
        }
    }
}

impl WatchdogConfig {
    /// Build a config from explicit durations
    pub fn with_timing(timeout: Duration, check_interval: Duration) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            check_interval_ms: Some(check_interval.as_millis() as u64),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.unwrap_or(self.timeout_ms / 2))
    }

    /// Reject timings the supervisory loop can't run with
    pub fn validate(&self) -> Result<(), WatchdogError> {
        if self.timeout_ms == 0 {
            return Err(WatchdogError::InvalidTiming("timeout must be non-zero".into()));
        }
        if self.check_interval().is_zero() {
            return Err(WatchdogError::InvalidTiming(
                "check interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Playback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Number of player slots
    pub max_players: usize,

    /// File used by start commands that name none
    pub default_file: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_players: MAX_PLAYERS,
            default_file: DEFAULT_PLAYBACK_FILE.to_string(),
        }
    }
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Number of recorder slots
    pub max_recorders: usize,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            max_recorders: MAX_RECORDERS,
        }
    }
}

/// Simulated backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time every backend call takes
    pub op_latency_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            op_latency_ms: DEFAULT_SIM_OP_LATENCY_MS,
        }
    }
}

impl SimulationConfig {
    pub fn op_latency(&self) -> Duration {
        Duration::from_millis(self.op_latency_ms)
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.controller.validate()?;
        config.watchdog.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "audio-functions", "audio-control")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or the default location, falling back to defaults
    /// when no file exists there
    pub fn load_or_default(path: Option<&Path>) -> crate::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };
        Self::load(&path)
    }
}
