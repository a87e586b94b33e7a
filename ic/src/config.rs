//! Irrigation controller configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS};

/// Number of slots in every irrigation program
pub const DEFAULT_STEP_COUNT: usize = 6;

/// Mechanical valve lag plus safety margin, in seconds
pub const DEFAULT_TRANSITION_DELAY_SECS: u64 = 30;

/// Pause between consecutive steps so line pressure settles, in seconds
pub const DEFAULT_STEP_TRANSITION_DELAY_SECS: u64 = 30;

/// Main irrigation controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the JSON program definitions
    #[serde(rename = "programs-file")]
    pub programs_file: PathBuf,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Valve device connection settings
    pub device: DeviceConfig,

    /// Program shape
    pub program: ProgramConfig,

    /// Step timing
    pub sequencer: SequencerSettings,

    /// Retry policy for valve commands
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            programs_file: PathBuf::from("irrigation_programs.json"),
            log_level: None,
            device: DeviceConfig::default(),
            program: ProgramConfig::default(),
            sequencer: SequencerSettings::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_locations() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed here; `load` reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let paths = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::default_locations(),
        };
        paths
            .iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    /// Project-local `.irrigation.yml`, then `<config_dir>/irrigation/irrigation.yml`
    fn default_locations() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".irrigation.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("irrigation").join("irrigation.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Valve device connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device address (`host` or `host:port`); `--address` overrides it
    pub address: Option<String>,

    /// Bound on a whole request, independent of the retry interval
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// Bound on establishing the TCP connection
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: None,
            request_timeout_ms: 5000,
            connect_timeout_ms: 3000,
        }
    }
}

/// Program shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramConfig {
    /// Exact number of slots every program must have
    #[serde(rename = "step-count")]
    pub step_count: usize,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            step_count: DEFAULT_STEP_COUNT,
        }
    }
}

/// Step timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerSettings {
    /// Added to every hold and to every settle wait
    #[serde(rename = "transition-delay-secs")]
    pub transition_delay_secs: u64,

    /// Extra settle time after closing, before the next step
    #[serde(rename = "step-transition-delay-secs")]
    pub step_transition_delay_secs: u64,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            transition_delay_secs: DEFAULT_TRANSITION_DELAY_SECS,
            step_transition_delay_secs: DEFAULT_STEP_TRANSITION_DELAY_SECS,
        }
    }
}

impl SequencerSettings {
    pub fn transition_delay(&self) -> Duration {
        Duration::from_secs(self.transition_delay_secs)
    }

    pub fn step_transition_delay(&self) -> Duration {
        Duration::from_secs(self.step_transition_delay_secs)
    }
}

/// Retry policy for valve commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per command, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Fixed wait between attempts
    #[serde(rename = "interval-secs")]
    pub interval_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval_secs: DEFAULT_INTERVAL.as_secs(),
        }
    }
}
