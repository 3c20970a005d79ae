use std::collections::HashSet;
use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ScheduleEntry, TimeOfDay};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/verdant/verdant.toml";
pub const DEFAULT_CAPTURE_INTERVAL_SECS: u64 = 1800; // 30 minutes
pub const DEFAULT_SUMMARY_TIME: &str = "09:00";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SUMMARY_IMAGE_COUNT: usize = 6;
pub const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 30;

/// Top-level config (verdant.toml + VERDANT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdantConfig {
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub pump: PumpConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub scheduler: LoopConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub watering: Vec<WateringEntryConfig>,
    /// Seconds between periodic photos.
    #[serde(default = "default_capture_interval")]
    pub image_capture_interval: u64,
    #[serde(default = "default_summary_time")]
    pub daily_summary_time: String,
}

/// A schedule entry as written in the config file, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WateringEntryConfig {
    pub start_time: String,
    /// Seconds.
    pub duration: u64,
    #[serde(default = "default_interval_days")]
    pub interval_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PumpKind {
    /// Relay on a sysfs GPIO line.
    #[default]
    Gpio,
    /// Log activations without touching hardware.
    DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    #[serde(default)]
    pub kind: PumpKind,
    #[serde(default = "default_pin")]
    pub pin: u32,
    /// Most relay boards switch on a low level.
    #[serde(default)]
    pub active_high: bool,
    #[serde(default = "default_gpio_root")]
    pub gpio_root: String,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            kind: PumpKind::default(),
            pin: default_pin(),
            active_high: false,
            gpio_root: default_gpio_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::default(),
            path: default_state_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_camera_command")]
    pub command: String,
    #[serde(default = "default_camera_args")]
    pub args: Vec<String>,
    #[serde(default = "default_image_directory")]
    pub image_directory: String,
    #[serde(default = "default_capture_timeout")]
    pub timeout_secs: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_camera_command(),
            args: default_camera_args(),
            image_directory: default_image_directory(),
            timeout_secs: default_capture_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// How many of the newest images the daily summary carries.
    #[serde(default = "default_summary_image_count")]
    pub image_count: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            image_count: DEFAULT_SUMMARY_IMAGE_COUNT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_capture_interval() -> u64 {
    DEFAULT_CAPTURE_INTERVAL_SECS
}
fn default_summary_time() -> String {
    DEFAULT_SUMMARY_TIME.to_string()
}
fn default_interval_days() -> u32 {
    1
}
fn default_pin() -> u32 {
    17
}
fn default_gpio_root() -> String {
    "/sys/class/gpio".to_string()
}
fn default_state_path() -> String {
    "state.json".to_string()
}
fn default_camera_command() -> String {
    "rpicam-jpeg".to_string()
}
fn default_camera_args() -> Vec<String> {
    vec!["-c".to_string(), "camera_config.txt".to_string()]
}
fn default_image_directory() -> String {
    "images".to_string()
}
fn default_capture_timeout() -> u64 {
    DEFAULT_CAPTURE_TIMEOUT_SECS
}
fn default_summary_image_count() -> usize {
    DEFAULT_SUMMARY_IMAGE_COUNT
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl VerdantConfig {
    /// Load config from a TOML file with VERDANT_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `VERDANT_PUMP__PIN=27`. A missing file is an error: the daemon must
    /// never run with an empty schedule because its config was not found.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_PATH);
        if !Path::new(path).exists() {
            return Err(ConfigError::NotFound {
                path: path.to_string(),
            });
        }

        let config: VerdantConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("VERDANT_").split("__"))
            .extract()?;

        if config.schedule.watering.is_empty() {
            return Err(ConfigError::EmptySchedule {
                path: path.to_string(),
            });
        }
        // Surface entry errors at load time rather than when the loop starts.
        config.schedule_entries()?;
        config.summary_time()?;
        Ok(config)
    }

    /// Validated schedule entries in configuration order.
    pub fn schedule_entries(&self) -> Result<Vec<ScheduleEntry>, ConfigError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(self.schedule.watering.len());
        for raw in &self.schedule.watering {
            let start_time: TimeOfDay = raw.start_time.parse()?;
            let entry = ScheduleEntry::new(start_time, raw.duration, raw.interval_days);
            if raw.interval_days < 1 {
                return Err(ConfigError::InvalidInterval {
                    id: entry.id,
                    value: raw.interval_days,
                });
            }
            if !seen.insert(entry.id.clone()) {
                return Err(ConfigError::DuplicateEntry { id: entry.id });
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn summary_time(&self) -> Result<TimeOfDay, ConfigError> {
        self.schedule.daily_summary_time.parse()
    }

    pub fn capture_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.schedule.image_capture_interval)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.scheduler.poll_interval_ms)
    }
}
