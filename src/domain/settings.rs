use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Rolling log file output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFileSettings {
    pub dir: PathBuf,
    pub prefix: String,
    pub rotation: LogRotation,
}

impl Default for LogFileSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            prefix: "ble_ir_sender".to_string(),
            rotation: LogRotation::Daily,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. "info" or "ble_ir_sender=trace"
    pub level: String,
    /// Write to stderr
    pub console: bool,
    pub ansi_colors: bool,
    /// `null` keeps logs off disk
    pub file: Option<LogFileSettings>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            ansi_colors: true,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Target blaster, "AA:BB:CC:DD:EE:FF"
    #[serde(default)]
    pub device_address: Option<String>,

    // Connection Settings
    /// Bound on opening the link during one reconnect attempt
    #[serde(default = "default_reconnect_timeout_ms")]
    pub reconnect_timeout_ms: u64,
    /// Bound on service discovery once the link is open
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    /// 0 disables the liveness poll and relies on disconnect notifications only
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// 0 waits for the bound session forever
    #[serde(default)]
    pub initial_connect_timeout_ms: u64,

    // Request Settings
    /// 0 means callers wait for a reply indefinitely
    #[serde(default)]
    pub request_timeout_ms: u64,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_address: None,
            reconnect_timeout_ms: default_reconnect_timeout_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            initial_connect_timeout_ms: 0,
            request_timeout_ms: 0,
            log_settings: LogSettings::default(),
        }
    }
}

fn default_reconnect_timeout_ms() -> u64 {
    1000
}
fn default_discovery_timeout_ms() -> u64 {
    10_000
}
fn default_health_check_interval_ms() -> u64 {
    5000
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Runtime configuration handed to the driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Per-attempt bound on opening the link during a reconnect
    pub reconnect_timeout: Duration,
    /// Per-attempt bound on discovery after the link is open
    pub discovery_timeout: Duration,
    /// Liveness poll period, in addition to disconnect notifications
    pub health_check_interval: Option<Duration>,
    /// Default caller-side wait for a reply
    pub request_timeout: Option<Duration>,
    /// Bound on startup scan + connect + discovery
    pub initial_connect_timeout: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Settings::default().driver_config()
    }
}

impl Settings {
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            reconnect_timeout: Duration::from_millis(self.reconnect_timeout_ms.max(1)),
            discovery_timeout: Duration::from_millis(self.discovery_timeout_ms.max(1)),
            health_check_interval: non_zero_millis(self.health_check_interval_ms),
            request_timeout: non_zero_millis(self.request_timeout_ms),
            initial_connect_timeout: non_zero_millis(self.initial_connect_timeout_ms),
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load from the per-user config directory
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults when it is missing or unreadable
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BleIrSender");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Remember `address` as the default target, writing the file only when it changed.
    /// Returns whether the file was written.
    pub fn set_device_address(&mut self, address: &str) -> anyhow::Result<bool> {
        if self.settings.device_address.as_deref() == Some(address) {
            return Ok(false);
        }
        self.settings.device_address = Some(address.to_string());
        self.save()?;
        Ok(true)
    }
}
