//! Daemon configuration - `config.json` in PROVD_HOME

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ConfigError;

/// Get PROVD_HOME directory (`~/.provd` unless overridden)
pub fn provd_home() -> PathBuf {
    std::env::var("PROVD_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/var/lib"))
                .join(".provd")
        })
}

/// Optional request families this gateway serves
///
/// Resolved once at startup against the collaborators actually present,
/// see [`Capabilities::resolve`]. Requests for a disabled family are
/// answered with `ERR_API_DISABLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub wifi: bool,
    pub lte: bool,
    pub provisioning: bool,
    pub edge: bool,
    pub storage: bool,
    pub config_update: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            wifi: true,
            lte: false,
            provisioning: true,
            edge: false,
            storage: false,
            config_update: false,
        }
    }
}

impl Capabilities {
    /// Everything on; handy for benches and tests
    pub fn all() -> Self {
        Self {
            wifi: true,
            lte: true,
            provisioning: true,
            edge: true,
            storage: true,
            config_update: true,
        }
    }

    /// Drop families whose collaborator is missing
    pub fn resolve(self, services: &crate::Services) -> Self {
        let provisioning = self.provisioning && services.provisioning.is_some();
        Self {
            wifi: self.wifi,
            lte: self.lte && services.cellular.is_some(),
            provisioning,
            edge: self.edge && services.provisioning.is_some(),
            storage: self.storage && services.storage.is_some(),
            config_update: self.config_update,
        }
    }

    /// Request types advertised in the `deviceCaps` list of `getDeviceCaps`
    pub fn device_caps(&self) -> Vec<&'static str> {
        use provd_proto::RequestType::*;

        let mut caps = Vec::new();
        if self.storage {
            caps.extend([GetStorageInfo.as_str(), ExtStorageSwap.as_str()]);
        }
        if self.lte {
            caps.extend([ConnectLte.as_str(), GetLteInfo.as_str(), GetLteStatus.as_str()]);
        }
        if self.edge {
            caps.push(ProvisionEdge.as_str());
        }
        if self.config_update {
            caps.extend([UpdateConfig.as_str(), CheckUpdate.as_str()]);
        }
        caps
    }
}

/// Daemon configuration
///
/// All durations are in milliseconds so the file stays plain JSON.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name advertised over BLE and reported by `getDeviceId`
    pub device_name: String,
    pub chunk_size: usize,
    pub rx_idle_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub intermediate_report_ms: u64,
    pub activate_timeout_ms: u64,
    pub lte_timeout_ms: u64,
    pub provision_timeout_ms: u64,
    pub scan_batch_ms: u64,
    pub storage_report_ms: u64,
    pub storage_timeout_ms: u64,
    /// Inactivity watchdog armed by a short button press; `None` disables it
    pub inactivity_timeout_ms: Option<u64>,
    /// Grace period between the last response and radio power down
    pub shutdown_delay_ms: u64,
    pub capabilities: Capabilities,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: "provd gateway".to_string(),
            chunk_size: provd_proto::ble::DEFAULT_CHUNK_SIZE,
            rx_idle_timeout_ms: 2_000,
            poll_interval_ms: 500,
            intermediate_report_ms: 2_000,
            activate_timeout_ms: 30_000,
            lte_timeout_ms: 90_000,
            provision_timeout_ms: 300_000,
            scan_batch_ms: 2_000,
            storage_report_ms: 2_000,
            storage_timeout_ms: 600_000,
            inactivity_timeout_ms: Some(60_000),
            shutdown_delay_ms: 2_000,
            capabilities: Capabilities::default(),
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        provd_home().join("config.json")
    }

    /// Load the config, falling back to defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(write_err)?;
        }
        // Config holds only plain fields, so pretty printing cannot fail
        let data = serde_json::to_string_pretty(self).unwrap_or_default();
        std::fs::write(path, data).map_err(write_err)
    }

    pub fn timing(&self) -> Timing {
        let ms = Duration::from_millis;
        Timing {
            rx_idle: ms(self.rx_idle_timeout_ms),
            poll_interval: ms(self.poll_interval_ms),
            intermediate_report: ms(self.intermediate_report_ms),
            activate_timeout: ms(self.activate_timeout_ms),
            lte_timeout: ms(self.lte_timeout_ms),
            provision_timeout: ms(self.provision_timeout_ms),
            scan_batch: ms(self.scan_batch_ms),
            storage_report: ms(self.storage_report_ms),
            storage_timeout: ms(self.storage_timeout_ms),
        }
    }

    pub fn inactivity_timeout(&self) -> Option<Duration> {
        self.inactivity_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_millis(self.shutdown_delay_ms)
    }
}

/// Engine timer settings derived from [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub rx_idle: Duration,
    pub poll_interval: Duration,
    pub intermediate_report: Duration,
    pub activate_timeout: Duration,
    pub lte_timeout: Duration,
    pub provision_timeout: Duration,
    pub scan_batch: Duration,
    pub storage_report: Duration,
    pub storage_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Config::default().timing()
    }
}
