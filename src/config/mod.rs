//! Configuration: a TOML file, optionally overridden by CLI flags, cached
//! behind an `ArcSwap` for lock-free reads from hot paths.
//!
//! Grounded on `ConfigStore`'s `ArcSwap<AppConfig>` cache pattern, with the
//! SQLite-backed persistence dropped — this spec has no Non-goal exception
//! for "nothing to persist to a database", so a plain file load replaces it.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::dispatcher::DEFAULT_REPORT_RATE_HZ;
use crate::error::{AppError, Result};
use crate::transport::ble::APPEARANCE_GAMEPAD;

/// Which transport to bring up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Ble,
    Usb,
}

impl Default for TransportMode {
    fn default() -> Self {
        TransportMode::Ble
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    pub device_name: String,
    pub appearance: u16,
    pub static_address: Option<String>,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            device_name: "Handheld Controller".to_string(),
            appearance: APPEARANCE_GAMEPAD,
            static_address: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbConfig {
    pub gadget_name: String,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            gadget_name: "hidctl0".to_string(),
        }
    }
}

/// Top-level configuration, covering every option spec.md §6 names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: TransportMode,
    pub report_rate_hz: u32,
    pub input_device: String,
    pub verbose: u8,
    pub ble: BleConfig,
    pub usb: UsbConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            report_rate_hz: DEFAULT_REPORT_RATE_HZ,
            input_device: "auto".to_string(),
            verbose: 0,
            ble: BleConfig::default(),
            usb: UsbConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads from `path` if given and present, else starts from defaults.
    /// Never fails on a missing file — only on an unparsable one.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| AppError::Config(format!("{}: {e}", path.display())))
    }
}

/// Lock-free cache of the active configuration, read from hot paths
/// (the transmit loop, the control surface) without locking.
#[derive(Clone)]
pub struct ConfigStore {
    cache: Arc<ArcSwap<AppConfig>>,
}

impl ConfigStore {
    pub fn new(config: AppConfig) -> Self {
        Self {
            cache: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    pub fn set(&self, config: AppConfig) {
        self.cache.store(Arc::new(config));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.report_rate_hz, 100);
        assert_eq!(config.ble.appearance, 0x03C4);
        assert_eq!(config.input_device, "auto");
    }

    #[test]
    fn load_with_no_path_returns_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.mode, TransportMode::Ble);
    }

    #[test]
    fn load_with_missing_file_returns_defaults() {
        let config = AppConfig::load(Some(Path::new("/nonexistent/hidctl.toml"))).unwrap();
        assert_eq!(config.report_rate_hz, DEFAULT_REPORT_RATE_HZ);
    }

    #[test]
    fn store_get_reflects_set() {
        let store = ConfigStore::new(AppConfig::default());
        let mut updated = (*store.get()).clone();
        updated.report_rate_hz = 60;
        store.set(updated);
        assert_eq!(store.get().report_rate_hz, 60);
    }

    #[test]
    fn load_parses_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hidctl.toml");
        std::fs::write(
            &path,
            "mode = \"usb\"\nreport_rate_hz = 125\n\n[usb]\ngadget_name = \"custom0\"\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.mode, TransportMode::Usb);
        assert_eq!(config.report_rate_hz, 125);
        assert_eq!(config.usb.gadget_name, "custom0");
    }

    #[test]
    fn load_rejects_unparsable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hidctl.toml");
        std::fs::write(&path, "not valid toml {{{").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
