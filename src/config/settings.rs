use clap::ArgMatches;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::modbus::protocol::SlaveId;
use crate::modbus::transport::{
    BaudRate, ConnectionConfig, DEFAULT_READ_TIMEOUT_MS, DEFAULT_WRITE_TIMEOUT_MS,
};
use crate::utils::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// When false the lights are never driven; connecting is refused.
    pub enabled: bool,

    // Connection settings
    pub serial_port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,

    // Light actuators on the bus
    pub slaves: Vec<SlaveBinding>,

    pub blink: BlinkSettings,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParityConfig {
    #[default]
    None,
    Even,
    Odd,
}

/// A slave address bound to the device that answers on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlaveBinding {
    pub address: SlaveId,
    pub device: String, // Board type, e.g. "ESP32"
    pub label: String,  // Detection label the light belongs to
}

impl SlaveBinding {
    pub fn new(address: SlaveId, device: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            address,
            device: device.into(),
            label: label.into(),
        }
    }

    /// "ESP32 (songoku)"
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.device, self.label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BlinkSettings {
    pub cycles: u32,
    pub on_ms: u64,
    pub off_ms: u64,
}

impl BlinkSettings {
    pub fn on_duration(&self) -> Duration {
        Duration::from_millis(self.on_ms)
    }

    pub fn off_duration(&self) -> Duration {
        Duration::from_millis(self.off_ms)
    }
}

impl Default for BlinkSettings {
    fn default() -> Self {
        Self {
            cycles: 3,
            on_ms: 300,
            off_ms: 300,
        }
    }
}

pub fn find_slave_by_address(slaves: &[SlaveBinding], address: SlaveId) -> Option<&SlaveBinding> {
    slaves.iter().find(|s| s.address == address)
}

/// Case-insensitive, surrounding whitespace ignored.
pub fn find_slave_by_label<'a>(slaves: &'a [SlaveBinding], label: &str) -> Option<&'a SlaveBinding> {
    let label = label.trim();
    slaves.iter().find(|s| s.label.eq_ignore_ascii_case(label))
}

pub fn default_serial_port() -> &'static str {
    if cfg!(target_os = "windows") {
        "COM7"
    } else {
        "/dev/ttyUSB0"
    }
}

impl Default for Config {
    fn default() -> Self {
        let slaves = [(1, "ESP32", "songoku"), (2, "ESP8266", "dog")]
            .into_iter()
            .filter_map(|(address, device, label)| {
                SlaveId::new(address)
                    .ok()
                    .map(|id| SlaveBinding::new(id, device, label))
            })
            .collect();

        Self {
            enabled: true,
            serial_port: default_serial_port().to_string(),
            baud_rate: 9600,
            parity: ParityConfig::None,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            slaves,
            blink: BlinkSettings::default(),
        }
    }
}

impl Config {
    /// Loads `--config` when the file exists (defaults otherwise), then applies
    /// `--port` / `--baud` overrides.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) if Path::new(path).exists() => Self::from_file(path)?,
            Some(path) => {
                warn!("⚠ Config file {} not found, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        if let Some(port) = matches.get_one::<String>("port") {
            config.serial_port = port.clone();
        }
        if let Some(baud) = matches.get_one::<u32>("baud") {
            config.baud_rate = *baud;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("📄 Loaded config: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        info!("✅ Saved config: {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        BaudRate::try_from(self.baud_rate)?;

        let mut seen = HashSet::new();
        for slave in &self.slaves {
            if !seen.insert(slave.address) {
                return Err(ConfigError::DuplicateSlave(slave.address.get()));
            }
        }
        Ok(())
    }

    /// Serial settings for the master. Fails when the output is disabled.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        if !self.enabled {
            return Err(ConfigError::Disabled);
        }
        Ok(ConnectionConfig {
            port: self.serial_port.clone(),
            baud_rate: BaudRate::try_from(self.baud_rate)?,
            parity: self.parity,
            read_timeout_ms: self.read_timeout_ms,
            write_timeout_ms: self.write_timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::build_cli;

    fn matches_for(args: &[&str]) -> ArgMatches {
        let mut argv = vec!["rs485-lights"];
        argv.extend_from_slice(args);
        build_cli().try_get_matches_from(argv).unwrap()
    }

    #[test]
    fn test_default_deployment_bindings() {
        let config = Config::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.slaves.len(), 2);
        assert_eq!(config.slaves[0].display_name(), "ESP32 (songoku)");
        assert_eq!(config.slaves[1].display_name(), "ESP8266 (dog)");
        assert_eq!(config.blink, BlinkSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_slave_lookup_by_label_ignores_case() {
        let slaves = Config::default().slaves;
        let dog = find_slave_by_label(&slaves, " DOG ").unwrap();
        assert_eq!(dog.address.get(), 2);
        assert!(find_slave_by_label(&slaves, "cat").is_none());
        let id = SlaveId::new(1).unwrap();
        assert_eq!(find_slave_by_address(&slaves, id).unwrap().label, "songoku");
    }

    #[test]
    fn test_disabled_output_refuses_connection() {
        let config = Config {
            enabled: false,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert!(matches!(config.connection_config(), Err(ConfigError::Disabled)));
    }

    #[test]
    fn test_from_matches_applies_port_and_baud_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lights.toml");
        Config::default().save_to_file(&path).unwrap();
        let path = path.to_string_lossy().to_string();

        let config = Config::from_matches(&matches_for(&[
            "--config", path.as_str(), "--port", "COM3", "--baud", "115200", "all-off",
        ]))
        .unwrap();

        assert_eq!(config.serial_port, "COM3");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.slaves, Config::default().slaves);
    }

    #[test]
    fn test_from_matches_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let path = path.to_string_lossy().to_string();

        let config = Config::from_matches(&matches_for(&["ports", "--config", path.as_str()])).unwrap();

        assert_eq!(config, Config::default());
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_from_matches_rejects_unsupported_baud_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let path = path.to_string_lossy().to_string();

        let result = Config::from_matches(&matches_for(&[
            "--config", path.as_str(), "--baud", "19200", "ports",
        ]));

        assert!(matches!(result, Err(ConfigError::UnsupportedBaudRate(19200))));
    }

    #[test]
    fn test_disabled_flag_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lights.toml");
        std::fs::write(&path, "enabled = false\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert!(!loaded.enabled);
        assert_eq!(loaded.serial_port, default_serial_port());
    }

    #[test]
    fn test_connection_config_rejects_unknown_baud() {
        let config = Config {
            baud_rate: 57_600,
            ..Config::default()
        };
        assert!(matches!(
            config.connection_config(),
            Err(ConfigError::UnsupportedBaudRate(57_600))
        ));
    }

    #[test]
    fn test_duplicate_slave_rejected() {
        let mut config = Config::default();
        let first = config.slaves[0].clone();
        config.slaves.push(first);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateSlave(1))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lights.toml");

        let config = Config {
            serial_port: "COM3".to_string(),
            baud_rate: 115_200,
            ..Config::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lights.toml");
        std::fs::write(&path, "serial_port = \"/dev/ttyS1\"\n\n[blink]\ncycles = 5\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.serial_port, "/dev/ttyS1");
        assert_eq!(loaded.blink.cycles, 5);
        assert_eq!(loaded.blink.on_ms, 300);
        assert_eq!(loaded.slaves.len(), 2);
    }

    #[test]
    fn test_invalid_slave_address_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lights.toml");
        std::fs::write(
            &path,
            "[[slaves]]\naddress = 0\ndevice = \"ESP32\"\nlabel = \"songoku\"\n",
        )
        .unwrap();

        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));
    }
}
