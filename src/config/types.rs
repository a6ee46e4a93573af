use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{DEFAULT_BAUD_RATE, DEFAULT_SCAN_DURATION};
use crate::device::types::TransportKind;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    // only list ports that the OS reports as bluetooth ports
    pub bluetooth_ports_only: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            bluetooth_ports_only: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BleConfig {
    pub service_filter: Option<String>,
    pub write_characteristic: Option<String>,
}

fn parse_uuid(value: &Option<String>) -> Result<Option<Uuid>, ConfigError> {
    match value {
        None => Ok(None),
        Some(value) => Uuid::parse_str(value)
            .map(Some)
            .map_err(|source| ConfigError::InvalidUuid { value: value.clone(), source }),
    }
}

impl BleConfig {
    pub fn service_filter_uuid(&self) -> Result<Option<Uuid>, ConfigError> {
        parse_uuid(&self.service_filter)
    }

    pub fn write_characteristic_uuid(&self) -> Result<Option<Uuid>, ConfigError> {
        parse_uuid(&self.write_characteristic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub transport: TransportKind,
    pub scan_duration_ms: u64,
    pub serial: SerialConfig,
    pub ble: BleConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ble.service_filter_uuid()?;
        self.ble.write_characteristic_uuid()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            transport: TransportKind::Ble,
            scan_duration_ms: DEFAULT_SCAN_DURATION,
            serial: SerialConfig::default(),
            ble: BleConfig::default(),
        }
    }
}
