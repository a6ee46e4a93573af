use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which Bluetooth stack is used to talk to the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum TransportKind {
    /// Classic Bluetooth through the serial port of a paired device
    Serial,
    /// Bluetooth Low Energy, writing to a GATT characteristic
    Ble,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            TransportKind::Serial => "Bluetooth serial",
            TransportKind::Ble => "Bluetooth LE",
        };

        write!(f, "{}", result)
    }
}

/// A device as reported by a transport, before its name is normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ConnectionLost,
    BluetoothEnabled,
    BluetoothDisabled,
    Received(String),
    Error(String),
}
