use std::sync::Arc;
use async_trait::async_trait;
use futures::channel::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::device::ble::BleTransport;
use crate::device::serial::SerialTransport;
use crate::device::types::{DiscoveredDevice, TransportEvent, TransportKind};
use crate::error::{ConfigError, DeviceError};

/// The Bluetooth stack as seen by the connection state machine.
///
/// A transport holds at most one connection. Ids passed to `connect` are the ids returned by the
/// most recent `scan`.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Make sure the bluetooth stack is usable. Fails with a permission error if the OS does not
    /// allow this process to use bluetooth.
    async fn enable(&self) -> Result<(), DeviceError>;

    async fn scan(&self) -> Result<Vec<DiscoveredDevice>, DeviceError>;

    async fn connect(&self, id: &str) -> Result<(), DeviceError>;

    /// Disconnecting without a connection succeeds.
    async fn disconnect(&self) -> Result<(), DeviceError>;

    async fn is_connected(&self) -> bool;

    async fn write(&self, bytes: &[u8]) -> Result<(), DeviceError>;

    /// Forward events of the bluetooth stack to `sender` until `cancel` is cancelled.
    async fn monitor(&self, cancel: CancellationToken, sender: Sender<TransportEvent>) -> Result<(), DeviceError>;
}

pub fn open_transport(kind: TransportKind, config: &Config) -> Result<Arc<dyn Transport>, ConfigError> {
    let transport: Arc<dyn Transport> = match kind {
        TransportKind::Serial => Arc::new(SerialTransport::new(config.serial.clone())),
        TransportKind::Ble => Arc::new(BleTransport::new(
            config.ble.service_filter_uuid()?,
            config.ble.write_characteristic_uuid()?,
            config.scan_duration_ms,
        )),
    };
    Ok(transport)
}
