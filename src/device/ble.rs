use std::collections::HashMap;
use async_trait::async_trait;
use btleplug::api::{Central, CentralState, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::SinkExt;
use futures::channel::mpsc::Sender;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{IS_CONNECTED_DEADLINE, POLL_DELAY, WRITE_DEADLINE};
use crate::device::transport::Transport;
use crate::device::types::{DiscoveredDevice, TransportEvent, TransportKind};
use crate::error::DeviceError;

struct ActiveConnection {
    id: String,
    peripheral: Peripheral,
    // None if the device has no characteristic we can write to; writes fail later
    write_char: Option<Characteristic>,
}

#[derive(Default)]
struct BleInner {
    manager: Option<Manager>,
    // peripherals seen by the most recent scan
    peripherals: HashMap<String, Peripheral>,
    active: Option<ActiveConnection>,
}

pub struct BleTransport {
    service_filter: Option<Uuid>,
    write_characteristic: Option<Uuid>,
    scan_duration: Duration,
    inner: Mutex<BleInner>,
}

// Some platforms (macOS) do not expose the hardware address, use the platform id there.
fn peripheral_key(peripheral: &Peripheral) -> String {
    let address = peripheral.address();
    if address.into_inner() == [0u8; 6] {
        format!("{:?}", peripheral.id())
    } else {
        address.to_string()
    }
}

fn is_writable(characteristic: &Characteristic) -> bool {
    characteristic.properties.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
}

/// Picks the characteristic that outbound frames are written to: the configured one if the device
/// has it, otherwise the first writable characteristic.
fn select_write_characteristic<'a>(
    characteristics: impl IntoIterator<Item = &'a Characteristic>,
    preferred: Option<Uuid>,
) -> Option<Characteristic> {
    let writable: Vec<&Characteristic> = characteristics.into_iter().filter(|c| is_writable(c)).collect();

    if let Some(preferred) = preferred {
        if let Some(characteristic) = writable.iter().find(|c| c.uuid == preferred) {
            return Some((*characteristic).clone());
        }
        warn!("Characteristic {} is not available or not writable, using the first writable one", preferred);
    }

    writable.first().map(|c| (*c).clone())
}

// Some environments ignore the scan filter. A peripheral whose services are unknown can not be
// checked, so it is dropped as well.
fn passes_service_filter(filter: Option<Uuid>, services: Option<&[Uuid]>) -> bool {
    match (filter, services) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(filter), Some(services)) => services.contains(&filter),
    }
}

fn take_if<T>(slot: &mut Option<T>, predicate: impl FnOnce(&T) -> bool) -> Option<T> {
    if slot.as_ref().map_or(false, predicate) {
        slot.take()
    } else {
        None
    }
}

/// Bluetooth counts as enabled if at least one adapter has its radio turned on.
fn any_powered_on(states: impl IntoIterator<Item = CentralState>) -> bool {
    states.into_iter().any(|state| matches!(state, CentralState::PoweredOn))
}

fn write_type(characteristic: &Characteristic) -> WriteType {
    if characteristic.properties.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        WriteType::WithoutResponse
    } else {
        WriteType::WithResponse
    }
}

async fn is_peripheral_connected(peripheral: &Peripheral) -> bool {
    tokio::select! {
        _ = sleep(Duration::from_millis(IS_CONNECTED_DEADLINE)) => {
            // macOS
            warn!("Checking for connection status took too long");
            false
        }
        result = peripheral.is_connected() => match result {
            Err(err) => {
                warn!("Error checking for connection state: {:?}", err);
                false
            },
            Ok(connected) => connected,
        }
    }
}

impl BleTransport {
    pub fn new(service_filter: Option<Uuid>, write_characteristic: Option<Uuid>, scan_duration_ms: u64) -> Self {
        BleTransport {
            service_filter,
            write_characteristic,
            scan_duration: Duration::from_millis(scan_duration_ms),
            inner: Mutex::new(BleInner::default()),
        }
    }

    async fn adapters(&self) -> Result<Vec<Adapter>, DeviceError> {
        let mut inner = self.inner.lock().await;
        if inner.manager.is_none() {
            inner.manager = Some(Manager::new().await?);
        }

        let manager = inner.manager.as_ref().ok_or(DeviceError::NoAdapter)?;
        let adapters = manager.adapters().await?;
        if adapters.is_empty() {
            return Err(DeviceError::NoAdapter);
        }
        Ok(adapters)
    }

    /// The adapters whose radio is turned on. Adapters are listed by the OS even while powered
    /// off, so the state of every adapter is checked.
    async fn powered_adapters(&self) -> Result<Vec<Adapter>, DeviceError> {
        let mut powered = Vec::new();

        for adapter in self.adapters().await? {
            let state = match adapter.adapter_state().await {
                Ok(state) => state,
                Err(err) => {
                    warn!("Failed to query adapter state: {:?}", err);
                    continue;
                },
            };

            debug!("Adapter state: {:?}", state);
            if any_powered_on([state]) {
                powered.push(adapter);
            }
        }

        if powered.is_empty() {
            return Err(DeviceError::PoweredOff);
        }
        Ok(powered)
    }

    async fn collect_peripherals(&self, adapters: &[Adapter]) -> Vec<(String, Peripheral, Option<String>)> {
        let mut found = Vec::new();

        for adapter in adapters {
            let peripherals = match adapter.peripherals().await {
                Ok(v) => v,
                Err(err) => {
                    warn!("Failed to query BLE adapter for peripherals: {}", err);
                    continue;
                },
            };

            for peripheral in peripherals {
                let properties = match peripheral.properties().await {
                    Ok(properties) => properties,
                    Err(err) => {
                        warn!("Could not query peripheral for properties: {:?}", err);
                        None
                    },
                };

                let services = properties.as_ref().map(|properties| properties.services.as_slice());
                if !passes_service_filter(self.service_filter, services) {
                    debug!("Skipping peripheral {} outside of the service filter", peripheral_key(&peripheral));
                    continue;
                }
                let name = properties.and_then(|properties| properties.local_name);

                let key = peripheral_key(&peripheral);
                debug!("Found peripheral {} {:?}", key, name);
                found.push((key, peripheral, name));
            }
        }

        found
    }

    async fn active_peripheral(&self) -> Option<(String, Peripheral)> {
        let inner = self.inner.lock().await;
        inner.active.as_ref().map(|active| (active.id.clone(), active.peripheral.clone()))
    }

    /// Drops the active connection, unless it was replaced by a connection to another device.
    /// Returns whether it was dropped.
    async fn drop_active(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        take_if(&mut inner.active, |active| active.id == id).is_some()
    }

    async fn stop_scans(adapters: &[&Adapter]) {
        for adapter in adapters {
            if let Err(err) = adapter.stop_scan().await {
                warn!("Failed to stop scanning: {:?}", err);
            }
        }
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    async fn enable(&self) -> Result<(), DeviceError> {
        for adapter in self.powered_adapters().await? {
            info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        }
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<DiscoveredDevice>, DeviceError> {
        let adapters = self.powered_adapters().await?;

        let filter = ScanFilter {
            services: self.service_filter.into_iter().collect(),
        };

        let mut scanning = Vec::with_capacity(adapters.len());
        for adapter in &adapters {
            info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
            if let Err(err) = adapter.start_scan(filter.clone()).await {
                Self::stop_scans(&scanning).await;
                return Err(err.into());
            }
            scanning.push(adapter);
        }

        sleep(self.scan_duration).await;

        Self::stop_scans(&scanning).await;

        let found = self.collect_peripherals(&adapters).await;
        info!("Scan found {} peripherals", found.len());

        let mut inner = self.inner.lock().await;
        inner.peripherals.clear();
        let mut devices = Vec::with_capacity(found.len());
        for (id, peripheral, name) in found {
            inner.peripherals.insert(id.clone(), peripheral);
            devices.push(DiscoveredDevice { id, name });
        }

        Ok(devices)
    }

    async fn connect(&self, id: &str) -> Result<(), DeviceError> {
        let peripheral = {
            let inner = self.inner.lock().await;
            inner.peripherals.get(id).cloned()
                .ok_or_else(|| DeviceError::UnknownDevice { id: id.to_string() })?
        };

        info!("Connecting to peripheral {}...", id);
        peripheral.connect().await?;

        info!("Connected; Discovering services...");
        if let Err(err) = peripheral.discover_services().await {
            if let Err(disconnect_err) = peripheral.disconnect().await {
                warn!("Failed to disconnect after failed service discovery: {:?}", disconnect_err);
            }
            return Err(err.into());
        }

        let write_char = select_write_characteristic(&peripheral.characteristics(), self.write_characteristic);
        match &write_char {
            Some(characteristic) => info!("Writing to characteristic {:?}", characteristic.uuid),
            None => warn!("Peripheral {} has no writable characteristic", id),
        }

        let mut inner = self.inner.lock().await;
        inner.active = Some(ActiveConnection { id: id.to_string(), peripheral, write_char });
        info!("Peripheral ready");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        let active = self.inner.lock().await.active.take();

        if let Some(active) = active {
            info!("Disconnecting from peripheral {}", active.id);
            active.peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        match self.active_peripheral().await {
            None => false,
            Some((_, peripheral)) => is_peripheral_connected(&peripheral).await,
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        let (peripheral, write_char) = {
            let inner = self.inner.lock().await;
            let active = inner.active.as_ref().ok_or(DeviceError::NotConnected)?;
            let write_char = active.write_char.clone().ok_or(DeviceError::MissingCharacteristic)?;
            (active.peripheral.clone(), write_char)
        };

        let fut = peripheral.write(&write_char, bytes, write_type(&write_char));

        tokio::select! {
            _ = sleep(Duration::from_millis(WRITE_DEADLINE)) => {
                warn!("Sending to characteristic took too long");
                Err(DeviceError::Timeout)
            }
            result = fut => {
                result?;
                Ok(())
            }
        }
    }

    async fn monitor(&self, cancel: CancellationToken, mut sender: Sender<TransportEvent>) -> Result<(), DeviceError> {
        let mut bluetooth_enabled: Option<bool> = None;

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                _ = sleep(Duration::from_millis(POLL_DELAY)) => {},
            }

            let enabled = match self.powered_adapters().await {
                Ok(_) => true,
                Err(err) => {
                    debug!("No usable adapter: {:?}", err);
                    false
                },
            };

            if bluetooth_enabled != Some(enabled) {
                // the initial state is reported by Transport::enable
                if bluetooth_enabled.is_some() {
                    let event = if enabled { TransportEvent::BluetoothEnabled } else { TransportEvent::BluetoothDisabled };
                    info!("Bluetooth state changed: {:?}", event);
                    if sender.send(event).await.is_err() {
                        break 'mainloop;
                    }
                }
                bluetooth_enabled = Some(enabled);
            }

            if let Some((id, peripheral)) = self.active_peripheral().await {
                // the connection may have been replaced while the check was pending
                if !is_peripheral_connected(&peripheral).await && self.drop_active(&id).await {
                    warn!("Connection to {} lost", id);
                    if sender.send(TransportEvent::ConnectionLost).await.is_err() {
                        break 'mainloop;
                    }
                }
            }
        }

        Ok(())
    }
}
