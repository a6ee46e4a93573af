//! The connection lifecycle of the remote, independent of any user interface.
//!
//! [`Remote`] is a synchronous state machine. Every operation that reaches the transport is split
//! in three steps: `begin_*` validates and moves the state forward (returning a plan, or `None`
//! if the operation is not allowed right now), a `run_*` future performs the transport calls, and
//! `finish_*` applies the outcome. The GUI runs the futures as commands; the command line and the
//! tests use the `async` helpers at the bottom of the impl that chain the three steps.

use std::collections::VecDeque;
use log::{debug, info, warn};

use crate::device::transport::Transport;
use crate::device::types::{DiscoveredDevice, TransportEvent};
use crate::error::RemoteError;
use crate::remote::channel::Frame;
use crate::remote::connection::{BusyFlags, ConnectionState};
use crate::remote::discovery::{Device, DeviceList};
use crate::remote::gate::CapabilityState;

pub mod channel;
pub mod connection;
pub mod discovery;
pub mod gate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Error,
    /// A line received from the device
    Notice,
}

/// A message that the user must click away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    pub fn error(message: impl Into<String>) -> Self {
        Alert { kind: AlertKind::Error, message: message.into() }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Alert { kind: AlertKind::Notice, message: message.into() }
    }

    pub fn title(&self) -> &'static str {
        match self.kind {
            AlertKind::Error => "Error",
            AlertKind::Notice => "Alert!",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanPlan {
    /// Connected device to disconnect before scanning
    pub release: Option<Device>,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub released: Option<Result<(), RemoteError>>,
    pub devices: Result<Vec<DiscoveredDevice>, RemoteError>,
}

#[derive(Debug, Clone)]
pub struct ConnectPlan {
    /// Connected device to disconnect before connecting
    pub release: Option<Device>,
    pub device: Device,
}

#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub released: Option<Result<(), RemoteError>>,
    pub result: Result<(), RemoteError>,
}

pub async fn run_enable(transport: &dyn Transport) -> Result<(), RemoteError> {
    transport.enable().await.map_err(|err| {
        warn!("Enabling {} failed: {:?}", transport.kind(), err);
        RemoteError::from(err)
    })
}

pub async fn run_disconnect(transport: &dyn Transport, device: &Device) -> Result<(), RemoteError> {
    info!("Disconnecting from {} ({})", device.name, device.id);
    transport.disconnect().await.map_err(|err| {
        warn!("Disconnecting from {} failed: {:?}", device.id, err);
        RemoteError::from(err)
    })
}

/// Releases the transport after the connection was already dropped by an event. Failures are only
/// logged.
pub async fn run_release(transport: &dyn Transport, device: &Device) {
    let _ = run_disconnect(transport, device).await;
}

pub async fn run_scan(transport: &dyn Transport, plan: ScanPlan) -> ScanOutcome {
    let released = match &plan.release {
        Some(device) => Some(run_disconnect(transport, device).await),
        None => None,
    };

    let devices = transport.scan().await.map_err(|err| {
        warn!("Scanning failed: {:?}", err);
        RemoteError::from(err)
    });

    ScanOutcome { released, devices }
}

pub async fn run_connect(transport: &dyn Transport, plan: ConnectPlan) -> ConnectOutcome {
    let released = match &plan.release {
        Some(device) => Some(run_disconnect(transport, device).await),
        None => None,
    };

    info!("Connecting to {} ({})", plan.device.name, plan.device.id);
    let result = transport.connect(&plan.device.id).await.map_err(|err| {
        warn!("Connecting to {} failed: {:?}", plan.device.id, err);
        RemoteError::from(err)
    });

    ConnectOutcome { released, result }
}

pub async fn run_send(transport: &dyn Transport, frame: Frame) -> Result<(), RemoteError> {
    if !transport.is_connected().await {
        return Err(RemoteError::NotConnected);
    }

    debug!("Writing frame {:?}", String::from_utf8_lossy(frame.as_bytes()));
    transport.write(frame.as_bytes()).await.map_err(|err| {
        warn!("Writing to device failed: {:?}", err);
        RemoteError::from(err)
    })
}

#[derive(Debug, Default)]
pub struct Remote {
    capability: CapabilityState,
    devices: DeviceList,
    connection: ConnectionState,
    busy: BusyFlags,
    alerts: VecDeque<Alert>,
}

impl Remote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capability(&self) -> &CapabilityState {
        &self.capability
    }

    pub fn devices(&self) -> &DeviceList {
        &self.devices
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn connected_device(&self) -> Option<&Device> {
        self.connection.connected_device()
    }

    pub fn busy(&self) -> &BusyFlags {
        &self.busy
    }

    pub fn alerts(&self) -> &VecDeque<Alert> {
        &self.alerts
    }

    pub fn current_alert(&self) -> Option<&Alert> {
        self.alerts.front()
    }

    pub fn dismiss_alert(&mut self) {
        self.alerts.pop_front();
    }

    pub fn can_operate(&self) -> bool {
        self.capability.can_operate()
    }

    pub fn can_press_buttons(&self) -> bool {
        !self.busy.any()
    }

    pub fn can_scan(&self) -> bool {
        self.can_operate() && self.can_press_buttons()
    }

    /// Whether the device buttons are enabled. They stay disabled while a device is connected.
    pub fn can_connect(&self) -> bool {
        self.can_scan() && self.connection.is_disconnected()
    }

    fn push_error(&mut self, err: &RemoteError) {
        self.alerts.push_back(Alert::error(err.to_string()));
    }

    // Connected(device) -> Disconnecting(device)
    fn release_connection(&mut self) -> Option<Device> {
        match std::mem::take(&mut self.connection) {
            ConnectionState::Connected(device) => {
                self.connection = ConnectionState::Disconnecting(device.clone());
                Some(device)
            },
            other => {
                self.connection = other;
                None
            },
        }
    }

    fn complete_release(&mut self, released: Option<Result<(), RemoteError>>) {
        let Some(result) = released else {
            return;
        };

        if let ConnectionState::Disconnecting(device) = &self.connection {
            info!("Disconnected from {}", device.id);
            self.connection = ConnectionState::Disconnected;
        }

        if let Err(err) = result {
            self.push_error(&err);
        }
    }

    // Connected(device) -> Disconnected, for events that end the connection
    fn drop_connection(&mut self) -> Option<Device> {
        match std::mem::take(&mut self.connection) {
            ConnectionState::Connected(device) => Some(device),
            other => {
                self.connection = other;
                None
            },
        }
    }

    pub fn enable_complete(&mut self, result: Result<(), RemoteError>) {
        self.capability.apply_enable_result(&result);
        info!("Capabilities: {:?}", self.capability);

        if let Err(err) = result {
            self.push_error(&err);
        }
    }

    pub fn begin_scan(&mut self) -> Option<ScanPlan> {
        if !self.can_scan() {
            debug!("Scan refused: capabilities {:?}, busy {:?}", self.capability, self.busy);
            return None;
        }

        self.busy.scanning = true;
        Some(ScanPlan { release: self.release_connection() })
    }

    pub fn finish_scan(&mut self, outcome: ScanOutcome) {
        self.complete_release(outcome.released);

        match outcome.devices {
            Ok(devices) => {
                self.devices = DeviceList::from_scan(devices);
                info!("Found {} devices", self.devices.len());
            },
            Err(err) => self.push_error(&err),
        }

        self.busy.scanning = false;
    }

    pub fn begin_connect(&mut self, device: Device) -> Option<ConnectPlan> {
        if !self.can_scan() {
            debug!("Connect refused: capabilities {:?}, busy {:?}", self.capability, self.busy);
            return None;
        }

        self.busy.connecting = true;
        let release = self.drop_connection();
        self.connection = ConnectionState::Connecting(device.clone());
        Some(ConnectPlan { release, device })
    }

    pub fn finish_connect(&mut self, outcome: ConnectOutcome) {
        self.complete_release(outcome.released);
        self.busy.connecting = false;

        let device = match std::mem::take(&mut self.connection) {
            ConnectionState::Connecting(device) => device,
            other => {
                warn!("Connect completed while {:?}", other);
                self.connection = other;
                return;
            },
        };

        match outcome.result {
            Ok(()) => {
                info!("Connected to {} ({})", device.name, device.id);
                self.connection = ConnectionState::Connected(device);
            },
            Err(err) => {
                self.connection = ConnectionState::Disconnected;
                self.push_error(&err);
            },
        }
    }

    /// Returns the device to disconnect, or `None` if there is nothing to do.
    pub fn begin_disconnect(&mut self) -> Option<Device> {
        if self.busy.any() {
            debug!("Disconnect refused: busy {:?}", self.busy);
            return None;
        }

        let device = self.release_connection()?;
        self.busy.disconnecting = true;
        Some(device)
    }

    pub fn finish_disconnect(&mut self, result: Result<(), RemoteError>) {
        self.complete_release(Some(result));
        self.busy.disconnecting = false;
    }

    pub fn begin_send(&mut self, text: &str) -> Option<Frame> {
        if self.busy.any() {
            debug!("Send refused: busy {:?}", self.busy);
            return None;
        }

        if self.connected_device().is_none() {
            self.push_error(&RemoteError::NotConnected);
            return None;
        }

        self.busy.sending = true;
        Some(Frame::new(text))
    }

    pub fn finish_send(&mut self, result: Result<(), RemoteError>) {
        if let Err(err) = result {
            self.push_error(&err);
        }
        self.busy.sending = false;
    }

    /// Applies an event from the transport. Returns a device whose connection was dropped; the
    /// caller releases it with [`run_release`].
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<Device> {
        match event {
            TransportEvent::ConnectionLost => {
                let dropped = self.drop_connection();
                if let Some(device) = &dropped {
                    warn!("Connection to {} lost", device.id);
                }
                dropped
            },
            TransportEvent::BluetoothEnabled => {
                let dropped = self.drop_connection();
                self.capability.bluetooth_enabled = true;
                dropped
            },
            TransportEvent::BluetoothDisabled => {
                let dropped = self.drop_connection();
                self.capability.bluetooth_enabled = false;
                dropped
            },
            TransportEvent::Received(line) => {
                self.alerts.push_back(Alert::notice(line));
                None
            },
            TransportEvent::Error(message) => {
                self.push_error(&RemoteError::Transport { message });
                None
            },
        }
    }

    pub async fn enable(&mut self, transport: &dyn Transport) {
        let result = run_enable(transport).await;
        self.enable_complete(result);
    }

    pub async fn scan(&mut self, transport: &dyn Transport) {
        if let Some(plan) = self.begin_scan() {
            let outcome = run_scan(transport, plan).await;
            self.finish_scan(outcome);
        }
    }

    pub async fn connect(&mut self, transport: &dyn Transport, device: Device) {
        if let Some(plan) = self.begin_connect(device) {
            let outcome = run_connect(transport, plan).await;
            self.finish_connect(outcome);
        }
    }

    pub async fn disconnect(&mut self, transport: &dyn Transport) {
        if let Some(device) = self.begin_disconnect() {
            let result = run_disconnect(transport, &device).await;
            self.finish_disconnect(result);
        }
    }

    pub async fn send(&mut self, transport: &dyn Transport, text: &str) {
        if let Some(frame) = self.begin_send(text) {
            let result = run_send(transport, frame).await;
            self.finish_send(result);
        }
    }

    pub async fn apply_event(&mut self, transport: &dyn Transport, event: TransportEvent) {
        if let Some(device) = self.handle_event(event) {
            run_release(transport, &device).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::{discovered, Call, FakeTransport};
    use crate::error::DeviceError;

    async fn enabled_remote(transport: &FakeTransport) -> Remote {
        let mut remote = Remote::new();
        remote.enable(transport).await;
        assert!(remote.can_operate());
        transport.clear_calls();
        remote
    }

    async fn connected_remote(transport: &FakeTransport, id: &str) -> Remote {
        let mut remote = enabled_remote(transport).await;
        remote.connect(transport, Device::new(id, Some("Robot"))).await;
        assert!(remote.connected_device().is_some());
        transport.clear_calls();
        remote
    }

    #[tokio::test]
    async fn test_scan_is_not_actionable_without_bluetooth() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;
        remote.handle_event(TransportEvent::BluetoothDisabled);

        assert!(!remote.can_scan());
        remote.scan(&transport).await;

        assert!(transport.calls().is_empty());
        assert!(remote.alerts().is_empty());
        assert!(!remote.busy().scanning);
    }

    #[tokio::test]
    async fn test_scan_is_not_actionable_before_enable() {
        let transport = FakeTransport::new();
        let mut remote = Remote::new();
        remote.scan(&transport).await;
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scan_normalizes_and_deduplicates() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;

        transport.push_scan(Ok(vec![discovered("A", Some("")), discovered("B", Some("Robot")), discovered("A", Some("dup"))]));
        remote.scan(&transport).await;

        let devices: Vec<(&str, &str)> = remote.devices().iter().map(|d| (d.id.as_str(), d.name.as_str())).collect();
        assert_eq!(devices, vec![("A", "A"), ("B", "Robot")]);

        // the list is replaced, not appended to
        transport.push_scan(Ok(vec![discovered("C", None), discovered("B", Some("Robot")), discovered("C", None)]));
        remote.scan(&transport).await;

        let ids: Vec<&str> = remote.devices().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B"]);
        assert!(remote.alerts().is_empty());
        assert!(!remote.busy().scanning);
    }

    #[tokio::test]
    async fn test_scan_error_keeps_previous_list() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;

        transport.push_scan(Ok(vec![discovered("A", None)]));
        remote.scan(&transport).await;

        transport.push_scan(Err(DeviceError::Timeout));
        remote.scan(&transport).await;

        assert_eq!(remote.devices().len(), 1);
        assert_eq!(remote.alerts().len(), 1);
        assert_eq!(remote.current_alert().unwrap().kind, AlertKind::Error);
        assert!(!remote.busy().scanning);
        assert!(remote.can_scan());
    }

    #[tokio::test]
    async fn test_scan_disconnects_first() {
        let transport = FakeTransport::new();
        let mut remote = connected_remote(&transport, "AA:BB").await;

        remote.scan(&transport).await;

        assert_eq!(transport.calls(), vec![Call::Disconnect, Call::Scan]);
        assert_eq!(remote.connection(), &ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_shows_id_for_blank_name() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;

        remote.connect(&transport, Device::new("AA:BB", Some(""))).await;

        assert_eq!(transport.calls(), vec![Call::Connect("AA:BB".to_string())]);
        assert_eq!(remote.connected_device().unwrap().name, "AA:BB");
        assert!(!remote.busy().connecting);
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_disconnected() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;
        transport.push_scan(Ok(vec![discovered("A", None), discovered("B", None)]));
        remote.scan(&transport).await;
        let devices_before = remote.devices().clone();

        transport.fail_next_connect(DeviceError::Timeout);
        let device = remote.devices().get("A").cloned().unwrap();
        remote.connect(&transport, device).await;

        assert_eq!(remote.connection(), &ConnectionState::Disconnected);
        assert_eq!(remote.devices(), &devices_before);
        assert_eq!(remote.alerts().len(), 1);
        assert!(!remote.busy().connecting);
    }

    #[tokio::test]
    async fn test_connect_while_connected_disconnects_first() {
        let transport = FakeTransport::new();
        let mut remote = connected_remote(&transport, "A").await;

        remote.connect(&transport, Device::new("B", None)).await;

        assert_eq!(transport.calls(), vec![Call::Disconnect, Call::Connect("B".to_string())]);
        assert_eq!(remote.connected_device().unwrap().id, "B");
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;

        remote.send(&transport, "FORWARD").await;

        assert!(transport.calls().is_empty());
        assert_eq!(remote.alerts().len(), 1);
        assert_eq!(remote.current_alert().unwrap().message, RemoteError::NotConnected.to_string());
        assert!(!remote.busy().sending);
    }

    #[tokio::test]
    async fn test_send_writes_one_frame() {
        let transport = FakeTransport::new();
        let mut remote = connected_remote(&transport, "AA:BB").await;

        remote.send(&transport, "FORWARD").await;

        assert_eq!(transport.writes(), vec![b"FORWARD\r".to_vec()]);
        assert!(remote.alerts().is_empty());
        assert!(!remote.busy().sending);
    }

    #[tokio::test]
    async fn test_send_checks_live_connection() {
        let transport = FakeTransport::new();
        let mut remote = connected_remote(&transport, "AA:BB").await;
        transport.set_connected(false);

        remote.send(&transport, "FORWARD").await;

        assert!(transport.writes().is_empty());
        assert_eq!(remote.current_alert().unwrap().message, RemoteError::NotConnected.to_string());
    }

    #[tokio::test]
    async fn test_send_without_writable_characteristic() {
        let transport = FakeTransport::new();
        let mut remote = connected_remote(&transport, "AA:BB").await;
        transport.fail_next_write(DeviceError::MissingCharacteristic);

        remote.send(&transport, "LEFT").await;

        assert_eq!(remote.current_alert().unwrap().message, RemoteError::NotWritable.to_string());
        // still connected, the user may try again
        assert!(remote.connected_device().is_some());
    }

    #[tokio::test]
    async fn test_disconnect_while_disconnected_is_a_noop() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;

        remote.disconnect(&transport).await;

        assert!(transport.calls().is_empty());
        assert!(remote.alerts().is_empty());
        assert_eq!(remote.connection(), &ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_failure_still_resets_state() {
        let transport = FakeTransport::new();
        let mut remote = connected_remote(&transport, "AA:BB").await;
        transport.fail_next_disconnect(DeviceError::Timeout);

        remote.disconnect(&transport).await;

        assert_eq!(remote.connection(), &ConnectionState::Disconnected);
        assert_eq!(remote.alerts().len(), 1);
        assert!(!remote.busy().disconnecting);
    }

    #[tokio::test]
    async fn test_connection_lost() {
        let transport = FakeTransport::new();
        let mut remote = connected_remote(&transport, "AA:BB").await;

        remote.apply_event(&transport, TransportEvent::ConnectionLost).await;

        assert_eq!(remote.connection(), &ConnectionState::Disconnected);
        assert!(remote.connected_device().is_none());
        assert_eq!(transport.calls(), vec![Call::Disconnect]);
        assert!(remote.can_connect());
    }

    #[tokio::test]
    async fn test_connection_lost_while_disconnected_does_nothing() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;

        remote.apply_event(&transport, TransportEvent::ConnectionLost).await;

        assert!(transport.calls().is_empty());
        assert!(remote.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_bluetooth_events_disconnect_and_update_capabilities() {
        let transport = FakeTransport::new();
        let mut remote = connected_remote(&transport, "AA:BB").await;

        remote.apply_event(&transport, TransportEvent::BluetoothDisabled).await;
        assert_eq!(remote.connection(), &ConnectionState::Disconnected);
        assert!(!remote.can_operate());
        assert_eq!(transport.calls(), vec![Call::Disconnect]);

        remote.apply_event(&transport, TransportEvent::BluetoothEnabled).await;
        assert!(remote.can_operate());
    }

    #[tokio::test]
    async fn test_busy_flags_block_other_operations() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;

        let plan = remote.begin_scan().unwrap();
        assert!(!remote.can_press_buttons());
        assert!(remote.begin_scan().is_none());
        assert!(remote.begin_connect(Device::new("A", None)).is_none());
        assert!(remote.begin_send("x").is_none());
        assert!(remote.begin_disconnect().is_none());
        assert!(remote.alerts().is_empty());

        let outcome = run_scan(&transport, plan).await;
        remote.finish_scan(outcome);
        assert!(remote.can_press_buttons());
    }

    #[tokio::test]
    async fn test_event_during_connect_is_last_write_wins() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;

        let plan = remote.begin_connect(Device::new("A", None)).unwrap();
        // no connection to drop yet, only the capability changes
        assert!(remote.handle_event(TransportEvent::BluetoothDisabled).is_none());
        let outcome = run_connect(&transport, plan).await;
        remote.finish_connect(outcome);

        assert_eq!(remote.connected_device().unwrap().id, "A");
        assert!(!remote.can_operate());
    }

    #[tokio::test]
    async fn test_enable_permission_denied() {
        let transport = FakeTransport::new();
        transport.fail_enable(DeviceError::Btle { source: btleplug::Error::PermissionDenied });
        let mut remote = Remote::new();

        remote.enable(&transport).await;

        assert!(!remote.can_operate());
        assert!(!remote.capability().permitted);
        assert_eq!(remote.current_alert().unwrap().message, RemoteError::PermissionDenied.to_string());
    }

    #[test]
    fn test_received_lines_and_errors_become_alerts() {
        let mut remote = Remote::new();
        remote.handle_event(TransportEvent::Received("DIST=12".to_string()));
        remote.handle_event(TransportEvent::Error("adapter reset".to_string()));

        assert_eq!(remote.current_alert(), Some(&Alert::notice("DIST=12")));
        assert_eq!(remote.current_alert().unwrap().title(), "Alert!");
        remote.dismiss_alert();
        assert_eq!(remote.current_alert(), Some(&Alert::error("adapter reset")));
        assert_eq!(remote.current_alert().unwrap().title(), "Error");
        remote.dismiss_alert();
        assert!(remote.current_alert().is_none());
        remote.dismiss_alert();
    }

    #[tokio::test]
    async fn test_at_most_one_device_connected() {
        let transport = FakeTransport::new();
        let mut remote = enabled_remote(&transport).await;
        let ids = ["A", "B", "C"];

        // deterministic pseudo random sequence of operations
        let mut seed: u32 = 12345;
        for _ in 0..300 {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            let pick = (seed >> 16) as usize;

            match pick % 5 {
                0 | 1 => {
                    if pick % 7 == 0 {
                        transport.fail_next_connect(DeviceError::Timeout);
                    }
                    remote.connect(&transport, Device::new(ids[pick % 3], None)).await;
                },
                2 => remote.disconnect(&transport).await,
                3 => remote.apply_event(&transport, TransportEvent::ConnectionLost).await,
                _ => remote.send(&transport, "PING").await,
            }

            assert!(remote.can_press_buttons());
            match remote.connection() {
                ConnectionState::Disconnected => assert!(!transport.connected()),
                ConnectionState::Connected(_) => assert!(transport.connected()),
                other => panic!("operation left transitional state {:?}", other),
            }
        }
    }
}
