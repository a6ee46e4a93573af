use std::collections::VecDeque;
use std::sync::Mutex;
use async_trait::async_trait;
use futures::channel::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::device::transport::Transport;
use crate::device::types::{DiscoveredDevice, TransportEvent, TransportKind};
use crate::error::DeviceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Enable,
    Scan,
    Connect(String),
    Disconnect,
    IsConnected,
    Write(Vec<u8>),
}

#[derive(Default)]
struct FakeInner {
    calls: Vec<Call>,
    scans: VecDeque<Result<Vec<DiscoveredDevice>, DeviceError>>,
    connect_failures: VecDeque<DeviceError>,
    disconnect_failures: VecDeque<DeviceError>,
    write_failures: VecDeque<DeviceError>,
    enable_failure: Option<DeviceError>,
    connected: bool,
}

/// Records every call and answers with scripted results. Unscripted calls succeed.
#[derive(Default)]
pub struct FakeTransport {
    inner: Mutex<FakeInner>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.calls().into_iter()
            .filter_map(|call| match call {
                Call::Write(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn push_scan(&self, result: Result<Vec<DiscoveredDevice>, DeviceError>) {
        self.inner.lock().unwrap().scans.push_back(result);
    }

    pub fn fail_next_connect(&self, err: DeviceError) {
        self.inner.lock().unwrap().connect_failures.push_back(err);
    }

    pub fn fail_next_disconnect(&self, err: DeviceError) {
        self.inner.lock().unwrap().disconnect_failures.push_back(err);
    }

    pub fn fail_next_write(&self, err: DeviceError) {
        self.inner.lock().unwrap().write_failures.push_back(err);
    }

    pub fn fail_enable(&self, err: DeviceError) {
        self.inner.lock().unwrap().enable_failure = Some(err);
    }

    /// Link state without recording a call.
    pub fn connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().unwrap().connected = connected;
    }
}

pub fn discovered(id: &str, name: Option<&str>) -> DiscoveredDevice {
    DiscoveredDevice { id: id.to_string(), name: name.map(str::to_string) }
}

#[async_trait]
impl Transport for FakeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    async fn enable(&self) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Enable);
        match inner.enable_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn scan(&self) -> Result<Vec<DiscoveredDevice>, DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Scan);
        inner.scans.pop_front().unwrap_or(Ok(vec![]))
    }

    async fn connect(&self, id: &str) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Connect(id.to_string()));
        if let Some(err) = inner.connect_failures.pop_front() {
            return Err(err);
        }
        inner.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Disconnect);
        inner.connected = false;
        match inner.disconnect_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn is_connected(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::IsConnected);
        inner.connected
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Write(bytes.to_vec()));
        match inner.write_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn monitor(&self, cancel: CancellationToken, _sender: Sender<TransportEvent>) -> Result<(), DeviceError> {
        cancel.cancelled().await;
        Ok(())
    }
}
