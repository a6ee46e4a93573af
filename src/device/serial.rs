use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use futures::SinkExt;
use futures::channel::mpsc::Sender;
use log::{debug, info, warn};
use serialport::{SerialPort, SerialPortType};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;

use crate::config::types::SerialConfig;
use crate::device::constants::{MAX_LINE_LENGTH, READ_DELIMITER, SERIAL_READ_TIMEOUT};
use crate::device::transport::Transport;
use crate::device::types::{DiscoveredDevice, TransportEvent, TransportKind};
use crate::error::DeviceError;

/// Accumulates bytes from the read stream and cuts them into lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every line that is now complete, without the delimiter.
    ///
    /// A line that grows past [`MAX_LINE_LENGTH`] without a delimiter is returned as is.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        // the buffered bytes hold no delimiter, except for one that the new bytes complete
        let mut search_from = self.buffer.len().saturating_sub(READ_DELIMITER.len() - 1);
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(offset) = self.buffer[search_from..]
            .windows(READ_DELIMITER.len())
            .position(|window| window == READ_DELIMITER)
        {
            let position = search_from + offset;
            let line: Vec<u8> = self.buffer.drain(..position + READ_DELIMITER.len()).collect();
            lines.push(String::from_utf8_lossy(&line[..position]).into_owned());
            search_from = 0;
        }

        if self.buffer.len() >= MAX_LINE_LENGTH {
            // keep a partial delimiter at the end, the next bytes may complete it
            let partial = (1..READ_DELIMITER.len()).rev()
                .find(|&len| self.buffer.ends_with(&READ_DELIMITER[..len]))
                .unwrap_or(0);
            let end = self.buffer.len() - partial;
            let line: Vec<u8> = self.buffer.drain(..end).collect();
            warn!("No line delimiter in {} bytes, passing them on as one line", line.len());
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        lines
    }
}

struct SerialConnection {
    id: String,
    port: Box<dyn SerialPort>,
    reader_cancel: CancellationToken,
    lost: Arc<AtomicBool>,
}

pub struct SerialTransport {
    config: SerialConfig,
    connection: Arc<Mutex<Option<SerialConnection>>>,
    event_sender: UnboundedSender<TransportEvent>,
    // taken by the first call to monitor()
    event_receiver: Mutex<Option<UnboundedReceiver<TransportEvent>>>,
}

fn port_to_device(port: serialport::SerialPortInfo, bluetooth_only: bool) -> Option<DiscoveredDevice> {
    let name = match port.port_type {
        SerialPortType::BluetoothPort => None,
        SerialPortType::UsbPort(info) if !bluetooth_only => info.product,
        _ if !bluetooth_only => None,
        _ => return None,
    };

    Some(DiscoveredDevice { id: port.port_name, name })
}

// Runs on a blocking thread until cancelled or the port fails.
fn read_lines(
    mut port: Box<dyn SerialPort>,
    cancel: CancellationToken,
    lost: Arc<AtomicBool>,
    sender: UnboundedSender<TransportEvent>,
) {
    let mut lines = LineBuffer::new();
    let mut chunk = [0u8; 256];

    while !cancel.is_cancelled() {
        match port.read(&mut chunk) {
            Ok(0) => continue,
            Ok(count) => {
                for line in lines.push(&chunk[..count]) {
                    debug!("Received line {:?}", line);
                    let _ = sender.send(TransportEvent::Received(line));
                }
            },
            Err(err) if err.kind() == io::ErrorKind::TimedOut || err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                if !cancel.is_cancelled() {
                    warn!("Reading from serial port failed: {:?}", err);
                    lost.store(true, Ordering::SeqCst);
                    let _ = sender.send(TransportEvent::ConnectionLost);
                }
                break;
            },
        }
    }
}

impl SerialTransport {
    pub fn new(config: SerialConfig) -> Self {
        let (event_sender, event_receiver) = unbounded_channel();

        SerialTransport {
            config,
            connection: Arc::new(Mutex::new(None)),
            event_sender,
            event_receiver: Mutex::new(Some(event_receiver)),
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    async fn enable(&self) -> Result<(), DeviceError> {
        // the OS owns the serial ports; if we may list them we may use them
        spawn_blocking(serialport::available_ports).await
            .expect("Failed to join available_ports task")?;
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<DiscoveredDevice>, DeviceError> {
        let ports = spawn_blocking(serialport::available_ports).await
            .expect("Failed to join available_ports task")?;

        let bluetooth_only = self.config.bluetooth_ports_only;
        let devices: Vec<DiscoveredDevice> = ports.into_iter()
            .filter_map(|port| port_to_device(port, bluetooth_only))
            .collect();

        info!("Scan found {} serial ports", devices.len());
        Ok(devices)
    }

    async fn connect(&self, id: &str) -> Result<(), DeviceError> {
        info!("Opening serial port {}...", id);
        let builder = serialport::new(id, self.config.baud_rate).timeout(SERIAL_READ_TIMEOUT);
        let port = spawn_blocking(move || builder.open()).await
            .expect("Failed to join serial open task")?;
        let reader = port.try_clone()?;

        let reader_cancel = CancellationToken::new();
        let lost = Arc::new(AtomicBool::new(false));
        {
            let cancel = reader_cancel.clone();
            let lost = lost.clone();
            let sender = self.event_sender.clone();
            spawn_blocking(move || read_lines(reader, cancel, lost, sender));
        }

        let previous = self.connection.lock().expect("Failed to lock serial connection")
            .replace(SerialConnection { id: id.to_string(), port, reader_cancel, lost });
        if let Some(previous) = previous {
            warn!("Replacing open serial port {}", previous.id);
            previous.reader_cancel.cancel();
        }

        info!("Serial port {} open", id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        let connection = self.connection.lock().expect("Failed to lock serial connection").take();

        if let Some(connection) = connection {
            info!("Closing serial port {}", connection.id);
            connection.reader_cancel.cancel();
            // the port closes when the last handle is dropped; the reader drops its handle
            // after its current read times out
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let connection = self.connection.lock().expect("Failed to lock serial connection");
        match connection.as_ref() {
            None => false,
            Some(connection) => !connection.lost.load(Ordering::SeqCst),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        let connection = self.connection.clone();
        let bytes = bytes.to_vec();

        spawn_blocking(move || -> Result<(), DeviceError> {
            let mut connection = connection.lock().expect("Failed to lock serial connection");
            let connection = connection.as_mut().ok_or(DeviceError::NotConnected)?;
            connection.port.write_all(&bytes)?;
            connection.port.flush()?;
            Ok(())
        }).await.expect("Failed to join serial write task")
    }

    async fn monitor(&self, cancel: CancellationToken, mut sender: Sender<TransportEvent>) -> Result<(), DeviceError> {
        let receiver = self.event_receiver.lock().expect("Failed to lock serial event receiver").take();
        let Some(mut receiver) = receiver else {
            warn!("Serial transport is already being monitored");
            return Ok(());
        };

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(event) = receiver.recv() => {
                    if sender.send(event).await.is_err() {
                        break 'mainloop;
                    }
                },
            }
        }

        // allow a later monitor to pick up where this one stopped
        *self.event_receiver.lock().expect("Failed to lock serial event receiver") = Some(receiver);
        Ok(())
    }
}
