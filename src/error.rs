use std::io;
use thiserror::Error;
use msgbox::IconType;
use std::fmt::{Debug, Display};
use std::str::Utf8Error;
use btleplug;
use iced;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Invalid UUID {value:?} in config file: {source}")]
    InvalidUuid { value: String, source: uuid::Error },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (iced): {source}")]
    Iced { #[from] source: iced::Error },

    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start async runtime: {source}")]
    Runtime { source: io::Error },

    #[error("{message}")]
    Alert { message: String },

    #[error("Unknown device {id:?}; run the scan command to list devices")]
    UnknownDevice { id: String },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("Error communicating with device (serial port): {source}")]
    Serial { #[from] source: serialport::Error },

    #[error("Error communicating with device (io): {source}")]
    IOError { #[from] source: io::Error },

    #[error("No bluetooth adapter found")]
    NoAdapter,

    #[error("Bluetooth is turned off")]
    PoweredOff,

    #[error("Device {id} was not found by the last scan")]
    UnknownDevice { id: String },

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("Device is not connected")]
    NotConnected,

    #[error("Device did not respond in time")]
    Timeout,
}

impl DeviceError {
    pub fn is_permission_denied(&self) -> bool {
        match self {
            DeviceError::Btle { source: btleplug::Error::PermissionDenied } => true,
            DeviceError::Serial { source } => matches!(
                source.kind(),
                serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied),
            ),
            DeviceError::IOError { source } => source.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

/// Errors as they are presented to the user. Unlike [`DeviceError`] these can be cloned into GUI
/// messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Permission to use bluetooth was denied")]
    PermissionDenied,

    #[error("Bluetooth is not available: {message}")]
    CapabilityUnavailable { message: String },

    #[error("{message}")]
    Transport { message: String },

    #[error("Device is not connected!")]
    NotConnected,

    #[error("The connected device has no writable characteristic")]
    NotWritable,
}

impl From<DeviceError> for RemoteError {
    fn from(err: DeviceError) -> Self {
        if err.is_permission_denied() {
            return RemoteError::PermissionDenied;
        }

        match err {
            DeviceError::NoAdapter | DeviceError::PoweredOff => RemoteError::CapabilityUnavailable { message: err.to_string() },
            DeviceError::NotConnected => RemoteError::NotConnected,
            DeviceError::MissingCharacteristic => RemoteError::NotWritable,
            err => RemoteError::Transport { message: err.to_string() },
        }
    }
}

pub fn error_msgbox<T: Display>(message: &'static str, error: &T) {
    let message = format!("{}: {}", message, error);
    eprintln!("{}", &message);
    if let Err(err) = msgbox::create(concat!("Robot Remote ", env!("CARGO_PKG_VERSION")), &message, IconType::Error) {
        eprintln!("Failed to create msgbox: {:?}", err);
    }
}
