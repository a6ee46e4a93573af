use iced::{Event, window};

use crate::config::types::Config;
use crate::device::types::TransportEvent;
use crate::error::RemoteError;
use crate::remote::{ConnectOutcome, ScanOutcome};
use crate::remote::discovery::Device;

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    CloseReady(window::Id),
    ConfigLoadComplete((Config, Option<String>)), // error message if loading failed
    EnableComplete(Result<(), RemoteError>),
    ScanPress,
    ScanComplete(ScanOutcome),
    ConnectPress(Device),
    ConnectComplete(ConnectOutcome),
    DisconnectPress,
    DisconnectComplete(Result<(), RemoteError>),
    ReleaseComplete(()),
    DeviceMessageChange(String),
    SendPress,
    SendComplete(Result<(), RemoteError>),
    TransportEvent(TransportEvent),
    NoticeConfirmed,
}
