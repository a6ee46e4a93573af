use crate::remote::discovery::Device;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting(Device),
    Connected(Device),
    Disconnecting(Device),
}

impl ConnectionState {
    pub fn connected_device(&self) -> Option<&Device> {
        match self {
            ConnectionState::Connected(device) => Some(device),
            _ => None,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }
}

/// Operations in flight. User actions are refused while any of these is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusyFlags {
    pub scanning: bool,
    pub connecting: bool,
    pub disconnecting: bool,
    pub sending: bool,
}

impl BusyFlags {
    pub fn any(&self) -> bool {
        self.scanning || self.connecting || self.disconnecting || self.sending
    }
}
