use crate::error::RemoteError;

/// What the host allows us to do. Scanning and connecting require every field to be true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityState {
    /// The OS lets this process use bluetooth
    pub permitted: bool,
    pub bluetooth_enabled: bool,
}

impl CapabilityState {
    pub fn can_operate(&self) -> bool {
        self.permitted && self.bluetooth_enabled
    }

    /// Applies the outcome of enabling the transport at startup.
    pub fn apply_enable_result(&mut self, result: &Result<(), RemoteError>) {
        match result {
            Ok(()) => {
                self.permitted = true;
                self.bluetooth_enabled = true;
            },
            Err(RemoteError::PermissionDenied) => {
                self.permitted = false;
            },
            Err(_) => {
                // we got far enough to talk to the bluetooth stack
                self.permitted = true;
                self.bluetooth_enabled = false;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initially_closed() {
        assert!(!CapabilityState::default().can_operate());
    }

    #[test]
    fn test_enable_result() {
        let mut state = CapabilityState::default();
        state.apply_enable_result(&Ok(()));
        assert!(state.can_operate());

        state.apply_enable_result(&Err(RemoteError::PermissionDenied));
        assert!(!state.permitted);
        assert!(!state.can_operate());

        let mut state = CapabilityState::default();
        state.apply_enable_result(&Err(RemoteError::CapabilityUnavailable { message: "No bluetooth adapter found".to_string() }));
        assert!(state.permitted);
        assert!(!state.bluetooth_enabled);
        assert!(!state.can_operate());
    }

    #[test]
    fn test_every_field_is_required() {
        for (permitted, bluetooth_enabled) in [(false, false), (false, true), (true, false)] {
            assert!(!CapabilityState { permitted, bluetooth_enabled }.can_operate());
        }
        assert!(CapabilityState { permitted: true, bluetooth_enabled: true }.can_operate());
    }
}
