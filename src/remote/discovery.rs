use indexmap::IndexMap;

use crate::device::types::DiscoveredDevice;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Device {
    pub id: String,
    /// Never blank, falls back to the id
    pub name: String,
}

impl Device {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        let id = id.into();
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => id.clone(),
        };

        Device { id, name }
    }
}

impl From<DiscoveredDevice> for Device {
    fn from(device: DiscoveredDevice) -> Self {
        Device::new(device.id, device.name.as_deref())
    }
}

/// Devices found by the last successful scan, unique by id, in the order the transport reported
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceList {
    devices: IndexMap<String, Device>,
}

impl DeviceList {
    /// Builds a list from raw scan results. The first occurrence of an id wins.
    pub fn from_scan(results: impl IntoIterator<Item = DiscoveredDevice>) -> Self {
        let mut devices = IndexMap::new();
        for device in results.into_iter().map(Device::from) {
            devices.entry(device.id.clone()).or_insert(device);
        }
        DeviceList { devices }
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
