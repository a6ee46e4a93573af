pub mod ble;
pub mod constants;
pub mod events;
pub mod serial;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod fake;
