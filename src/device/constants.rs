use std::time::Duration;

/**
 * How often (milliseconds) the monitor checks the adapters and the connection status.
 */
pub const POLL_DELAY: u64 = 1000;

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * Default duration (milliseconds) of a BLE scan window.
 */
pub const DEFAULT_SCAN_DURATION: u64 = 5000;

/**
 * Default baud rate of the serial port that the OS creates for a paired device.
 * Bluetooth serial modules on robots (HC-05, HC-06) default to this value.
 */
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/**
 * Serial reads time out after this long so that the reader can notice a disconnect.
 */
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);

/**
 * Appended to every outbound message.
 */
pub const FRAME_TERMINATOR: &str = "\r";

/**
 * Separates inbound lines on the serial read stream.
 */
pub const READ_DELIMITER: &[u8] = b"\r\n";

/**
 * Inbound bytes without a delimiter are passed on as a line once this many (bytes) are buffered.
 */
pub const MAX_LINE_LENGTH: usize = 4096;
