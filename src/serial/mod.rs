pub mod dispatch;
pub mod interface;
pub mod protocol;

pub use interface::SerialInterface;
pub use protocol::{DeviceEvent, DeviceResponse, ProtocolMessage};

use serde::{Deserialize, Serialize};

/// Line terminator used in both directions
pub const NEWLINE: &[u8] = b"\r\n";
/// Single-byte signal that makes the device reload its program
pub const SIGNAL_RELOAD: &[u8] = &[0x04];
/// Single-byte signal that interrupts whatever the device is running
pub const SIGNAL_BREAK: &[u8] = &[0x03];
/// Asks the device to start reporting mains power changes
pub const REQUEST_POWER_MONITOR: &[u8] = b"request,POWER_MONITOR\r\n";
/// Asks the device for the current mains power state
pub const REQUEST_POWER_STATE: &[u8] = b"request,POWER_STATE\r\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialDeviceInfo {
    pub port_name: String,
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
