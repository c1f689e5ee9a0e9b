pub mod handler;
pub mod handshake;
pub mod manager;
pub mod state;

pub use handler::LineHandler;
pub use handshake::{HandshakeController, HandshakeTiming};
pub use manager::LinkService;
pub use state::LinkState;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Power indicator not found")]
    NotFound,

    #[error("Could not open {port}: {reason}")]
    Unavailable { port: String, reason: String },

    #[error("Device not responding")]
    Unresponsive,

    #[error("Could not start power monitoring")]
    MonitorEnableFailed,

    #[error("Serial communication error: {0}")]
    SerialError(#[from] crate::serial::SerialError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
