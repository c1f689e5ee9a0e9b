use std::time::Duration;

use super::{HostPower, PowerError};

/// Host back-end for platforms without suspend support
pub struct UnsupportedHost;

impl UnsupportedHost {
    pub fn new() -> Self {
        log::warn!("Host suspend not supported on this platform");
        Self
    }
}

impl HostPower for UnsupportedHost {
    fn idle_duration(&self) -> Option<Duration> {
        None
    }

    fn request_suspend(&self) -> Result<(), PowerError> {
        Err(PowerError::Unsupported)
    }
}
