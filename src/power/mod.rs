//! Host power collaborators and the suspend decision state machine

pub mod resume;
pub mod suspend;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LogindHost;

#[cfg(not(target_os = "linux"))]
mod fallback;
#[cfg(not(target_os = "linux"))]
pub use fallback::UnsupportedHost;

pub use resume::ClockJumpMonitor;
pub use suspend::{SuspendController, SuspendPolicy, SuspendState};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::{DaemonConfig, IdleSource};

/// Host power mode transitions we can be told about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerModeEvent {
    /// The host woke up from sleep
    Resume,
}

#[derive(Debug, thiserror::Error)]
pub enum PowerError {
    #[error("Command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Suspend is not supported on this platform")]
    Unsupported,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// The two host primitives the suspend logic needs
pub trait HostPower: Send + Sync {
    /// Time since the last user input, `None` when it cannot be measured
    fn idle_duration(&self) -> Option<Duration>;

    /// Put the host to sleep
    fn request_suspend(&self) -> Result<(), PowerError>;
}

/// Source of host power mode notifications
#[async_trait::async_trait]
pub trait PowerModeMonitor: Send + Sync {
    /// Start watching for power mode changes
    async fn start(&mut self) -> Result<(), PowerError>;

    /// Stop watching; no events are delivered afterwards
    async fn stop(&mut self) -> Result<(), PowerError>;

    /// Take the receiver for power mode events
    fn get_receiver(&mut self) -> Option<mpsc::Receiver<PowerModeEvent>>;
}

/// Wraps a host and logs instead of suspending
pub struct DryRunHost {
    inner: Arc<dyn HostPower>,
}

impl DryRunHost {
    pub fn new(inner: Arc<dyn HostPower>) -> Self {
        Self { inner }
    }
}

impl HostPower for DryRunHost {
    fn idle_duration(&self) -> Option<Duration> {
        self.inner.idle_duration()
    }

    fn request_suspend(&self) -> Result<(), PowerError> {
        log::warn!("Dry run: host suspend skipped");
        Ok(())
    }
}

/// Host that never knows the idle time, so every check suspends
struct UnknownIdle {
    inner: Arc<dyn HostPower>,
}

impl HostPower for UnknownIdle {
    fn idle_duration(&self) -> Option<Duration> {
        None
    }

    fn request_suspend(&self) -> Result<(), PowerError> {
        self.inner.request_suspend()
    }
}

/// Build the platform host back-end described by `config`
pub fn create_host_power(config: &DaemonConfig) -> Arc<dyn HostPower> {
    #[cfg(target_os = "linux")]
    let mut host: Arc<dyn HostPower> = Arc::new(LogindHost::new(config.login_session.clone()));

    #[cfg(not(target_os = "linux"))]
    let mut host: Arc<dyn HostPower> = Arc::new(UnsupportedHost::new());

    if config.idle_source == IdleSource::None {
        host = Arc::new(UnknownIdle { inner: host });
    }
    if config.dry_run {
        host = Arc::new(DryRunHost::new(host));
    }
    host
}

/// Build the resume watcher described by `config`
pub fn create_power_mode_monitor(config: &DaemonConfig) -> Box<dyn PowerModeMonitor> {
    Box::new(ClockJumpMonitor::new(
        Duration::from_secs(config.resume_poll_secs),
        Duration::from_secs(config.resume_jump_tolerance_secs),
    ))
}
