//! Startup handshake with the power indicator
//!
//! The device only acknowledges through the same line stream the dispatch
//! consumer drains, so the controller writes probes and then waits on
//! [`LinkState`] for the handler to flip the matching flag. Each wait is
//! bounded by its settle budget and returns as soon as the flag is set.
//!
//! Reset sequence: newline + reload, then break + reload if the first probe
//! went unanswered. After that the power monitor is switched on.

use std::time::Duration;
use tokio::io::AsyncWrite;

use super::{DeviceError, LinkState, Result};
use crate::serial::interface::send_data;
use crate::serial::{NEWLINE, REQUEST_POWER_MONITOR, REQUEST_POWER_STATE, SIGNAL_BREAK, SIGNAL_RELOAD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeTiming {
    /// Budget for START after the first reload
    pub reset_settle: Duration,
    /// Budget for START after break + reload
    pub escalation_settle: Duration,
    /// Budget for the monitor acknowledgement
    pub monitor_settle: Duration,
    /// Budget for the power state answer
    pub power_state_settle: Duration,
}

impl Default for HandshakeTiming {
    fn default() -> Self {
        Self {
            reset_settle: Duration::from_millis(500),
            escalation_settle: Duration::from_millis(1000),
            monitor_settle: Duration::from_millis(500),
            power_state_settle: Duration::from_millis(500),
        }
    }
}

pub struct HandshakeController<'a, W: ?Sized> {
    writer: &'a mut W,
    state: &'a LinkState,
    timing: HandshakeTiming,
}

impl<'a, W> HandshakeController<'a, W>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    pub fn new(writer: &'a mut W, state: &'a LinkState, timing: HandshakeTiming) -> Self {
        Self { writer, state, timing }
    }

    /// Reload the device and wait for it to announce START
    pub async fn reset(&mut self) -> Result<()> {
        self.state.clear_reset();
        send_data(&mut *self.writer, NEWLINE).await?;
        send_data(&mut *self.writer, SIGNAL_RELOAD).await?;

        if self.state.wait_reset_confirmed(self.timing.reset_settle).await {
            log::info!("Device reset confirmed");
            return Ok(());
        }

        log::info!("No START after reload, sending break");
        self.state.clear_reset();
        send_data(&mut *self.writer, SIGNAL_BREAK).await?;
        send_data(&mut *self.writer, SIGNAL_RELOAD).await?;

        if self.state.wait_reset_confirmed(self.timing.escalation_settle).await {
            log::info!("Device reset confirmed after break");
            return Ok(());
        }

        Err(DeviceError::Unresponsive)
    }

    /// Ask for the current mains state; `None` if the device did not say
    pub async fn query_power_state(&mut self) -> Result<Option<bool>> {
        self.state.clear_mains_power();
        send_data(&mut *self.writer, REQUEST_POWER_STATE).await?;
        Ok(self.state.wait_mains_power(self.timing.power_state_settle).await)
    }

    /// Switch the device into power monitoring mode
    pub async fn enable_monitor(&mut self) -> Result<()> {
        send_data(&mut *self.writer, REQUEST_POWER_MONITOR).await?;

        if self.state.wait_monitor_enabled(self.timing.monitor_settle).await {
            log::info!("Power monitoring enabled");
            Ok(())
        } else {
            Err(DeviceError::MonitorEnableFailed)
        }
    }

    /// Full startup sequence: reset, optional power state query, monitor
    pub async fn run(&mut self, query_power_state: bool) -> Result<()> {
        self.reset().await?;

        if query_power_state {
            match self.query_power_state().await? {
                Some(true) => log::info!("Mains power present"),
                Some(false) => log::warn!("Mains power absent at startup"),
                None => log::debug!("Device did not report its power state"),
            }
        }

        self.enable_monitor().await
    }
}
