use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

/// Flags written by the line handler and awaited by the startup sequence.
///
/// Each flag is a watch channel so a waiting handshake is woken as soon as the
/// handler changes it, instead of sampling it after a fixed sleep.
pub struct LinkState {
    reset_confirmed: watch::Sender<bool>,
    monitor_enabled: watch::Sender<bool>,
    mains_power: watch::Sender<Option<bool>>,
}

impl LinkState {
    pub fn new() -> Self {
        Self {
            reset_confirmed: watch::Sender::new(false),
            monitor_enabled: watch::Sender::new(false),
            mains_power: watch::Sender::new(None),
        }
    }

    pub fn clear_reset(&self) {
        self.reset_confirmed.send_if_modified(|confirmed| std::mem::replace(confirmed, false));
    }

    pub fn confirm_reset(&self) {
        self.reset_confirmed.send_replace(true);
    }

    pub fn is_reset_confirmed(&self) -> bool {
        *self.reset_confirmed.borrow()
    }

    pub fn enable_monitor(&self) {
        self.monitor_enabled.send_replace(true);
    }

    pub fn is_monitor_enabled(&self) -> bool {
        *self.monitor_enabled.borrow()
    }

    pub fn set_mains_power(&self, present: bool) {
        self.mains_power.send_replace(Some(present));
    }

    pub fn clear_mains_power(&self) {
        self.mains_power.send_replace(None);
    }

    /// Last known mains state, `None` until the device reported one
    pub fn mains_power(&self) -> Option<bool> {
        *self.mains_power.borrow()
    }

    /// Wait up to `budget` for the reset to be confirmed
    pub async fn wait_reset_confirmed(&self, budget: Duration) -> bool {
        wait_until(self.reset_confirmed.subscribe(), budget, |confirmed| *confirmed).await
    }

    /// Wait up to `budget` for the monitor acknowledgement
    pub async fn wait_monitor_enabled(&self, budget: Duration) -> bool {
        wait_until(self.monitor_enabled.subscribe(), budget, |enabled| *enabled).await
    }

    /// Wait up to `budget` for a mains power report
    pub async fn wait_mains_power(&self, budget: Duration) -> Option<bool> {
        let reported = wait_until(self.mains_power.subscribe(), budget, |power| power.is_some()).await;
        if reported {
            self.mains_power()
        } else {
            None
        }
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_until<T>(
    mut rx: watch::Receiver<T>,
    budget: Duration,
    mut ready: impl FnMut(&T) -> bool,
) -> bool {
    let outcome = timeout(budget, rx.wait_for(|value| ready(value)))
        .await
        .map(|waited| waited.is_ok());

    match outcome {
        Ok(satisfied) => satisfied,
        Err(_) => ready(&*rx.borrow()),
    }
}
