use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{PowerError, PowerModeEvent, PowerModeMonitor};

/// Detects host resume by comparing wall-clock progress against the
/// monotonic clock, which does not advance while the host is asleep.
pub struct ClockJumpMonitor {
    poll: Duration,
    tolerance: Duration,
    tx: Option<mpsc::Sender<PowerModeEvent>>,
    rx: Option<mpsc::Receiver<PowerModeEvent>>,
    stop_tx: Option<mpsc::Sender<()>>,
    task_handle: Option<JoinHandle<()>>,
}

impl ClockJumpMonitor {
    pub fn new(poll: Duration, tolerance: Duration) -> Self {
        let (tx, rx) = mpsc::channel(16);

        Self {
            poll,
            tolerance,
            tx: Some(tx),
            rx: Some(rx),
            stop_tx: None,
            task_handle: None,
        }
    }
}

/// Time the host spent asleep between two samples, if beyond `tolerance`
pub fn suspended_gap(
    monotonic_elapsed: Duration,
    wall_elapsed: Duration,
    tolerance: Duration,
) -> Option<Duration> {
    let gap = wall_elapsed.checked_sub(monotonic_elapsed)?;
    (gap > tolerance).then_some(gap)
}

#[async_trait::async_trait]
impl PowerModeMonitor for ClockJumpMonitor {
    async fn start(&mut self) -> Result<(), PowerError> {
        let Some(tx) = self.tx.take() else {
            log::warn!("Resume monitor already started");
            return Ok(());
        };
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        self.stop_tx = Some(stop_tx);

        let poll = self.poll;
        let tolerance = self.tolerance;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            let mut last_mono = Instant::now();
            let mut last_wall = SystemTime::now();

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        log::debug!("Resume monitor stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        let mono = Instant::now();
                        let wall = SystemTime::now();
                        let wall_elapsed = wall.duration_since(last_wall).unwrap_or_default();

                        if let Some(gap) = suspended_gap(mono - last_mono, wall_elapsed, tolerance) {
                            log::info!("Host resumed after about {}s asleep", gap.as_secs());
                            if tx.send(PowerModeEvent::Resume).await.is_err() {
                                break;
                            }
                        }

                        last_mono = mono;
                        last_wall = wall;
                    }
                }
            }
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PowerError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(()).await;
        }

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                log::warn!("Resume monitor task ended abnormally: {}", e);
            }
        }

        Ok(())
    }

    fn get_receiver(&mut self) -> Option<mpsc::Receiver<PowerModeEvent>> {
        self.rx.take()
    }
}
