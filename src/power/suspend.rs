//! Debounced suspend on mains power loss
//!
//! Power loss arms a one-shot check. When the check fires it asks the host
//! how long the user has been idle: unknown or above the threshold suspends
//! the host, otherwise the check is pushed back. Power restore and host
//! resume disarm it.
//!
//! Arm, disarm and the check itself all run under the same mutex. A check
//! carries the generation it was scheduled with and does nothing unless that
//! generation is still the armed one, so a check that was already in flight
//! when the timer got disarmed or re-armed is a no-op.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::HostPower;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendPolicy {
    /// Delay between power loss and the first check
    pub initial_delay: Duration,
    /// Delay before checking again when a user is present
    pub recheck_delay: Duration,
    /// Idle time above which the user is considered away
    pub idle_threshold: Duration,
}

impl Default for SuspendPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(5000),
            recheck_delay: Duration::from_millis(10000),
            idle_threshold: Duration::from_secs(10),
        }
    }
}

/// Externally visible timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendState {
    Idle,
    Armed { deadline: Instant },
}

enum TimerState {
    Idle,
    Armed {
        deadline: Instant,
        generation: u64,
        task: JoinHandle<()>,
    },
}

struct Inner {
    timer: TimerState,
    generation: u64,
    disposed: bool,
}

pub struct SuspendController {
    inner: Mutex<Inner>,
    host: Arc<dyn HostPower>,
    policy: SuspendPolicy,
}

impl SuspendController {
    pub fn new(host: Arc<dyn HostPower>, policy: SuspendPolicy) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                timer: TimerState::Idle,
                generation: 0,
                disposed: false,
            }),
            host,
            policy,
        })
    }

    /// Schedule a check after the initial delay, replacing any pending one
    pub fn arm(self: &Arc<Self>) {
        let mut inner = self.lock();
        if inner.disposed {
            log::debug!("Suspend timer disposed, ignoring arm");
            return;
        }
        self.schedule(&mut inner, self.policy.initial_delay);
    }

    /// Cancel any pending check
    pub fn disarm(&self) {
        cancel_timer(&mut self.lock());
    }

    /// Disarm for good; later arms are ignored
    pub fn dispose(&self) {
        let mut inner = self.lock();
        cancel_timer(&mut inner);
        inner.disposed = true;
    }

    pub fn state(&self) -> SuspendState {
        match self.lock().timer {
            TimerState::Idle => SuspendState::Idle,
            TimerState::Armed { deadline, .. } => SuspendState::Armed { deadline },
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(self: &Arc<Self>, inner: &mut Inner, delay: Duration) {
        inner.generation += 1;
        let generation = inner.generation;
        let deadline = Instant::now() + delay;

        let controller: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(controller) = controller.upgrade() else {
                return;
            };
            // The host queries shell out and block
            if let Err(e) = tokio::task::spawn_blocking(move || controller.check(generation)).await {
                log::error!("Suspend check failed: {}", e);
            }
        });

        let previous = std::mem::replace(
            &mut inner.timer,
            TimerState::Armed {
                deadline,
                generation,
                task,
            },
        );
        if let TimerState::Armed { task, .. } = previous {
            task.abort();
        }
        log::debug!("Suspend check scheduled in {:?}", delay);
    }

    fn check(self: &Arc<Self>, generation: u64) {
        let mut inner = self.lock();

        let current = matches!(
            inner.timer,
            TimerState::Armed { generation: armed, .. } if armed == generation
        );
        if !current || inner.disposed {
            log::debug!("Stale suspend check ignored");
            return;
        }
        // The handle belongs to the task running this check; dropping it detaches.
        inner.timer = TimerState::Idle;

        let idle = self.host.idle_duration();
        log::debug!("Host idle duration: {:?}", idle);

        let user_away = match idle {
            Some(idle) => idle > self.policy.idle_threshold,
            None => true,
        };

        if user_away {
            log::warn!("Suspending system.");
            if let Err(e) = self.host.request_suspend() {
                log::error!("Suspend request failed: {}", e);
            }
        } else {
            log::info!("User is present, delaying suspend.");
            self.schedule(&mut inner, self.policy.recheck_delay);
        }
    }
}

fn cancel_timer(inner: &mut Inner) {
    if let TimerState::Armed { task, .. } = std::mem::replace(&mut inner.timer, TimerState::Idle) {
        task.abort();
        log::debug!("Suspend timer disarmed");
    }
}

impl Drop for SuspendController {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let TimerState::Armed { task, .. } = &inner.timer {
            task.abort();
        }
    }
}
