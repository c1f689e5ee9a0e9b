use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{HostPower, PowerError};

/// systemd-logind backed host: idle hints from `loginctl`, suspend via `systemctl`
pub struct LogindHost {
    session: String,
    warned: AtomicBool,
}

impl LogindHost {
    pub fn new(session: String) -> Self {
        Self {
            session,
            warned: AtomicBool::new(false),
        }
    }

    /// Warn the first time idle time is missing, debug afterwards
    fn report_unavailable(&self, reason: &str) {
        if self.warned.swap(true, Ordering::Relaxed) {
            log::debug!("Idle time unavailable: {}", reason);
        } else {
            log::warn!(
                "Idle time unavailable for logind session `{}` ({}); suspend will not wait for user activity. Set `login_session` to the user's session id.",
                self.session,
                reason
            );
        }
    }

    fn query_idle_properties(&self) -> Result<String, PowerError> {
        let output = Command::new("loginctl")
            .args([
                "show-session",
                self.session.as_str(),
                "--property=IdleHint",
                "--property=IdleSinceHint",
            ])
            .output()?;

        if !output.status.success() {
            return Err(PowerError::CommandFailed {
                command: "loginctl show-session".to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl HostPower for LogindHost {
    fn idle_duration(&self) -> Option<Duration> {
        let idle = match self.query_idle_properties() {
            Ok(properties) => parse_idle_properties(&properties, chrono::Utc::now().timestamp_micros()),
            Err(e) => {
                self.report_unavailable(&e.to_string());
                return None;
            }
        };
        if idle.is_none() {
            self.report_unavailable("no usable IdleHint");
        }
        idle
    }

    fn request_suspend(&self) -> Result<(), PowerError> {
        let output = Command::new("systemctl").arg("suspend").output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(PowerError::CommandFailed {
                command: "systemctl suspend".to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Idle duration from `loginctl` property output.
///
/// `IdleHint=no` means the session is active (zero idle). With
/// `IdleHint=yes` the idle time runs from `IdleSinceHint`, a realtime
/// timestamp in microseconds. Anything else is unknown.
pub(crate) fn parse_idle_properties(output: &str, now_micros: i64) -> Option<Duration> {
    let mut idle_hint = None;
    let mut idle_since = None;

    for line in output.lines() {
        match line.trim().split_once('=') {
            Some(("IdleHint", value)) => idle_hint = Some(value == "yes"),
            Some(("IdleSinceHint", value)) => idle_since = value.parse::<i64>().ok(),
            _ => {}
        }
    }

    match idle_hint? {
        false => Some(Duration::ZERO),
        true => {
            let since = idle_since.filter(|since| *since > 0)?;
            let elapsed = u64::try_from(now_micros.checked_sub(since)?).ok()?;
            Some(Duration::from_micros(elapsed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000_000;

    #[test]
    fn test_unknown_session_reports_unknown_idle() {
        let host = LogindHost::new("no-such-session-4242".to_string());
        assert!(!host.warned.load(Ordering::Relaxed));
        assert_eq!(host.idle_duration(), None);
        assert!(host.warned.load(Ordering::Relaxed));
        assert_eq!(host.idle_duration(), None);
    }

    #[test]
    fn test_active_session_has_no_idle_time() {
        let output = "IdleHint=no\nIdleSinceHint=0\n";
        assert_eq!(parse_idle_properties(output, NOW), Some(Duration::ZERO));
    }

    #[test]
    fn test_idle_session_measures_from_hint() {
        let output = format!("IdleHint=yes\nIdleSinceHint={}\n", NOW - 15_000_000);
        assert_eq!(parse_idle_properties(&output, NOW), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_missing_or_bogus_properties_are_unknown() {
        assert_eq!(parse_idle_properties("", NOW), None);
        assert_eq!(parse_idle_properties("IdleHint=yes\nIdleSinceHint=0\n", NOW), None);
        // hint in the future
        let output = format!("IdleHint=yes\nIdleSinceHint={}\n", NOW + 1);
        assert_eq!(parse_idle_properties(&output, NOW), None);
    }
}
