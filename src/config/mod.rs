//! Daemon configuration file
//!
//! JSON, every field optional. Missing fields take the defaults below, which
//! match the power indicator firmware.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::device::HandshakeTiming;
use crate::power::SuspendPolicy;
use crate::serial::dispatch::assembler::DEFAULT_MAX_PENDING;
use crate::serial::interface::{BAUD_RATE, POWER_INDICATOR_PID, POWER_INDICATOR_VID};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the host idle time comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleSource {
    /// systemd-logind idle hints
    Logind,
    /// Never measured; every check suspends
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub reset_settle_ms: u64,
    pub escalation_settle_ms: u64,
    pub monitor_settle_ms: u64,
    pub power_state_settle_ms: u64,
    pub initial_suspend_delay_ms: u64,
    pub recheck_delay_ms: u64,
    pub idle_threshold_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reset_settle_ms: 500,
            escalation_settle_ms: 1000,
            monitor_settle_ms: 500,
            power_state_settle_ms: 500,
            initial_suspend_delay_ms: 5000,
            recheck_delay_ms: 10000,
            idle_threshold_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Explicit port, skips USB discovery
    pub port: Option<String>,
    pub usb_vid: u16,
    pub usb_pid: u16,
    pub baud_rate: u32,
    pub timing: TimingConfig,
    /// Ask the device for the mains state before enabling monitoring
    pub query_power_state: bool,
    pub idle_source: IdleSource,
    /// logind session used for idle hints
    pub login_session: String,
    pub resume_poll_secs: u64,
    pub resume_jump_tolerance_secs: u64,
    pub max_pending_bytes: usize,
    /// Log suspend requests instead of acting on them
    pub dry_run: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: None,
            usb_vid: POWER_INDICATOR_VID,
            usb_pid: POWER_INDICATOR_PID,
            baud_rate: BAUD_RATE,
            timing: TimingConfig::default(),
            query_power_state: true,
            idle_source: IdleSource::Logind,
            login_session: "auto".to_string(),
            resume_poll_secs: 2,
            resume_jump_tolerance_secs: 5,
            max_pending_bytes: DEFAULT_MAX_PENDING,
            dry_run: false,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be non-zero".to_string()));
        }

        let t = &self.timing;
        let budgets = [
            ("reset_settle_ms", t.reset_settle_ms),
            ("escalation_settle_ms", t.escalation_settle_ms),
            ("monitor_settle_ms", t.monitor_settle_ms),
            ("power_state_settle_ms", t.power_state_settle_ms),
            ("initial_suspend_delay_ms", t.initial_suspend_delay_ms),
            ("recheck_delay_ms", t.recheck_delay_ms),
            ("resume_poll_secs", self.resume_poll_secs),
        ];
        if let Some((name, _)) = budgets.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
        }

        if self.max_pending_bytes == 0 {
            return Err(ConfigError::Invalid("max_pending_bytes must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn handshake_timing(&self) -> HandshakeTiming {
        HandshakeTiming {
            reset_settle: Duration::from_millis(self.timing.reset_settle_ms),
            escalation_settle: Duration::from_millis(self.timing.escalation_settle_ms),
            monitor_settle: Duration::from_millis(self.timing.monitor_settle_ms),
            power_state_settle: Duration::from_millis(self.timing.power_state_settle_ms),
        }
    }

    pub fn suspend_policy(&self) -> SuspendPolicy {
        SuspendPolicy {
            initial_delay: Duration::from_millis(self.timing.initial_suspend_delay_ms),
            recheck_delay: Duration::from_millis(self.timing.recheck_delay_ms),
            idle_threshold: Duration::from_secs(self.timing.idle_threshold_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = DaemonConfig::from_json("{}").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.usb_vid, 0x239A);
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.suspend_policy(), SuspendPolicy::default());
    }

    #[test]
    fn test_partial_timing_override() {
        let config = DaemonConfig::from_json(
            r#"{ "port": "/dev/ttyACM0", "idle_source": "none", "timing": { "recheck_delay_ms": 30000 } }"#,
        )
        .unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.idle_source, IdleSource::None);
        assert_eq!(config.timing.recheck_delay_ms, 30000);
        assert_eq!(config.timing.initial_suspend_delay_ms, 5000);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let result = DaemonConfig::from_json(r#"{ "timing": { "reset_settle_ms": 0 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("reset_settle_ms")));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(DaemonConfig::from_json("{ port: "), Err(ConfigError::Parse(_))));
    }
}
