//! Settings type definitions.
//!
//! All types use camelCase JSON and implement [`Default`] with production
//! values. Every section is `#[serde(default)]`, so partial JSON is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the liveprobe engine.
///
/// ```json
/// {
///   "scheduler": { "tickIntervalMs": 1000 },
///   "retry": { "backoffMs": 2000, "maxAttempts": 10 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveProbeSettings {
    /// Expiry sweep and retry tick.
    pub scheduler: SchedulerSettings,
    /// Deferred-install retry policy.
    pub retry: RetrySettings,
    /// Lifecycle event channel.
    pub events: EventSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl LiveProbeSettings {
    /// Reject values no engine could run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "scheduler.tickIntervalMs must be greater than 0".into(),
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(SettingsError::InvalidValue(
                "retry.maxAttempts must be at least 1 when set".into(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "events.channelCapacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Scheduler loop settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSettings {
    /// Milliseconds between expiry sweeps / retry drains.
    pub tick_interval_ms: u64,
}

impl SchedulerSettings {
    /// Tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5_000,
        }
    }
}

/// Deferred-install retry policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Delay before re-attempting a deferred install.
    pub backoff_ms: u64,
    /// Attempt cap. `None` retries until the instrument expires or is
    /// removed.
    pub max_attempts: Option<u32>,
}

impl RetrySettings {
    /// Backoff as a [`Duration`].
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            backoff_ms: 5_000,
            max_attempts: None,
        }
    }
}

/// Lifecycle event channel settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSettings {
    /// Broadcast buffer size; slower subscribers lag past this.
    pub channel_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
