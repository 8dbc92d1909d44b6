//! Deferred-install retry queue.
//!
//! When a target unit is not loaded yet, the install stays in the applying
//! store and its id is queued here. The scheduler drains due entries each
//! tick. Cancellation is by id (explicit removal, expiry, or success).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use liveprobe_core::InstrumentId;
use liveprobe_settings::RetrySettings;

/// Backoff and attempt cap for deferred installs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts.
    pub backoff: Duration,
    /// Total attempts (including the first) before giving up. `None` means
    /// retry until the instrument expires or is removed.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            backoff: settings.backoff(),
            max_attempts: settings.max_attempts,
        }
    }
}

/// Outcome of recording a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Another attempt is due at `due_at`.
    Scheduled {
        /// When the next attempt is due.
        due_at: DateTime<Utc>,
        /// Attempts made so far.
        attempts: u32,
    },
    /// The attempt cap was reached; the entry has been dropped.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
}

#[derive(Clone, Copy, Debug)]
struct PendingRetry {
    // None while an attempt is in progress
    due_at: Option<DateTime<Utc>>,
    attempts: u32,
}

/// Pending deferred installs keyed by instrument id.
#[derive(Debug, Default)]
pub struct RetryQueue {
    policy: RetryPolicy,
    pending: Mutex<HashMap<InstrumentId, PendingRetry>>,
}

impl RetryQueue {
    /// Queue with the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// The policy in force.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Record a failed attempt for `id` and schedule the next one.
    pub fn schedule(&self, id: &InstrumentId, now: DateTime<Utc>) -> RetryDecision {
        let mut pending = self.pending.lock();
        let entry = pending.entry(id.clone()).or_insert(PendingRetry {
            due_at: None,
            attempts: 0,
        });
        entry.attempts = entry.attempts.saturating_add(1);
        let attempts = entry.attempts;

        if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
            let _ = pending.remove(id);
            return RetryDecision::Exhausted { attempts };
        }

        let backoff = TimeDelta::from_std(self.policy.backoff).unwrap_or(TimeDelta::MAX);
        let due_at = now.checked_add_signed(backoff).unwrap_or(DateTime::<Utc>::MAX_UTC);
        entry.due_at = Some(due_at);
        RetryDecision::Scheduled { due_at, attempts }
    }

    /// Drop any pending retry for `id`. Returns whether one existed.
    pub fn cancel(&self, id: &str) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    /// Ids whose next attempt is due at `now`, marked as in progress.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<InstrumentId> {
        let mut pending = self.pending.lock();
        let mut due: Vec<InstrumentId> = pending
            .iter_mut()
            .filter(|(_, retry)| retry.due_at.is_some_and(|at| at <= now))
            .map(|(id, retry)| {
                retry.due_at = None;
                id.clone()
            })
            .collect();
        due.sort();
        due
    }

    /// Whether `id` has a pending retry.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Attempts recorded for `id`.
    pub fn attempts(&self, id: &str) -> Option<u32> {
        self.pending.lock().get(id).map(|r| r.attempts)
    }

    /// Number of pending retries.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}
