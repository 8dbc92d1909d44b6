//! Per-instrument hit admission.
//!
//! A [`HitThrottle`] combines two limits:
//! - an optional hit limit, after which the instrument is finished;
//! - an optional rate window admitting at most `limit` hits per step.
//!
//! Admission is lock-free for the hit limit (a compare-and-swap loop, so
//! concurrent callers never over-admit). The rate window takes a short
//! `parking_lot` lock only when one is configured.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;

use liveprobe_core::ThrottleConfig;

/// Hit limit plus optional rate window for one instrument.
#[derive(Debug)]
pub struct HitThrottle {
    hit_limit: Option<u64>,
    hits: AtomicU64,
    limited: AtomicU64,
    window: Option<RateWindow>,
}

#[derive(Debug)]
struct RateWindow {
    limit: u32,
    step_ms: i64,
    state: Mutex<WindowState>,
}

#[derive(Debug, Default)]
struct WindowState {
    started_at_ms: Option<i64>,
    count: u32,
}

impl RateWindow {
    fn admit(&self, now_ms: i64) -> bool {
        let mut state = self.state.lock();
        let expired = state
            .started_at_ms
            .is_none_or(|start| now_ms - start >= self.step_ms);
        if expired {
            state.started_at_ms = Some(now_ms);
            state.count = 0;
        }
        if state.count < self.limit {
            state.count += 1;
            true
        } else {
            false
        }
    }
}

impl HitThrottle {
    /// Throttle with an optional hit limit and optional rate window.
    pub fn new(hit_limit: Option<u32>, window: Option<ThrottleConfig>) -> Self {
        Self {
            hit_limit: hit_limit.map(u64::from),
            hits: AtomicU64::new(0),
            limited: AtomicU64::new(0),
            window: window.map(|cfg| RateWindow {
                limit: cfg.limit,
                step_ms: cfg.step.as_millis(),
                state: Mutex::new(WindowState::default()),
            }),
        }
    }

    /// Throttle that admits every hit.
    pub fn unlimited() -> Self {
        Self::new(None, None)
    }

    /// Admit a hit now. See [`HitThrottle::should_allow_at`].
    pub fn should_allow(&self) -> bool {
        self.should_allow_at(Utc::now().timestamp_millis())
    }

    /// Admit a hit at `now_ms` (epoch milliseconds).
    ///
    /// Returns `false` once the hit limit has been reached, or when the rate
    /// window is exhausted (counted in [`total_limited`](Self::total_limited)).
    /// Otherwise records the hit and returns `true`.
    pub fn should_allow_at(&self, now_ms: i64) -> bool {
        if self.is_finished() {
            return false;
        }
        if let Some(window) = &self.window {
            if !window.admit(now_ms) {
                let _ = self.limited.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }
        let mut current = self.hits.load(Ordering::Acquire);
        loop {
            if self.hit_limit.is_some_and(|limit| current >= limit) {
                return false;
            }
            match self.hits.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Whether the hit limit has been reached.
    pub fn is_finished(&self) -> bool {
        self.hit_limit
            .is_some_and(|limit| self.hits.load(Ordering::Acquire) >= limit)
    }

    /// Hits admitted so far.
    pub fn total_hits(&self) -> u64 {
        self.hits.load(Ordering::Acquire)
    }

    /// Hits rejected by the rate window.
    pub fn total_limited(&self) -> u64 {
        self.limited.load(Ordering::Relaxed)
    }

    /// The configured hit limit.
    pub fn hit_limit(&self) -> Option<u64> {
        self.hit_limit
    }
}
