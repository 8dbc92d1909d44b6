//! Periodic expiry sweep and deferred-install retries.
//!
//! One tokio task ticks at a fixed interval and runs
//! [`LifecycleController::tick`] on the blocking pool, since transform calls
//! may block. Cancellation goes through a `CancellationToken`; dropping the
//! [`SchedulerHandle`] also stops the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::LifecycleController;

/// Running scheduler loop.
pub struct SchedulerHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Token that stops the loop when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal the loop to stop without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the loop task is still running.
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Stop the loop and wait for an in-flight tick to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                warn!(error = %err, "scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Start ticking `controller` every `period`. The first tick happens one
/// period after the call. Must be called inside a tokio runtime.
pub fn spawn(controller: Arc<LifecycleController>, period: Duration) -> SchedulerHandle {
    let token = CancellationToken::new();
    let cancel = token.clone();
    let period = period.max(Duration::from_millis(1));

    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis(), "instrument scheduler started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let controller = Arc::clone(&controller);
                    match tokio::task::spawn_blocking(move || controller.tick(Utc::now())).await {
                        Ok(report) if report.expired > 0 || report.retried > 0 => {
                            debug!(expired = report.expired, retried = report.retried, "scheduler tick");
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "scheduler tick panicked"),
                    }
                }
            }
        }
        info!("instrument scheduler stopped");
    });

    SchedulerHandle {
        token,
        join: Some(join),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    use liveprobe_core::{LiveInstrument, LocationKey};
    use liveprobe_core::errors::TransformError;

    use crate::capture::InMemoryContextStore;
    use crate::emitter::EventEmitter;
    use crate::registry::InstrumentRegistry;
    use crate::retry::{RetryPolicy, RetryQueue};
    use crate::traits::{CodeTransformEngine, PatchSpec};

    struct AlwaysLoaded;

    impl CodeTransformEngine for AlwaysLoaded {
        fn resolve(&self, _unit: &str) -> bool {
            true
        }
        fn patch(&self, _unit: &str, _spec: &PatchSpec) -> Result<(), TransformError> {
            Ok(())
        }
        fn unpatch(&self, _unit: &str, _spec: &PatchSpec) -> Result<(), TransformError> {
            Ok(())
        }
    }

    fn controller() -> Arc<LifecycleController> {
        Arc::new(LifecycleController::new(
            Arc::new(InstrumentRegistry::new()),
            Arc::new(RetryQueue::new(RetryPolicy::default())),
            Arc::new(AlwaysLoaded),
            Arc::new(InMemoryContextStore::new()),
            Arc::new(EventEmitter::new()),
        ))
    }

    #[tokio::test]
    async fn tick_sweeps_expired() {
        let controller = controller();
        let inst = LiveInstrument::breakpoint("bp", LocationKey::new("a.B", 1))
            .with_expires_at(Utc::now() + TimeDelta::milliseconds(30));
        let _ = controller.install(inst).unwrap();
        assert!(controller.is_instrument_enabled("bp"));

        let handle = spawn(Arc::clone(&controller), Duration::from_millis(20));
        let deadline = Instant::now() + Duration::from_secs(5);
        while controller.is_instrument_enabled("bp") && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!controller.is_instrument_enabled("bp"));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let handle = spawn(controller(), Duration::from_millis(10));
        assert!(handle.is_running());
        let token = handle.token();
        handle.shutdown().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_ends_task() {
        let handle = spawn(controller(), Duration::from_secs(60));
        handle.cancel();
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.is_running() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn drop_cancels() {
        let handle = spawn(controller(), Duration::from_secs(60));
        let token = handle.token();
        drop(handle);
        assert!(token.is_cancelled());
    }
}
