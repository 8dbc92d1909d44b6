//! Engine facade: owns the registry, retry queue, and controller, and runs
//! the scheduler.

use std::sync::Arc;

use tracing::info;

use liveprobe_core::{InstrumentError, LiveInstrument, LocationKey};
use liveprobe_settings::LiveProbeSettings;

use crate::command::CommandHandler;
use crate::controller::LifecycleController;
use crate::emitter::EventEmitter;
use crate::registry::InstrumentRegistry;
use crate::retry::{RetryPolicy, RetryQueue};
use crate::scheduler::{self, SchedulerHandle};
use crate::traits::{CodeTransformEngine, ContextCaptureStore, EventPublisher};

/// A configured instrument lifecycle engine.
///
/// ```text
/// let engine = LiveInstrumentEngine::new(transform, context, publisher, &settings);
/// let scheduler = engine.start();
/// engine.install(instrument)?;
/// // ...
/// engine.shutdown(scheduler).await;
/// ```
pub struct LiveInstrumentEngine {
    controller: Arc<LifecycleController>,
    publisher: Arc<dyn EventPublisher>,
    emitter: Option<Arc<EventEmitter>>,
    settings: LiveProbeSettings,
}

impl LiveInstrumentEngine {
    /// Build an engine publishing to `publisher`.
    pub fn new(
        transform: Arc<dyn CodeTransformEngine>,
        context: Arc<dyn ContextCaptureStore>,
        publisher: Arc<dyn EventPublisher>,
        settings: &LiveProbeSettings,
    ) -> Self {
        let registry = Arc::new(InstrumentRegistry::new());
        let retries = Arc::new(RetryQueue::new(RetryPolicy::from(&settings.retry)));
        let controller = Arc::new(LifecycleController::new(
            registry,
            retries,
            transform,
            context,
            Arc::clone(&publisher),
        ));
        Self {
            controller,
            publisher,
            emitter: None,
            settings: settings.clone(),
        }
    }

    /// Build an engine publishing to a broadcast [`EventEmitter`] sized by
    /// `settings.events.channel_capacity`. Subscribe through
    /// [`emitter`](Self::emitter).
    pub fn with_emitter(
        transform: Arc<dyn CodeTransformEngine>,
        context: Arc<dyn ContextCaptureStore>,
        settings: &LiveProbeSettings,
    ) -> Self {
        let emitter = Arc::new(EventEmitter::with_capacity(settings.events.channel_capacity));
        let mut engine = Self::new(transform, context, emitter.clone(), settings);
        engine.emitter = Some(emitter);
        engine
    }

    /// The broadcast emitter, when built with [`with_emitter`](Self::with_emitter).
    pub fn emitter(&self) -> Option<&Arc<EventEmitter>> {
        self.emitter.as_ref()
    }

    /// The settings this engine was built with.
    pub fn settings(&self) -> &LiveProbeSettings {
        &self.settings
    }

    /// The lifecycle controller.
    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    /// A command handler bound to this engine.
    pub fn command_handler(&self) -> CommandHandler {
        CommandHandler::new(Arc::clone(&self.controller), Arc::clone(&self.publisher))
    }

    /// Spawn the scheduler loop. Must be called inside a tokio runtime.
    pub fn start(&self) -> SchedulerHandle {
        let period = self.settings.scheduler.tick_interval();
        info!(tick_interval_ms = self.settings.scheduler.tick_interval_ms, "starting live instrument engine");
        scheduler::spawn(Arc::clone(&self.controller), period)
    }

    /// Stop the scheduler and drop all registered state. Patches are not
    /// reversed and no events are published.
    pub async fn shutdown(&self, scheduler: SchedulerHandle) {
        scheduler.shutdown().await;
        self.controller.clear();
        info!("live instrument engine stopped");
    }

    // ── commands ────────────────────────────────────────────────────────

    /// See [`LifecycleController::install`].
    pub fn install(&self, instrument: LiveInstrument) -> Result<LiveInstrument, InstrumentError> {
        self.controller.install(instrument)
    }

    /// See [`LifecycleController::remove`].
    pub fn remove(&self, unit: &str, line: u32, id: Option<&str>) -> Vec<LiveInstrument> {
        self.controller.remove(unit, line, id)
    }

    // ── hot path ────────────────────────────────────────────────────────

    /// See [`LifecycleController::is_hit`].
    pub fn is_hit(&self, id: &str) -> bool {
        self.controller.is_hit(id)
    }

    // ── diagnostics ─────────────────────────────────────────────────────

    /// Whether the id is applying or live.
    pub fn is_instrument_enabled(&self, id: &str) -> bool {
        self.controller.is_instrument_enabled(id)
    }

    /// Applying and live instruments at `(unit, line)`.
    pub fn get_instruments(&self, unit: &str, line: u32) -> Vec<LiveInstrument> {
        self.instruments_at(&LocationKey::new(unit, line))
    }

    /// Applying and live instruments at `location`.
    pub fn instruments_at(&self, location: &LocationKey) -> Vec<LiveInstrument> {
        self.controller.get_instruments(location)
    }

    /// One registered instrument by id.
    pub fn get_instrument(&self, id: &str) -> Option<LiveInstrument> {
        self.controller
            .registry()
            .get(id)
            .map(|active| active.instrument().clone())
    }

    /// Copy of every live instrument.
    pub fn snapshot(&self) -> Vec<LiveInstrument> {
        self.controller.registry().snapshot()
    }

    /// Number of live instruments.
    pub fn live_count(&self) -> usize {
        self.controller.registry().live_count()
    }

    /// Number of instruments still applying, deferred ones included.
    pub fn applying_count(&self) -> usize {
        self.controller.registry().applying_count()
    }

    /// Number of deferred installs awaiting a retry.
    pub fn pending_retries(&self) -> usize {
        self.controller.retries().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use liveprobe_core::errors::TransformError;
    use liveprobe_settings::RetrySettings;

    use crate::capture::InMemoryContextStore;
    use crate::traits::PatchSpec;

    struct Units(&'static str);

    impl CodeTransformEngine for Units {
        fn resolve(&self, unit: &str) -> bool {
            unit == self.0
        }
        fn patch(&self, _unit: &str, _spec: &PatchSpec) -> Result<(), TransformError> {
            Ok(())
        }
        fn unpatch(&self, _unit: &str, _spec: &PatchSpec) -> Result<(), TransformError> {
            Ok(())
        }
    }

    fn engine(settings: &LiveProbeSettings) -> LiveInstrumentEngine {
        LiveInstrumentEngine::with_emitter(
            Arc::new(Units("a.B")),
            Arc::new(InMemoryContextStore::new()),
            settings,
        )
    }

    #[test]
    fn diagnostics_reflect_both_stores() {
        let engine = engine(&LiveProbeSettings::default());
        let _ = engine
            .install(LiveInstrument::breakpoint("live", LocationKey::new("a.B", 1)))
            .unwrap();
        let _ = engine
            .install(LiveInstrument::breakpoint("later", LocationKey::new("x.Y", 1)))
            .unwrap();

        assert_eq!(engine.live_count(), 1);
        assert_eq!(engine.applying_count(), 1);
        assert_eq!(engine.pending_retries(), 1);
        assert_eq!(engine.snapshot().len(), 1);
        assert_eq!(engine.get_instruments("a.B", 1).len(), 1);
        assert_eq!(engine.get_instrument("later").unwrap().location.unit, "x.Y");
        assert!(engine.get_instrument("nope").is_none());
    }

    #[test]
    fn retry_settings_reach_the_queue() {
        let settings = LiveProbeSettings {
            retry: RetrySettings {
                backoff_ms: 250,
                max_attempts: Some(3),
            },
            ..LiveProbeSettings::default()
        };
        let engine = engine(&settings);
        let policy = engine.controller().retries().policy();
        assert_eq!(policy.backoff, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, Some(3));
    }

    #[tokio::test]
    async fn emitter_sees_engine_events() {
        let engine = engine(&LiveProbeSettings::default());
        let mut rx = engine.emitter().unwrap().subscribe();
        let _ = engine
            .install(LiveInstrument::breakpoint("bp", LocationKey::new("a.B", 1)))
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().event_type(), "breakpoint_applied");
    }

    #[tokio::test]
    async fn shutdown_clears_state() {
        let engine = engine(&LiveProbeSettings::default());
        let scheduler = engine.start();
        let _ = engine
            .install(LiveInstrument::breakpoint("bp", LocationKey::new("a.B", 1)))
            .unwrap();
        let _ = engine
            .install(LiveInstrument::breakpoint("later", LocationKey::new("x.Y", 1)))
            .unwrap();
        engine.shutdown(scheduler).await;
        assert_eq!(engine.live_count() + engine.applying_count(), 0);
        assert_eq!(engine.pending_retries(), 0);
    }
}
