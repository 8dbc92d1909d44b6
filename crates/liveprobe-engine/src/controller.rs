//! Instrument lifecycle: install, remove, hit evaluation, expiry, retries.
//!
//! ```text
//! Requested ──► Applying ──► Live ──► Removing ──► Removed
//!                  │  ▲                   ▲
//!                  │  └── deferred retry  │
//!                  └──► Failed            └── remove / expiry / hit limit / eval error
//! ```
//!
//! Every removal publishes a `{kind}_removed` event, with the failure cause
//! when there is one. Install failures are both returned to the caller and
//! published. No registry lock is held while the transform engine runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, trace, warn};

use liveprobe_core::{InstrumentError, InstrumentEvent, LiveInstrument, LocationKey};

use crate::active::ActiveInstrument;
use crate::registry::InstrumentRegistry;
use crate::retry::{RetryDecision, RetryQueue};
use crate::traits::{CodeTransformEngine, ContextCaptureStore, EventPublisher, PatchSpec};

/// What one scheduler tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Instruments removed because they expired.
    pub expired: usize,
    /// Deferred installs re-attempted.
    pub retried: usize,
}

/// Orchestrates the transform engine, the registry, and event publication.
pub struct LifecycleController {
    registry: Arc<InstrumentRegistry>,
    retries: Arc<RetryQueue>,
    transform: Arc<dyn CodeTransformEngine>,
    context: Arc<dyn ContextCaptureStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl LifecycleController {
    /// Wire a controller to its collaborators.
    pub fn new(
        registry: Arc<InstrumentRegistry>,
        retries: Arc<RetryQueue>,
        transform: Arc<dyn CodeTransformEngine>,
        context: Arc<dyn ContextCaptureStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            registry,
            retries,
            transform,
            context,
            publisher,
        }
    }

    /// The registry this controller manages.
    pub fn registry(&self) -> &Arc<InstrumentRegistry> {
        &self.registry
    }

    /// The deferred-install queue.
    pub fn retries(&self) -> &Arc<RetryQueue> {
        &self.retries
    }

    // ── install ─────────────────────────────────────────────────────────

    /// Install an instrument.
    ///
    /// Idempotent by id: a second install of an applying or live id returns
    /// the registered instrument unchanged. A deferred install (target not
    /// loaded, `apply_immediately == false`) also returns `Ok`.
    #[instrument(
        skip(self, instrument),
        fields(instrument_id = %instrument.id, unit = %instrument.location.unit, line = instrument.location.line)
    )]
    pub fn install(&self, instrument: LiveInstrument) -> Result<LiveInstrument, InstrumentError> {
        if let Some(existing) = self.registry.get(&instrument.id) {
            debug!("instrument already registered, coalescing");
            return Ok(existing.instrument().clone());
        }

        let active = match ActiveInstrument::new(instrument.clone()) {
            Ok(active) => Arc::new(active),
            Err(err) => {
                warn!(error = %err, "rejecting instrument");
                self.publisher
                    .publish(InstrumentEvent::removed(instrument, Some(err.to_string())));
                return Err(err);
            }
        };

        let active = match self.registry.reserve(active) {
            Ok(active) => active,
            Err(existing) => {
                debug!("instrument registered concurrently, coalescing");
                return Ok(existing.instrument().clone());
            }
        };

        self.apply(&active, Utc::now())?;
        Ok(instrument)
    }

    fn apply(
        &self,
        active: &Arc<ActiveInstrument>,
        now: DateTime<Utc>,
    ) -> Result<(), InstrumentError> {
        let instrument = active.instrument();
        let unit = instrument.location.unit_name();

        if !self.transform.resolve(unit) {
            if instrument.apply_immediately {
                return Err(self.fail_install(
                    active,
                    InstrumentError::TargetNotFound {
                        id: instrument.id.clone(),
                        unit: unit.to_owned(),
                    },
                ));
            }
            return match self.retries.schedule(&instrument.id, now) {
                RetryDecision::Scheduled { due_at, attempts } => {
                    debug!(%due_at, attempts, unit, "target not loaded, deferring install");
                    Ok(())
                }
                RetryDecision::Exhausted { attempts } => Err(self.fail_install(
                    active,
                    InstrumentError::RetriesExhausted {
                        id: instrument.id.clone(),
                        attempts,
                    },
                )),
            };
        }

        let spec = PatchSpec::for_instrument(instrument);
        if let Err(source) = self.transform.patch(unit, &spec) {
            let err = self.fail_install(
                active,
                InstrumentError::PatchFailed {
                    id: instrument.id.clone(),
                    source,
                },
            );
            // leave the unit as it was
            if let Err(secondary) = self.transform.unpatch(unit, &spec) {
                warn!(error = %secondary, unit, "unpatch after failed patch also failed");
            }
            return Err(err);
        }

        let _ = self.retries.cancel(&instrument.id);
        if self.registry.promote(&instrument.id).is_some() {
            info!(kind = %instrument.kind_tag(), "instrument applied");
            self.publisher
                .publish(InstrumentEvent::applied(instrument.clone()));
            Ok(())
        } else {
            debug!("instrument removed while applying, reversing patch");
            if let Err(err) = self.transform.unpatch(unit, &spec) {
                warn!(error = %err, unit, "failed to reverse patch of removed instrument");
            }
            Ok(())
        }
    }

    fn fail_install(&self, active: &ActiveInstrument, err: InstrumentError) -> InstrumentError {
        let _ = self.retries.cancel(active.id());
        warn!(error = %err, code = err.code(), "instrument install failed");
        if self.registry.detach(active.id()).is_some() {
            self.context.clear(active.id());
            self.publisher.publish(InstrumentEvent::removed(
                active.instrument().clone(),
                Some(err.to_string()),
            ));
        }
        err
    }

    // ── remove ──────────────────────────────────────────────────────────

    /// Remove one instrument by id, or every instrument at `(unit, line)`
    /// when `id` is `None`. Returns what was removed.
    #[instrument(skip(self))]
    pub fn remove(&self, unit: &str, line: u32, id: Option<&str>) -> Vec<LiveInstrument> {
        match id {
            Some(id) => self.remove_by_id(id, None).into_iter().collect(),
            None => self.remove_by_location(&LocationKey::new(unit, line)),
        }
    }

    /// Remove every applying or live instrument at `location`.
    pub fn remove_by_location(&self, location: &LocationKey) -> Vec<LiveInstrument> {
        self.registry
            .find_by_location(location)
            .iter()
            .filter_map(|active| self.remove_by_id(active.id(), None))
            .collect()
    }

    /// Remove one instrument, attaching `cause` to the removal event.
    ///
    /// Live instruments are unpatched; an unpatch failure is logged and
    /// becomes the cause when none was given, and the registry removal still
    /// completes. Deferred or applying instruments are never unpatched.
    pub fn remove_by_id(&self, id: &str, cause: Option<String>) -> Option<LiveInstrument> {
        self.remove_entry(id, cause, true)
    }

    fn remove_entry(
        &self,
        id: &str,
        cause: Option<String>,
        clear_context: bool,
    ) -> Option<LiveInstrument> {
        let active = self.registry.detach(id)?;
        let _ = self.retries.cancel(id);
        if clear_context {
            self.context.clear(active.id());
        }

        let instrument = active.instrument();
        let mut cause = cause;
        if active.is_live() {
            let spec = PatchSpec::for_instrument(instrument);
            if let Err(source) = self.transform.unpatch(instrument.location.unit_name(), &spec) {
                let err = InstrumentError::UnpatchFailed {
                    id: instrument.id.clone(),
                    source,
                };
                warn!(instrument_id = %instrument.id, error = %err, "unpatch failed, removing anyway");
                let _ = cause.get_or_insert_with(|| err.to_string());
            }
        }

        info!(
            instrument_id = %instrument.id,
            kind = %instrument.kind_tag(),
            cause = cause.as_deref(),
            "instrument removed"
        );
        self.publisher
            .publish(InstrumentEvent::removed(instrument.clone(), cause));
        Some(instrument.clone())
    }

    // ── queries ─────────────────────────────────────────────────────────

    /// Whether the id is applying or live.
    pub fn is_instrument_enabled(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    /// Applying and live instruments at `location`.
    pub fn get_instruments(&self, location: &LocationKey) -> Vec<LiveInstrument> {
        self.registry
            .find_by_location(location)
            .iter()
            .map(|active| active.instrument().clone())
            .collect()
    }

    // ── hot path ────────────────────────────────────────────────────────

    /// Decide whether a pass through the patch point counts as a hit.
    ///
    /// Never fails: evaluation errors remove the instrument and return
    /// `false`.
    pub fn is_hit(&self, id: &str) -> bool {
        let Some(active) = self.registry.get_live(id) else {
            trace!(instrument_id = id, "hit for unknown instrument");
            return false;
        };

        if active.is_finished() {
            let _ = self.remove_entry(id, None, true);
            return false;
        }

        if !active.throttle().should_allow() {
            trace!(instrument_id = id, "hit throttled");
            self.context.clear(active.id());
            return false;
        }

        let Some(predicate) = active.predicate() else {
            self.finish_if_done(&active);
            return true;
        };

        let ctx = self.context.get(active.id());
        match predicate.evaluate(&ctx) {
            Ok(true) => {
                self.finish_if_done(&active);
                true
            }
            Ok(false) => {
                trace!(instrument_id = id, "condition false");
                self.context.clear(active.id());
                false
            }
            Err(source) => {
                self.context.clear(active.id());
                let err = InstrumentError::EvaluationFailed {
                    id: active.id().clone(),
                    source,
                };
                warn!(
                    instrument_id = id,
                    condition = predicate.source(),
                    error = %err,
                    "condition evaluation failed, removing instrument"
                );
                let _ = self.remove_entry(id, Some(err.to_string()), false);
                false
            }
        }
    }

    fn finish_if_done(&self, active: &ActiveInstrument) {
        if active.throttle().is_finished() {
            active.mark_finished();
            debug!(instrument_id = %active.id(), "hit limit reached");
            // the captured context belongs to this final hit
            let _ = self.remove_entry(active.id(), None, false);
        }
    }

    // ── scheduler work ──────────────────────────────────────────────────

    /// Remove every instrument whose expiry has passed. Returns how many
    /// were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let expired = self.registry.expired(now);
        if !expired.is_empty() {
            debug!(count = expired.len(), "sweeping expired instruments");
        }
        expired
            .iter()
            .filter(|id| self.remove_by_id(id, None).is_some())
            .count()
    }

    /// Re-attempt deferred installs that are due. Returns how many were
    /// attempted.
    pub fn process_due_retries(&self, now: DateTime<Utc>) -> usize {
        let mut attempted = 0;
        for id in self.retries.take_due(now) {
            let Some(active) = self.registry.get_applying(&id) else {
                let _ = self.retries.cancel(&id);
                continue;
            };
            if active.instrument().is_expired_at(now) {
                continue;
            }
            attempted += 1;
            debug!(instrument_id = %id, "retrying deferred install");
            if let Err(err) = self.apply(&active, now) {
                debug!(instrument_id = %id, error = %err, "deferred install failed");
            }
        }
        attempted
    }

    /// One scheduler tick: expiry sweep, then due retries.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        TickReport {
            expired: self.sweep_expired(now),
            retried: self.process_due_retries(now),
        }
    }

    /// Drop every registered instrument and pending retry without
    /// unpatching or publishing.
    pub fn clear(&self) {
        self.registry.clear();
        self.retries.clear();
    }
}
