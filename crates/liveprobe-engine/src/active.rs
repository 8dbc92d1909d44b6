//! Registry-owned mutable state wrapped around a [`LiveInstrument`].

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use liveprobe_core::{InstrumentError, InstrumentId, LiveInstrument, LocationKey};

use crate::condition::CompiledPredicate;
use crate::throttle::HitThrottle;

/// One registered instrument: the request, its compiled condition, its
/// throttle, and the lifecycle flags.
#[derive(Debug)]
pub struct ActiveInstrument {
    instrument: LiveInstrument,
    predicate: Option<CompiledPredicate>,
    throttle: HitThrottle,
    live: AtomicBool,
    removal: AtomicBool,
    finished: AtomicBool,
}

impl ActiveInstrument {
    /// Compile the condition (blank means "always true") and build the throttle.
    pub fn new(instrument: LiveInstrument) -> Result<Self, InstrumentError> {
        let predicate = match instrument.condition_text() {
            Some(text) => Some(CompiledPredicate::compile(text).map_err(|source| {
                InstrumentError::ConditionInvalid {
                    id: instrument.id.clone(),
                    source,
                }
            })?),
            None => None,
        };
        let throttle = HitThrottle::new(instrument.hit_limit, instrument.throttle);
        Ok(Self {
            instrument,
            predicate,
            throttle,
            live: AtomicBool::new(false),
            removal: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        })
    }

    /// The request.
    pub fn instrument(&self) -> &LiveInstrument {
        &self.instrument
    }

    /// Id.
    pub fn id(&self) -> &InstrumentId {
        &self.instrument.id
    }

    /// Patch point.
    pub fn location(&self) -> &LocationKey {
        &self.instrument.location
    }

    /// Compiled condition, if any.
    pub fn predicate(&self) -> Option<&CompiledPredicate> {
        self.predicate.as_ref()
    }

    /// Throttle.
    pub fn throttle(&self) -> &HitThrottle {
        &self.throttle
    }

    /// Whether the patch is confirmed installed.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn mark_live(&self) {
        self.live.store(true, Ordering::Release);
    }

    /// Whether removal has been requested.
    pub fn is_removal_requested(&self) -> bool {
        self.removal.load(Ordering::Acquire)
    }

    /// Request removal. Returns `true` for the first caller only.
    pub(crate) fn request_removal(&self) -> bool {
        !self.removal.swap(true, Ordering::AcqRel)
    }

    /// Whether the hit limit was reached or the expiry has passed; the
    /// instrument is removed on its next evaluation at the latest.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
            || self.throttle.is_finished()
            || self
                .instrument
                .expires_at
                .is_some_and(|at| Utc::now() >= at)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }
}
