//! Seams to the host: code patching, context capture, and event delivery.
//!
//! All three are synchronous. Patching may block; the controller never holds
//! an internal lock across a [`CodeTransformEngine`] call.

use liveprobe_core::errors::TransformError;
use liveprobe_core::{InstrumentEvent, InstrumentId, KindTag, LiveInstrument, LocationKey};

use crate::capture::CaptureContext;

/// What the transform engine is asked to insert or remove.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PatchSpec {
    /// Instrument the patch calls back for.
    pub instrument_id: InstrumentId,
    /// Patch point.
    pub location: LocationKey,
    /// Kind of callback to insert.
    pub kind: KindTag,
}

impl PatchSpec {
    /// The patch an instrument requires.
    pub fn for_instrument(instrument: &LiveInstrument) -> Self {
        Self {
            instrument_id: instrument.id.clone(),
            location: instrument.location.clone(),
            kind: instrument.kind_tag(),
        }
    }
}

/// Rewrites running code so that patch points call back into the engine.
pub trait CodeTransformEngine: Send + Sync {
    /// Whether the unit is currently loaded and patchable.
    fn resolve(&self, unit: &str) -> bool;

    /// Insert the callback described by `spec` into `unit`.
    fn patch(&self, unit: &str, spec: &PatchSpec) -> Result<(), TransformError>;

    /// Remove the callback described by `spec` from `unit`.
    fn unpatch(&self, unit: &str, spec: &PatchSpec) -> Result<(), TransformError>;
}

/// Per-instrument store of values captured at the patch point.
pub trait ContextCaptureStore: Send + Sync {
    /// Snapshot of what was captured for `id` on the current hit.
    fn get(&self, id: &InstrumentId) -> CaptureContext;

    /// Discard anything captured for `id`.
    fn clear(&self, id: &InstrumentId);
}

/// Sink for lifecycle events.
pub trait EventPublisher: Send + Sync {
    /// Deliver an event. Must not block.
    fn publish(&self, event: InstrumentEvent);
}
