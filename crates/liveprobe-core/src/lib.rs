//! # liveprobe-core
//!
//! Foundation types shared by every liveprobe crate:
//!
//! - **Branded IDs**: [`InstrumentId`] as a newtype for type safety
//! - **Locations**: [`LocationKey`] identifying a patch point (unit + line)
//! - **Instruments**: [`LiveInstrument`] with its closed [`InstrumentKind`] set
//! - **Events**: [`InstrumentEvent`] lifecycle notifications
//! - **Errors**: [`InstrumentError`] taxonomy via `thiserror`
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod instrument;
pub mod location;
pub mod logging;

pub use errors::{ConditionError, InstrumentError, TransformError};
pub use events::InstrumentEvent;
pub use ids::InstrumentId;
pub use instrument::{
    BreakpointSpec, InstrumentKind, KindTag, LiveInstrument, LogSpec, MeterSpec, MeterType,
    MetricValue, MetricValueType, ThrottleConfig, ThrottleStep,
};
pub use location::LocationKey;
