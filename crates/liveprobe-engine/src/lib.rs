//! # liveprobe-engine
//!
//! Lifecycle engine for live instruments (breakpoints, logs, meters) attached
//! to a running program.
//!
//! - [`InstrumentRegistry`]: concurrent applying/live stores
//! - [`LifecycleController`]: install, remove, hit evaluation, expiry
//! - [`condition`]: predicate language evaluated against captured context
//! - [`HitThrottle`]: hit-limit and rate-window admission
//! - [`scheduler`]: periodic expiry sweep and deferred-install retries
//! - [`LiveInstrumentEngine`]: wires it all together
//!
//! The code transform engine, the context capture store, and the event
//! publisher are injected as traits (see [`traits`]).

#![deny(unsafe_code)]

pub mod active;
pub mod capture;
pub mod command;
pub mod condition;
pub mod controller;
pub mod emitter;
pub mod engine;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod throttle;
pub mod traits;

pub use active::ActiveInstrument;
pub use capture::{CaptureContext, InMemoryContextStore};
pub use command::{CommandHandler, CommandOutcome, CommandType, LiveInstrumentCommand};
pub use condition::{CompiledPredicate, compile, evaluate};
pub use controller::{LifecycleController, TickReport};
pub use emitter::EventEmitter;
pub use engine::LiveInstrumentEngine;
pub use registry::InstrumentRegistry;
pub use retry::{RetryDecision, RetryPolicy, RetryQueue};
pub use scheduler::SchedulerHandle;
pub use throttle::HitThrottle;
pub use traits::{CodeTransformEngine, ContextCaptureStore, EventPublisher, PatchSpec};
