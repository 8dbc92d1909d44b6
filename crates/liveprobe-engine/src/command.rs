//! JSON control-plane commands.
//!
//! ```json
//! { "commandType": "ADD_LIVE_INSTRUMENT", "instruments": [ ... ] }
//! { "commandType": "REMOVE_LIVE_INSTRUMENT", "instruments": [ ... ], "locations": [ ... ] }
//! ```
//!
//! A command that does not parse, or that names nothing, publishes a
//! `command_failed` event carrying the raw command and is returned as
//! [`InstrumentError::InvalidCommand`]. Individual install failures do not
//! abort the rest of the command.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use liveprobe_core::{InstrumentError, InstrumentEvent, LiveInstrument, LocationKey};

use crate::controller::LifecycleController;
use crate::traits::EventPublisher;

/// What a command asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    /// Install every listed instrument.
    AddLiveInstrument,
    /// Remove listed instruments by id, then everything at listed locations.
    RemoveLiveInstrument,
}

/// A control-plane command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveInstrumentCommand {
    /// Operation.
    pub command_type: CommandType,
    /// Instruments to install or remove.
    #[serde(default)]
    pub instruments: Vec<LiveInstrument>,
    /// Locations to clear (remove only).
    #[serde(default)]
    pub locations: Vec<LocationKey>,
}

impl LiveInstrumentCommand {
    /// Add command for `instruments`.
    pub fn add(instruments: Vec<LiveInstrument>) -> Self {
        Self {
            command_type: CommandType::AddLiveInstrument,
            instruments,
            locations: Vec::new(),
        }
    }

    /// Remove command for `instruments` and `locations`.
    pub fn remove(instruments: Vec<LiveInstrument>, locations: Vec<LocationKey>) -> Self {
        Self {
            command_type: CommandType::RemoveLiveInstrument,
            instruments,
            locations,
        }
    }

    fn is_empty(&self) -> bool {
        match self.command_type {
            CommandType::AddLiveInstrument => self.instruments.is_empty(),
            CommandType::RemoveLiveInstrument => {
                self.instruments.is_empty() && self.locations.is_empty()
            }
        }
    }
}

/// Result of one command.
#[derive(Debug, Default)]
pub struct CommandOutcome {
    /// Instruments installed (or already registered) or removed.
    pub affected: Vec<LiveInstrument>,
    /// Per-instrument install failures.
    pub errors: Vec<InstrumentError>,
}

impl CommandOutcome {
    /// Whether every part of the command succeeded.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Applies commands to a [`LifecycleController`].
pub struct CommandHandler {
    controller: Arc<LifecycleController>,
    publisher: Arc<dyn EventPublisher>,
}

impl CommandHandler {
    /// Handler driving `controller`, reporting command failures to
    /// `publisher`.
    pub fn new(controller: Arc<LifecycleController>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            controller,
            publisher,
        }
    }

    /// Handle a command given as JSON text.
    pub fn handle_json(&self, text: &str) -> Result<CommandOutcome, InstrumentError> {
        match serde_json::from_str::<Value>(text) {
            Ok(raw) => self.handle(raw),
            Err(err) => Err(self.reject(Value::String(text.to_owned()), err.to_string())),
        }
    }

    /// Handle a command given as a JSON value.
    #[instrument(skip_all)]
    pub fn handle(&self, raw: Value) -> Result<CommandOutcome, InstrumentError> {
        let command = match LiveInstrumentCommand::deserialize(&raw) {
            Ok(command) => command,
            Err(err) => return Err(self.reject(raw, err.to_string())),
        };
        if command.is_empty() {
            return Err(self.reject(raw, "command lists no instruments or locations"));
        }

        debug!(
            command_type = ?command.command_type,
            instruments = command.instruments.len(),
            locations = command.locations.len(),
            "handling command"
        );
        let outcome = match command.command_type {
            CommandType::AddLiveInstrument => self.add(command.instruments),
            CommandType::RemoveLiveInstrument => {
                self.remove(&command.instruments, &command.locations)
            }
        };

        if !outcome.is_success() {
            let cause = outcome
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            self.publisher
                .publish(InstrumentEvent::command_failed(raw, cause));
        }
        Ok(outcome)
    }

    fn add(&self, instruments: Vec<LiveInstrument>) -> CommandOutcome {
        let mut outcome = CommandOutcome::default();
        for instrument in instruments {
            match self.controller.install(instrument) {
                Ok(installed) => outcome.affected.push(installed),
                Err(err) => outcome.errors.push(err),
            }
        }
        outcome
    }

    fn remove(&self, instruments: &[LiveInstrument], locations: &[LocationKey]) -> CommandOutcome {
        let mut outcome = CommandOutcome::default();
        for instrument in instruments {
            let location = &instrument.location;
            outcome.affected.extend(self.controller.remove(
                &location.unit,
                location.line,
                Some(instrument.id.as_str()),
            ));
        }
        for location in locations {
            outcome
                .affected
                .extend(self.controller.remove(&location.unit, location.line, None));
        }
        outcome
    }

    fn reject(&self, raw: Value, cause: impl Into<String>) -> InstrumentError {
        let cause = cause.into();
        warn!(%cause, "rejecting command");
        self.publisher
            .publish(InstrumentEvent::command_failed(raw, cause.clone()));
        InstrumentError::InvalidCommand(cause)
    }
}
