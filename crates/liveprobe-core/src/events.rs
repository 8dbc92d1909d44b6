//! Lifecycle events published to the control plane.
//!
//! Event names dispatch on the instrument's [`KindTag`]: a log instrument
//! produces `log_applied` / `log_removed`, a breakpoint produces
//! `breakpoint_applied` / `breakpoint_removed`, and so on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ids::InstrumentId;
use crate::instrument::{KindTag, LiveInstrument};

/// A lifecycle notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InstrumentEvent {
    /// The instrument's patch is installed and it is live.
    Applied {
        /// The instrument as requested.
        instrument: LiveInstrument,
        /// When the transition happened.
        occurred_at: DateTime<Utc>,
    },

    /// The instrument left the registry.
    Removed {
        /// The instrument as requested.
        instrument: LiveInstrument,
        /// Failure that caused the removal, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
        /// When the transition happened.
        occurred_at: DateTime<Utc>,
    },

    /// A control-plane command was rejected or partially failed.
    CommandFailed {
        /// The raw command.
        command: Value,
        /// Failure description.
        cause: String,
        /// When the failure happened.
        occurred_at: DateTime<Utc>,
    },
}

impl InstrumentEvent {
    /// An `{kind}_applied` event stamped now.
    pub fn applied(instrument: LiveInstrument) -> Self {
        Self::Applied {
            instrument,
            occurred_at: Utc::now(),
        }
    }

    /// An `{kind}_removed` event stamped now.
    pub fn removed(instrument: LiveInstrument, cause: Option<String>) -> Self {
        Self::Removed {
            instrument,
            cause,
            occurred_at: Utc::now(),
        }
    }

    /// A `command_failed` event stamped now.
    pub fn command_failed(command: Value, cause: impl Into<String>) -> Self {
        Self::CommandFailed {
            command,
            cause: cause.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Wire event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Applied { instrument, .. } => instrument.kind_tag().applied_event(),
            Self::Removed { instrument, .. } => instrument.kind_tag().removed_event(),
            Self::CommandFailed { .. } => "command_failed",
        }
    }

    /// Kind of the instrument this event concerns.
    pub fn kind(&self) -> Option<KindTag> {
        self.instrument().map(LiveInstrument::kind_tag)
    }

    /// The instrument this event concerns.
    pub fn instrument(&self) -> Option<&LiveInstrument> {
        match self {
            Self::Applied { instrument, .. } | Self::Removed { instrument, .. } => Some(instrument),
            Self::CommandFailed { .. } => None,
        }
    }

    /// Id of the instrument this event concerns.
    pub fn instrument_id(&self) -> Option<&InstrumentId> {
        self.instrument().map(|i| &i.id)
    }

    /// Failure cause carried by the event.
    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::Removed { cause, .. } => cause.as_deref(),
            Self::CommandFailed { cause, .. } => Some(cause),
            Self::Applied { .. } => None,
        }
    }

    /// Control-plane payload.
    ///
    /// The instrument is keyed by its kind name (`"log": {...}`), and
    /// `occurredAt` is epoch milliseconds.
    pub fn to_payload(&self) -> Value {
        match self {
            Self::Applied {
                instrument,
                occurred_at,
            } => json!({
                "eventType": self.event_type(),
                (instrument.kind_tag().as_str()): instrument,
                "occurredAt": occurred_at.timestamp_millis(),
            }),
            Self::Removed {
                instrument,
                cause,
                occurred_at,
            } => json!({
                "eventType": self.event_type(),
                (instrument.kind_tag().as_str()): instrument,
                "cause": cause,
                "occurredAt": occurred_at.timestamp_millis(),
            }),
            Self::CommandFailed {
                command,
                cause,
                occurred_at,
            } => json!({
                "eventType": self.event_type(),
                "command": command,
                "cause": cause,
                "occurredAt": occurred_at.timestamp_millis(),
            }),
        }
    }
}
