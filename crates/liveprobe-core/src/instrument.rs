//! Live instrument model.
//!
//! A [`LiveInstrument`] is the immutable request the control plane sends:
//! where to attach, under which condition, for how long, and what to do on
//! a hit. The "what" is a closed set of kinds ([`InstrumentKind`]); event
//! names and removal payloads dispatch on the kind's [`KindTag`].
//!
//! All types use camelCase JSON to match the control-plane wire format.
//! The kind is flattened into the instrument object under a `type` tag:
//!
//! ```json
//! {
//!   "id": "log-1",
//!   "location": { "unit": "com.acme.Cart", "line": 42 },
//!   "condition": "total > 100",
//!   "hitLimit": 10,
//!   "type": "LOG",
//!   "logFormat": "total={}",
//!   "logArguments": ["total"]
//! }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::InstrumentId;
use crate::location::LocationKey;

// ─────────────────────────────────────────────────────────────────────────────
// LiveInstrument
// ─────────────────────────────────────────────────────────────────────────────

/// An instrument request as delivered by the control plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveInstrument {
    /// Globally unique identity.
    pub id: InstrumentId,
    /// Patch point.
    pub location: LocationKey,
    /// Boolean predicate source. Empty or absent means "always true".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Self-remove after this many successful hits. Absent means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_limit: Option<u32>,
    /// Absolute expiry (epoch milliseconds on the wire).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    /// Fail the install when the target unit cannot be found, instead of
    /// deferring and retrying.
    #[serde(default)]
    pub apply_immediately: bool,
    /// Optional rate window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<ThrottleConfig>,
    /// Free-form metadata carried through lifecycle events.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub kind: InstrumentKind,
}

impl LiveInstrument {
    /// Create an instrument of the given kind with no condition, no limits,
    /// and deferred application.
    pub fn new(id: impl Into<InstrumentId>, location: LocationKey, kind: InstrumentKind) -> Self {
        Self {
            id: id.into(),
            location,
            condition: None,
            hit_limit: None,
            expires_at: None,
            apply_immediately: false,
            throttle: None,
            meta: Map::new(),
            kind,
        }
    }

    /// Shorthand for a breakpoint.
    pub fn breakpoint(id: impl Into<InstrumentId>, location: LocationKey) -> Self {
        Self::new(id, location, InstrumentKind::Breakpoint(BreakpointSpec::default()))
    }

    /// Shorthand for a log with a format string and argument expressions.
    pub fn log(
        id: impl Into<InstrumentId>,
        location: LocationKey,
        format: impl Into<String>,
        arguments: Vec<String>,
    ) -> Self {
        Self::new(
            id,
            location,
            InstrumentKind::Log(LogSpec {
                log_format: format.into(),
                log_arguments: arguments,
            }),
        )
    }

    /// Shorthand for a meter.
    pub fn meter(id: impl Into<InstrumentId>, location: LocationKey, spec: MeterSpec) -> Self {
        Self::new(id, location, InstrumentKind::Meter(spec))
    }

    /// Set the condition expression.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Set the hit limit.
    #[must_use]
    pub fn with_hit_limit(mut self, limit: u32) -> Self {
        self.hit_limit = Some(limit);
        self
    }

    /// Set the absolute expiry.
    #[must_use]
    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Set the rate window.
    #[must_use]
    pub fn with_throttle(mut self, limit: u32, step: ThrottleStep) -> Self {
        self.throttle = Some(ThrottleConfig { limit, step });
        self
    }

    /// Require the target unit to be resolvable at install time.
    #[must_use]
    pub fn applied_immediately(mut self) -> Self {
        self.apply_immediately = true;
        self
    }

    /// The condition text, if it is non-blank.
    pub fn condition_text(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Whether `expires_at` has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// The closed kind tag.
    pub fn kind_tag(&self) -> KindTag {
        self.kind.tag()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Kind-specific payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentKind {
    /// Capture a snapshot of the frame.
    Breakpoint(BreakpointSpec),
    /// Emit a formatted log line.
    Log(LogSpec),
    /// Record a metric sample.
    Meter(MeterSpec),
}

impl InstrumentKind {
    /// The closed kind tag.
    pub fn tag(&self) -> KindTag {
        match self {
            Self::Breakpoint(_) => KindTag::Breakpoint,
            Self::Log(_) => KindTag::Log,
            Self::Meter(_) => KindTag::Meter,
        }
    }
}

/// Breakpoint payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointSpec {
    /// Maximum object depth to capture; `None` defers to the capture store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_object_depth: Option<u32>,
}

/// Log payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSpec {
    /// Format string with `{}` placeholders.
    pub log_format: String,
    /// Names of captured values substituted into the placeholders.
    #[serde(default)]
    pub log_arguments: Vec<String>,
}

/// Meter payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterSpec {
    /// Metric name.
    pub meter_name: String,
    /// Metric type.
    pub meter_type: MeterType,
    /// Where the sample value comes from.
    pub metric_value: MetricValue,
}

/// Metric type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeterType {
    /// Monotonic counter.
    Count,
    /// Last-value gauge.
    Gauge,
    /// Distribution.
    Histogram,
}

/// Source of a meter's sample value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    /// How `value` is interpreted.
    pub value_type: MetricValueType,
    /// Literal number or expression source.
    pub value: String,
}

/// Interpretation of [`MetricValue::value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricValueType {
    /// A literal number.
    Number,
    /// An expression evaluating to a number.
    NumberExpression,
    /// A literal value.
    Value,
    /// An expression evaluating to any value.
    ValueExpression,
}

/// The closed set of instrument kinds, without payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindTag {
    /// [`InstrumentKind::Breakpoint`].
    Breakpoint,
    /// [`InstrumentKind::Log`].
    Log,
    /// [`InstrumentKind::Meter`].
    Meter,
}

impl KindTag {
    /// Lowercase name used in event names and payload keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Breakpoint => "breakpoint",
            Self::Log => "log",
            Self::Meter => "meter",
        }
    }

    /// Name of the "applied" event for this kind.
    pub const fn applied_event(self) -> &'static str {
        match self {
            Self::Breakpoint => "breakpoint_applied",
            Self::Log => "log_applied",
            Self::Meter => "meter_applied",
        }
    }

    /// Name of the "removed" event for this kind.
    pub const fn removed_event(self) -> &'static str {
        match self {
            Self::Breakpoint => "breakpoint_removed",
            Self::Log => "log_removed",
            Self::Meter => "meter_removed",
        }
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Throttle configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Rate window: at most `limit` hits per `step`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleConfig {
    /// Hits admitted per window.
    pub limit: u32,
    /// Window length.
    pub step: ThrottleStep,
}

/// Window length for a [`ThrottleConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThrottleStep {
    /// One second.
    Second,
    /// One minute.
    Minute,
    /// One hour.
    Hour,
    /// One day.
    Day,
}

impl ThrottleStep {
    /// Window length in milliseconds.
    pub const fn as_millis(self) -> i64 {
        match self {
            Self::Second => 1_000,
            Self::Minute => 60_000,
            Self::Hour => 3_600_000,
            Self::Day => 86_400_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn loc() -> LocationKey {
        LocationKey::new("com.acme.Cart", 42)
    }

    #[test]
    fn log_round_trips_through_wire_format() {
        let wire = json!({
            "id": "log-1",
            "location": {"unit": "com.acme.Cart", "line": 42},
            "condition": "total > 100",
            "hitLimit": 10,
            "expiresAt": 1_700_000_000_000_i64,
            "type": "LOG",
            "logFormat": "total={}",
            "logArguments": ["total"]
        });
        let inst: LiveInstrument = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(inst.id.as_str(), "log-1");
        assert_eq!(inst.hit_limit, Some(10));
        assert_eq!(inst.kind_tag(), KindTag::Log);
        assert!(!inst.apply_immediately);
        assert_eq!(
            inst.expires_at,
            Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
        );
        assert_eq!(serde_json::to_value(&inst).unwrap()["logFormat"], "total={}");
    }

    #[test]
    fn breakpoint_minimal_wire_format() {
        let wire = json!({
            "id": "bp-1",
            "location": {"source": "a.B", "line": 3},
            "type": "BREAKPOINT"
        });
        let inst: LiveInstrument = serde_json::from_value(wire).unwrap();
        assert_eq!(inst.kind, InstrumentKind::Breakpoint(BreakpointSpec::default()));
        assert!(inst.condition.is_none());
        assert!(inst.expires_at.is_none());
    }

    #[test]
    fn meter_wire_format() {
        let wire = json!({
            "id": "m-1",
            "location": {"unit": "a.B", "line": 3},
            "type": "METER",
            "meterName": "cart_totals",
            "meterType": "COUNT",
            "metricValue": {"valueType": "NUMBER", "value": "1"}
        });
        let inst: LiveInstrument = serde_json::from_value(wire).unwrap();
        let InstrumentKind::Meter(spec) = &inst.kind else {
            panic!("expected meter");
        };
        assert_eq!(spec.meter_type, MeterType::Count);
        assert_eq!(spec.metric_value.value_type, MetricValueType::Number);
    }

    #[test]
    fn unknown_kind_rejected() {
        let wire = json!({
            "id": "x",
            "location": {"unit": "a.B", "line": 3},
            "type": "SPAN"
        });
        assert!(serde_json::from_value::<LiveInstrument>(wire).is_err());
    }

    #[test]
    fn blank_condition_is_no_condition() {
        let inst = LiveInstrument::breakpoint("bp", loc()).with_condition("   ");
        assert!(inst.condition_text().is_none());
        let inst = inst.with_condition(" x > 1 ");
        assert_eq!(inst.condition_text(), Some("x > 1"));
    }

    #[test]
    fn expiry_check() {
        let at = Utc.timestamp_millis_opt(10_000).unwrap();
        let inst = LiveInstrument::breakpoint("bp", loc()).with_expires_at(at);
        assert!(!inst.is_expired_at(Utc.timestamp_millis_opt(9_999).unwrap()));
        assert!(inst.is_expired_at(at));
        assert!(!LiveInstrument::breakpoint("bp", loc()).is_expired_at(at));
    }

    #[test]
    fn event_names_per_kind() {
        assert_eq!(KindTag::Breakpoint.applied_event(), "breakpoint_applied");
        assert_eq!(KindTag::Log.removed_event(), "log_removed");
        assert_eq!(KindTag::Meter.applied_event(), "meter_applied");
    }

    #[test]
    fn throttle_step_millis() {
        assert_eq!(ThrottleStep::Second.as_millis(), 1_000);
        assert_eq!(ThrottleStep::Day.as_millis(), 86_400_000);
        let inst = LiveInstrument::breakpoint("bp", loc()).with_throttle(5, ThrottleStep::Minute);
        let json = serde_json::to_value(&inst).unwrap();
        assert_eq!(json["throttle"], json!({"limit": 5, "step": "MINUTE"}));
    }
}
