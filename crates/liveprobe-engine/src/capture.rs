//! Captured frame values and an in-memory capture store.
//!
//! Instrumented code records local variables, instance fields, and static
//! fields for an instrument before asking whether it is hit. Conditions are
//! evaluated against that [`CaptureContext`].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use liveprobe_core::InstrumentId;

use crate::traits::ContextCaptureStore;

/// Local variable name under which a method's return value is stored.
pub const RETURN_VARIABLE: &str = "@return";

/// Named values captured at a patch point.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureContext {
    /// Local variables in scope.
    #[serde(default)]
    pub local_variables: Map<String, Value>,
    /// Fields of the receiver.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Static fields of the unit.
    #[serde(default)]
    pub static_fields: Map<String, Value>,
}

/// A scope of a [`CaptureContext`], addressable by root name in conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// `localVariables`
    Locals,
    /// `fields`
    Fields,
    /// `staticFields`
    Statics,
}

impl Scope {
    /// Scope named by a condition root identifier.
    pub fn from_root(name: &str) -> Option<Self> {
        match name {
            "localVariables" => Some(Self::Locals),
            "fields" => Some(Self::Fields),
            "staticFields" => Some(Self::Statics),
            _ => None,
        }
    }
}

impl CaptureContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a local variable.
    #[must_use]
    pub fn with_local(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.local_variables.insert(name.into(), value.into());
        self
    }

    /// Builder: add a field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder: add a static field.
    #[must_use]
    pub fn with_static(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.static_fields.insert(name.into(), value.into());
        self
    }

    /// Resolve a bare name: locals, then fields, then statics.
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.local_variables
            .get(name)
            .or_else(|| self.fields.get(name))
            .or_else(|| self.static_fields.get(name))
    }

    /// The values of one scope.
    pub fn scope(&self, scope: Scope) -> &Map<String, Value> {
        match scope {
            Scope::Locals => &self.local_variables,
            Scope::Fields => &self.fields,
            Scope::Statics => &self.static_fields,
        }
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.local_variables.is_empty() && self.fields.is_empty() && self.static_fields.is_empty()
    }
}

/// Capture store backed by a concurrent map, one frame per instrument.
#[derive(Debug, Default)]
pub struct InMemoryContextStore {
    frames: DashMap<InstrumentId, CaptureContext>,
}

impl InMemoryContextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local variable for `id`.
    pub fn put_local_variable(&self, id: &InstrumentId, name: &str, value: Value) {
        let _ = self
            .frames
            .entry(id.clone())
            .or_default()
            .local_variables
            .insert(name.to_owned(), value);
    }

    /// Record an instance field for `id`.
    pub fn put_field(&self, id: &InstrumentId, name: &str, value: Value) {
        let _ = self
            .frames
            .entry(id.clone())
            .or_default()
            .fields
            .insert(name.to_owned(), value);
    }

    /// Record a static field for `id`.
    pub fn put_static_field(&self, id: &InstrumentId, name: &str, value: Value) {
        let _ = self
            .frames
            .entry(id.clone())
            .or_default()
            .static_fields
            .insert(name.to_owned(), value);
    }

    /// Record the return value for `id`.
    pub fn put_return(&self, id: &InstrumentId, value: Value) {
        self.put_local_variable(id, RETURN_VARIABLE, value);
    }

    /// Remove and return the frame for `id`.
    pub fn take(&self, id: &InstrumentId) -> Option<CaptureContext> {
        self.frames.remove(id).map(|(_, frame)| frame)
    }

    /// Number of instruments with captured values.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frames are held.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl ContextCaptureStore for InMemoryContextStore {
    fn get(&self, id: &InstrumentId) -> CaptureContext {
        self.frames
            .get(id)
            .map(|frame| frame.value().clone())
            .unwrap_or_default()
    }

    fn clear(&self, id: &InstrumentId) {
        let _ = self.frames.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolution_order_locals_fields_statics() {
        let ctx = CaptureContext::new()
            .with_static("x", 3)
            .with_field("x", 2)
            .with_local("x", 1)
            .with_static("only_static", true);
        assert_eq!(ctx.resolve("x"), Some(&json!(1)));
        assert_eq!(ctx.resolve("only_static"), Some(&json!(true)));
        assert_eq!(ctx.resolve("missing"), None);
    }

    #[test]
    fn scope_roots() {
        assert_eq!(Scope::from_root("fields"), Some(Scope::Fields));
        assert_eq!(Scope::from_root("localVariables"), Some(Scope::Locals));
        assert_eq!(Scope::from_root("staticFields"), Some(Scope::Statics));
        assert_eq!(Scope::from_root("x"), None);
    }

    #[test]
    fn store_put_get_clear() {
        let store = InMemoryContextStore::new();
        let id = InstrumentId::from("bp-1");
        store.put_local_variable(&id, "x", json!(10));
        store.put_field(&id, "count", json!(4));
        store.put_static_field(&id, "LIMIT", json!(100));
        store.put_return(&id, json!("ok"));

        let ctx = store.get(&id);
        assert_eq!(ctx.resolve("x"), Some(&json!(10)));
        assert_eq!(ctx.fields["count"], 4);
        assert_eq!(ctx.static_fields["LIMIT"], 100);
        assert_eq!(ctx.local_variables[RETURN_VARIABLE], "ok");

        store.clear(&id);
        assert!(store.get(&id).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn get_unknown_is_empty_snapshot() {
        let store = InMemoryContextStore::new();
        assert!(store.get(&InstrumentId::from("nope")).is_empty());
    }

    #[test]
    fn take_removes_frame() {
        let store = InMemoryContextStore::new();
        let id = InstrumentId::from("log-1");
        store.put_local_variable(&id, "a", json!(1));
        let frame = store.take(&id).unwrap();
        assert_eq!(frame.local_variables["a"], 1);
        assert!(store.take(&id).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn snapshot_does_not_alias() {
        let store = InMemoryContextStore::new();
        let id = InstrumentId::from("m-1");
        store.put_local_variable(&id, "a", json!(1));
        let snapshot = store.get(&id);
        store.put_local_variable(&id, "a", json!(2));
        assert_eq!(snapshot.local_variables["a"], 1);
    }
}
