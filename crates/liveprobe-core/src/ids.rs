//! Branded ID newtypes.
//!
//! Instrument IDs are usually assigned by the control plane. When a caller
//! needs a fresh one, [`InstrumentId::new`] produces a UUID v7 string.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a live instrument.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create a new random ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for InstrumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for InstrumentId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for InstrumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets `DashMap<InstrumentId, _>` be queried with a plain `&str`.
impl Borrow<str> for InstrumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for InstrumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<InstrumentId> for String {
    fn from(id: InstrumentId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn new_ids_are_unique() {
        let a = InstrumentId::new();
        let b = InstrumentId::new();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn serializes_transparently() {
        let id = InstrumentId::from("bp-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"bp-1\"");
        let back: InstrumentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn borrow_allows_str_lookup() {
        let mut map = HashMap::new();
        let _ = map.insert(InstrumentId::from("log-7"), 7);
        assert_eq!(map.get("log-7"), Some(&7));
    }

    #[test]
    fn display_matches_inner() {
        let id = InstrumentId::from("meter-2");
        assert_eq!(id.to_string(), "meter-2");
        assert_eq!(id.into_inner(), "meter-2");
    }
}
