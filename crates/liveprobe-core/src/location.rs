//! Patch point identification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a patch point as a (code unit, line) pair.
///
/// Several instruments may share one location. The `unit` string is the
/// identifier the control plane sent; it may be written as a method
/// signature (`com.acme.Cart.total(int)`), see [`LocationKey::unit_name`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationKey {
    /// Code unit identifier.
    #[serde(alias = "source")]
    pub unit: String,
    /// One-based line number.
    pub line: u32,
}

impl LocationKey {
    /// Create a location from a unit identifier and line.
    pub fn new(unit: impl Into<String>, line: u32) -> Self {
        Self {
            unit: unit.into(),
            line,
        }
    }

    /// The patchable unit this location lives in.
    ///
    /// A method-signature form (`a.B.method(int)`) is reduced to its owning
    /// unit (`a.B`); plain identifiers are returned unchanged.
    pub fn unit_name(&self) -> &str {
        match self.unit.split_once('(') {
            Some((qualified_method, _)) => qualified_method
                .rsplit_once('.')
                .map_or(qualified_method, |(unit, _)| unit),
            None => &self.unit,
        }
    }

    /// Whether an instrument registered at `self` answers a lookup for `query`.
    ///
    /// Lines must be equal. Units match exactly, or `self` is a nested unit
    /// of the queried one (`a.B$Inner` answers a lookup for `a.B`).
    pub fn matches(&self, query: &LocationKey) -> bool {
        self.line == query.line
            && self
                .unit
                .strip_prefix(query.unit.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('$'))
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_name_plain() {
        let loc = LocationKey::new("com.acme.Cart", 42);
        assert_eq!(loc.unit_name(), "com.acme.Cart");
    }

    #[test]
    fn unit_name_strips_method_signature() {
        let loc = LocationKey::new("com.acme.Cart.total(int,long)", 42);
        assert_eq!(loc.unit_name(), "com.acme.Cart");
    }

    #[test]
    fn unit_name_method_without_package() {
        let loc = LocationKey::new("run()", 1);
        assert_eq!(loc.unit_name(), "run");
    }

    #[test]
    fn matches_exact() {
        let loc = LocationKey::new("a.B", 10);
        assert!(loc.matches(&LocationKey::new("a.B", 10)));
        assert!(!loc.matches(&LocationKey::new("a.B", 11)));
    }

    #[test]
    fn matches_nested_unit() {
        let inner = LocationKey::new("a.B$Inner", 10);
        assert!(inner.matches(&LocationKey::new("a.B", 10)));
    }

    #[test]
    fn does_not_match_sibling_prefix() {
        let other = LocationKey::new("a.Bc", 10);
        assert!(!other.matches(&LocationKey::new("a.B", 10)));
    }

    #[test]
    fn deserializes_source_alias() {
        let loc: LocationKey = serde_json::from_str(r#"{"source":"a.B","line":3}"#).unwrap();
        assert_eq!(loc, LocationKey::new("a.B", 3));
    }

    #[test]
    fn display_format() {
        assert_eq!(LocationKey::new("a.B", 7).to_string(), "a.B:7");
    }
}
