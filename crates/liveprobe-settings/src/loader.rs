//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LiveProbeSettings::default()`]
//! 2. If `~/.liveprobe/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `LIVEPROBE_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::LiveProbeSettings;

/// Resolve the path to the settings file (`~/.liveprobe/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".liveprobe").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LiveProbeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid merged value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LiveProbeSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<LiveProbeSettings> {
    let defaults = serde_json::to_value(LiveProbeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LiveProbeSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LIVEPROBE_*` environment overrides to loaded settings.
///
/// Out-of-range or unparseable values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut LiveProbeSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

fn apply_overrides(settings: &mut LiveProbeSettings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = read_u64(&env, "LIVEPROBE_TICK_INTERVAL_MS", 100, 600_000) {
        settings.scheduler.tick_interval_ms = v;
    }
    if let Some(v) = read_u64(&env, "LIVEPROBE_RETRY_BACKOFF_MS", 100, 3_600_000) {
        settings.retry.backoff_ms = v;
    }
    if let Some(v) = read_u32(&env, "LIVEPROBE_RETRY_MAX_ATTEMPTS", 1, 1_000_000) {
        settings.retry.max_attempts = Some(v);
    }
    if let Some(v) = read_usize(&env, "LIVEPROBE_EVENT_CAPACITY", 1, 1_048_576) {
        settings.events.channel_capacity = v;
    }
    if let Some(v) = env("LIVEPROBE_LOG_LEVEL").filter(|v| !v.is_empty()) {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_u32(env: impl Fn(&str) -> Option<String>, name: &str, min: u32, max: u32) -> Option<u32> {
    let val = env(name)?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_u64(env: impl Fn(&str) -> Option<String>, name: &str, min: u64, max: u64) -> Option<u64> {
    let val = env(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_usize(
    env: impl Fn(&str) -> Option<String>,
    name: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    let val = env(name)?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"retry": {"backoffMs": 5000, "maxAttempts": null}});
        let source = serde_json::json!({"retry": {"backoffMs": 100}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["retry"]["backoffMs"], 100);
        assert!(merged["retry"]["maxAttempts"].is_null());
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── loading ─────────────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_with_env(Path::new("/nonexistent/settings.json"), no_env).unwrap();
        assert_eq!(settings, LiveProbeSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"scheduler": {"tickIntervalMs": 250}, "retry": {"maxAttempts": 8}}"#,
        )
        .unwrap();

        let settings = load_with_env(&path, no_env).unwrap();
        assert_eq!(settings.scheduler.tick_interval_ms, 250);
        assert_eq!(settings.retry.max_attempts, Some(8));
        assert_eq!(settings.retry.backoff_ms, 5_000);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_with_env(&path, no_env);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"events": {"channelCapacity": 0}}"#).unwrap();

        let result = load_with_env(&path, no_env);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    #[test]
    fn env_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"scheduler": {"tickIntervalMs": 250}}"#).unwrap();

        let env = env_of(&[
            ("LIVEPROBE_TICK_INTERVAL_MS", "1000"),
            ("LIVEPROBE_RETRY_MAX_ATTEMPTS", "5"),
            ("LIVEPROBE_LOG_LEVEL", "liveprobe_engine=debug"),
        ]);
        let settings = load_with_env(&path, env).unwrap();
        assert_eq!(settings.scheduler.tick_interval_ms, 1_000);
        assert_eq!(settings.retry.max_attempts, Some(5));
        assert_eq!(settings.logging.level, "liveprobe_engine=debug");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = LiveProbeSettings::default();
        apply_overrides(
            &mut settings,
            env_of(&[
                ("LIVEPROBE_TICK_INTERVAL_MS", "5"),
                ("LIVEPROBE_RETRY_BACKOFF_MS", "soon"),
                ("LIVEPROBE_EVENT_CAPACITY", "0"),
                ("LIVEPROBE_LOG_LEVEL", ""),
            ]),
        );
        assert_eq!(settings, LiveProbeSettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("100", 100, 600_000), Some(100));
        assert_eq!(parse_u64_range("600000", 100, 600_000), Some(600_000));
        assert_eq!(parse_u64_range("99", 100, 600_000), None);
        assert_eq!(parse_u64_range("abc", 100, 600_000), None);
    }

    #[test]
    fn parse_u32_bounds() {
        assert_eq!(parse_u32_range("1", 1, 1_000_000), Some(1));
        assert_eq!(parse_u32_range("0", 1, 1_000_000), None);
        assert_eq!(parse_u32_range("-3", 1, 1_000_000), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("1024", 1, 1_048_576), Some(1024));
        assert_eq!(parse_usize_range("2000000", 1, 1_048_576), None);
    }
}
