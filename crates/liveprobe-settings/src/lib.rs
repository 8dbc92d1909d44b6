//! # liveprobe-settings
//!
//! Configuration for the liveprobe engine, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`LiveProbeSettings::default()`]
//! 2. **User file**: `~/.liveprobe/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `LIVEPROBE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
