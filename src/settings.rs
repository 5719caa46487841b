//! Engine runtime settings
//!
//! These are properties of the host runtime rather than of the music:
//! clock resolution, lookahead, and the sidechain envelope timing.
//! They load from TOML; any field left out keeps its default.

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Ticks per quarter note
    pub ppq: u32,
    /// Quarter notes per bar
    pub beats_per_bar: u32,
    /// How far ahead of "now" the realtime pump schedules, in seconds
    pub lookahead_secs: f64,
    /// MIDI note of the tonic at octave 0
    pub base_midi: i32,
    pub duck_attack_secs: f64,
    pub duck_release_secs: f64,
    /// Linear gain the duck bus dips to on each kick
    pub duck_depth: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ppq: 192,
            beats_per_bar: 4,
            lookahead_secs: 0.1,
            base_midi: 48,
            duck_attack_secs: 0.005,
            duck_release_secs: 0.2,
            duck_depth: 0.3,
        }
    }
}

impl EngineSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: EngineSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn ticks_per_bar(&self) -> u64 {
        self.ppq as u64 * self.beats_per_bar as u64
    }

    /// Check the invariants the clock and ducker rely on. Settings built by
    /// hand should pass through here before reaching an engine.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.ppq == 0 {
            return Err(SettingsError::Invalid {
                field: "ppq",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.beats_per_bar == 0 {
            return Err(SettingsError::Invalid {
                field: "beats_per_bar",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.duck_depth) {
            return Err(SettingsError::Invalid {
                field: "duck_depth",
                reason: format!("{} is outside 0..1", self.duck_depth),
            });
        }
        for (field, secs) in [
            ("lookahead_secs", self.lookahead_secs),
            ("duck_attack_secs", self.duck_attack_secs),
            ("duck_release_secs", self.duck_release_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(SettingsError::Invalid {
                    field,
                    reason: format!("{} is not a non-negative duration", secs),
                });
            }
        }
        Ok(())
    }
}
