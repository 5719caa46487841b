//! Raw recipe input
//!
//! A recipe is the declarative description of a piece: tempo, key,
//! progression, sections and per-instrument settings. These types mirror
//! the input exactly as the host supplies it, so almost every field is
//! optional. Nothing here applies defaults; see [`crate::config`] for that.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The full recipe as supplied by the host. Read-only after load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Engine flavor (`synthwave`, `ambient`, `hum`, `dtmf`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub global: Option<GlobalConfig>,
    /// Roman-numeral chord symbols, cycled by bar.
    #[serde(default)]
    pub progression: Option<Vec<String>>,
    #[serde(default)]
    pub sections: Option<Vec<SectionSpec>>,
    #[serde(default)]
    pub instruments: HashMap<String, VoiceConfig>,
    #[serde(default)]
    pub buses: BusesConfig,
}

impl Recipe {
    /// Decode a recipe from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode a recipe from an already-parsed JSON value.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub scale: Option<String>,
    /// Seed for the random pattern generator.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// One named block of bars in the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub bars: u32,
}

impl SectionSpec {
    pub fn new(name: &str, bars: u32) -> Self {
        Self {
            name: name.to_string(),
            bars,
        }
    }
}

/// Oscillator shape for a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wave {
    Sine,
    Square,
    #[serde(alias = "saw")]
    Sawtooth,
    Triangle,
    Noise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    #[serde(default)]
    pub attack: Option<f64>,
    #[serde(default)]
    pub decay: Option<f64>,
    #[serde(default)]
    pub sustain: Option<f64>,
    #[serde(default)]
    pub release: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterEnvelopeConfig {
    #[serde(flatten)]
    pub shape: EnvelopeConfig,
    /// Sweep range above the base cutoff, in octaves.
    #[serde(default)]
    pub octaves: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default, rename = "type")]
    pub kind: Option<FilterKind>,
    #[serde(default, alias = "frequency")]
    pub cutoff: Option<f64>,
    #[serde(default, alias = "Q")]
    pub q: Option<f64>,
    #[serde(default)]
    pub envelope: Option<FilterEnvelopeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EuclidSpec {
    pub pulses: usize,
    #[serde(default)]
    pub rotation: Option<i32>,
}

/// How a voice's step pattern is given in the recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSpec {
    /// Explicit steps: a note index, or `-1`/`null` for a rest.
    Steps(Vec<Option<i32>>),
    /// A named generator such as `arp_up`.
    Named(String),
    Euclid { euclid: EuclidSpec },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    pub start_hz: f64,
    pub end_hz: f64,
    /// Ramp length in bars.
    #[serde(default)]
    pub bars: Option<u32>,
}

/// Per-section adjustments for one voice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionOverride {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Filter cutoff set instantly at section start.
    #[serde(default)]
    pub cutoff: Option<f64>,
    /// Filter cutoff ramp starting at section start.
    #[serde(default)]
    pub sweep: Option<SweepSpec>,
    /// Voice volume in dB from section start.
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Settings for one instrument as written in the recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub wave: Option<Wave>,
    #[serde(default)]
    pub filter: Option<FilterConfig>,
    #[serde(default)]
    pub envelope: Option<EnvelopeConfig>,
    #[serde(default)]
    pub pattern: Option<PatternSpec>,
    #[serde(default)]
    pub steps: Option<usize>,
    #[serde(default)]
    pub velocity: Option<Vec<f64>>,
    #[serde(default)]
    pub subdivision: Option<String>,
    #[serde(default)]
    pub octave: Option<i32>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub melody: Option<Vec<Option<i32>>>,
    #[serde(default)]
    pub rhythm: Option<String>,
    #[serde(default, rename = "startBeat", alias = "start_beat")]
    pub start_beat: Option<u32>,
    #[serde(default, rename = "stopBeat", alias = "stop_beat")]
    pub stop_beat: Option<u32>,
    #[serde(default, rename = "baseVolume", alias = "base_volume")]
    pub base_volume: Option<f64>,
    #[serde(default)]
    pub rest_probability: Option<f64>,
    #[serde(default)]
    pub section_overrides: HashMap<String, SectionOverride>,
}

impl VoiceConfig {
    /// True when nothing but section overrides was given.
    pub fn is_trivial(&self) -> bool {
        self.wave.is_none()
            && self.filter.is_none()
            && self.envelope.is_none()
            && self.pattern.is_none()
            && self.steps.is_none()
            && self.velocity.is_none()
            && self.subdivision.is_none()
            && self.octave.is_none()
            && self.duration.is_none()
            && self.melody.is_none()
            && self.rhythm.is_none()
            && self.start_beat.is_none()
            && self.stop_beat.is_none()
            && self.base_volume.is_none()
            && self.rest_probability.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReverbConfig {
    #[serde(default)]
    pub decay: Option<f64>,
    #[serde(default)]
    pub wet: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChorusConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub frequency: Option<f64>,
    #[serde(default)]
    pub depth: Option<f64>,
    #[serde(default)]
    pub wet: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Delay time as a subdivision such as `8n`.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub feedback: Option<f64>,
    #[serde(default)]
    pub wet: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuckConfig {
    #[serde(default)]
    pub attack: Option<f64>,
    #[serde(default)]
    pub release: Option<f64>,
    /// Gain floor the duck bus dips to, linear 0..1.
    #[serde(default)]
    pub depth: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Master volume in dB.
    #[serde(default)]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusesConfig {
    #[serde(default)]
    pub reverb: Option<ReverbConfig>,
    #[serde(default)]
    pub chorus: Option<ChorusConfig>,
    #[serde(default)]
    pub delay: Option<DelayConfig>,
    #[serde(default)]
    pub duck: Option<DuckConfig>,
    #[serde(default)]
    pub master: Option<MasterConfig>,
}

/// The closed set of voices, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceId {
    Bass,
    Pad,
    Arp,
    Lead,
    Kick,
    Snare,
    Hat,
    Riser,
}

impl VoiceId {
    pub const ALL: [VoiceId; 8] = [
        VoiceId::Bass,
        VoiceId::Pad,
        VoiceId::Arp,
        VoiceId::Lead,
        VoiceId::Kick,
        VoiceId::Snare,
        VoiceId::Hat,
        VoiceId::Riser,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VoiceId::Bass => "bass",
            VoiceId::Pad => "pad",
            VoiceId::Arp => "arp",
            VoiceId::Lead => "lead",
            VoiceId::Kick => "kick",
            VoiceId::Snare => "snare",
            VoiceId::Hat => "hat",
            VoiceId::Riser => "riser",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|voice| voice.name() == name)
    }

    /// Position in declaration order.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
