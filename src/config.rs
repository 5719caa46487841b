//! Config resolver
//!
//! The single place where recipe defaults are applied. `resolve` takes the
//! raw [`Recipe`] and produces a [`ResolvedConfig`] in which every field has
//! a concrete value, every subdivision is a tick count, and every pattern is
//! already a list of playable steps. Nothing downstream re-defaults anything.
//!
//! Default values per voice:
//!
//! | voice | wave     | step | octave | pattern        | cutoff |
//! |-------|----------|------|--------|----------------|--------|
//! | bass  | sawtooth | 8n   | -1     | groove         | 800    |
//! | pad   | sawtooth | 1m   | 0      | single chord   | 2000   |
//! | arp   | square   | 16n  | 1      | arp_up         | 3000   |
//! | lead  | triangle | 8n   | 1      | arp_up_down    | 4000   |
//! | kick  | sine     | 4n   | -      | euclid 4/4     | 200    |
//! | snare | noise    | 4n   | -      | backbeat       | 5000   |
//! | hat   | noise    | 8n   | -      | offbeats       | 8000   |
//! | riser | noise    | 1m   | -      | one per bar    | 500    |

use crate::error::ConfigError;
use crate::euclid::{apply_velocities, generate_pattern, PatternKind, PlayableStep, Step};
use crate::harmony::{key_offset, scale_intervals, ChordTable, MidiNote};
use crate::recipe::{
    EnvelopeConfig, FilterKind, PatternSpec, Recipe, SectionOverride, SectionSpec, VoiceConfig,
    VoiceId, Wave,
};
use crate::settings::EngineSettings;
use crate::timeline::{SectionGate, SectionTimeline};
use std::collections::{HashMap, HashSet};
use tracing::warn;

pub const DEFAULT_BPM: f64 = 100.0;
pub const DEFAULT_KEY: &str = "C";
pub const DEFAULT_SCALE: &str = "minor";
pub const DEFAULT_VELOCITY: f64 = 0.8;
pub const DEFAULT_REST_PROBABILITY: f64 = 0.3;

/// Engine flavor, selected by the recipe's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Full band with drums and sidechain ducking
    Synthwave,
    /// Pads, arps and swells, no drums
    Ambient,
    /// Bass and pad drone
    Hum,
    /// Dry sine tones
    Dtmf,
}

impl Flavor {
    /// A missing type means synthwave; an unknown one is an error.
    pub fn from_name(name: Option<&str>) -> Result<Self, ConfigError> {
        match name.map(|n| n.trim().to_lowercase()) {
            None => Ok(Flavor::Synthwave),
            Some(n) => match n.as_str() {
                "synthwave" => Ok(Flavor::Synthwave),
                "ambient" => Ok(Flavor::Ambient),
                "hum" => Ok(Flavor::Hum),
                "dtmf" => Ok(Flavor::Dtmf),
                _ => Err(ConfigError::UnknownFlavor(n)),
            },
        }
    }

    /// Voices this flavor can play, in declaration order.
    pub fn roster(self) -> &'static [VoiceId] {
        match self {
            Flavor::Synthwave => &VoiceId::ALL,
            Flavor::Ambient => &[VoiceId::Pad, VoiceId::Arp, VoiceId::Lead, VoiceId::Riser],
            Flavor::Hum => &[VoiceId::Bass, VoiceId::Pad],
            Flavor::Dtmf => &[VoiceId::Lead],
        }
    }

    pub fn has_reverb(self) -> bool {
        !matches!(self, Flavor::Dtmf)
    }

    pub fn has_chorus(self) -> bool {
        matches!(self, Flavor::Synthwave | Flavor::Ambient)
    }

    pub fn has_delay(self) -> bool {
        matches!(self, Flavor::Synthwave | Flavor::Ambient)
    }
}

/// How a voice turns a pattern index into pitches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceRole {
    /// Single chord tone per step
    Melodic,
    /// Whole triad per step
    Chordal,
    /// Fixed pitch, onsets only
    Percussive { pitch: MidiNote },
}

impl VoiceRole {
    pub fn for_voice(voice: VoiceId) -> Self {
        match voice {
            VoiceId::Bass | VoiceId::Arp | VoiceId::Lead => VoiceRole::Melodic,
            VoiceId::Pad => VoiceRole::Chordal,
            VoiceId::Kick => VoiceRole::Percussive { pitch: 36 },
            VoiceId::Snare => VoiceRole::Percussive { pitch: 38 },
            VoiceId::Hat => VoiceRole::Percussive { pitch: 42 },
            VoiceId::Riser => VoiceRole::Percussive { pitch: 60 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for Adsr {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.2,
        }
    }
}

impl Adsr {
    fn resolve(raw: Option<&EnvelopeConfig>, fallback: Adsr) -> Self {
        let Some(raw) = raw else {
            return fallback;
        };
        Self {
            attack: raw.attack.unwrap_or(fallback.attack).max(0.001),
            decay: raw.decay.unwrap_or(fallback.decay).max(0.001),
            sustain: raw.sustain.unwrap_or(fallback.sustain).clamp(0.0, 1.0),
            release: raw.release.unwrap_or(fallback.release).max(0.001),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterEnvelope {
    pub shape: Adsr,
    pub octaves: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedFilter {
    pub kind: FilterKind,
    pub cutoff: f64,
    pub q: f64,
    /// Present only when the recipe asks for one
    pub envelope: Option<FilterEnvelope>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSweep {
    pub start_hz: f64,
    pub end_hz: f64,
    pub bars: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOverride {
    pub enabled: Option<bool>,
    pub cutoff: Option<f64>,
    pub sweep: Option<ResolvedSweep>,
    pub volume_db: Option<f64>,
}

impl ResolvedOverride {
    pub fn has_automation(&self) -> bool {
        self.cutoff.is_some() || self.sweep.is_some() || self.volume_db.is_some()
    }
}

/// What drives a voice's notes.
#[derive(Debug, Clone, PartialEq)]
pub enum Playback {
    /// Step pattern transposed against the current chord
    Pattern {
        steps: Vec<PlayableStep>,
        interval_ticks: u64,
    },
    /// Literal MIDI notes played inside a beat window
    Melody {
        notes: Vec<Option<MidiNote>>,
        velocities: Vec<f64>,
        interval_ticks: u64,
        start_beat: u64,
        stop_beat: Option<u64>,
    },
}

impl Playback {
    pub fn interval_ticks(&self) -> u64 {
        match self {
            Playback::Pattern { interval_ticks, .. } | Playback::Melody { interval_ticks, .. } => {
                *interval_ticks
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVoice {
    pub id: VoiceId,
    /// False when the recipe gave this voice nothing but section overrides
    pub configured: bool,
    pub role: VoiceRole,
    pub wave: Wave,
    pub filter: ResolvedFilter,
    pub envelope: Adsr,
    pub playback: Playback,
    pub duration_ticks: u64,
    pub octave: i32,
    pub base_volume_db: f64,
    pub overrides: HashMap<String, ResolvedOverride>,
}

impl SectionGate for ResolvedVoice {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn enabled_override(&self, section: &str) -> Option<bool> {
        self.overrides.get(section).and_then(|o| o.enabled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReverbSettings {
    pub decay: f64,
    pub wet: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChorusSettings {
    pub frequency: f64,
    pub depth: f64,
    pub wet: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelaySettings {
    pub time_ticks: u64,
    pub feedback: f64,
    pub wet: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuckSettings {
    pub attack_secs: f64,
    pub release_secs: f64,
    pub depth: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBuses {
    pub reverb: Option<ReverbSettings>,
    pub chorus: Option<ChorusSettings>,
    pub delay: Option<DelaySettings>,
    pub duck: DuckSettings,
    pub master_volume_db: f64,
}

/// A recipe with every default applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub flavor: Flavor,
    pub bpm: f64,
    pub key: String,
    pub scale: String,
    pub seed: u64,
    pub progression: Vec<String>,
    pub chords: ChordTable,
    pub timeline: SectionTimeline,
    /// Voices present in the recipe and the flavor, in declaration order
    pub voices: Vec<ResolvedVoice>,
    pub buses: ResolvedBuses,
}

impl ResolvedConfig {
    pub fn voice(&self, id: VoiceId) -> Option<&ResolvedVoice> {
        self.voices.iter().find(|voice| voice.id == id)
    }
}

/// Per-voice fallbacks used when the recipe is silent.
struct VoiceDefaults {
    wave: Wave,
    subdivision: &'static str,
    octave: i32,
    cutoff: f64,
    steps: usize,
    envelope: Adsr,
}

fn voice_defaults(voice: VoiceId, flavor: Flavor) -> VoiceDefaults {
    let base = Adsr::default();
    let mut defaults = match voice {
        VoiceId::Bass => VoiceDefaults {
            wave: Wave::Sawtooth,
            subdivision: "8n",
            octave: -1,
            cutoff: 800.0,
            steps: 8,
            envelope: base,
        },
        VoiceId::Pad => VoiceDefaults {
            wave: Wave::Sawtooth,
            subdivision: "1m",
            octave: 0,
            cutoff: 2000.0,
            steps: 1,
            envelope: Adsr {
                attack: 0.5,
                decay: 0.5,
                sustain: 0.8,
                release: 1.5,
            },
        },
        VoiceId::Arp => VoiceDefaults {
            wave: Wave::Square,
            subdivision: "16n",
            octave: 1,
            cutoff: 3000.0,
            steps: 16,
            envelope: base,
        },
        VoiceId::Lead => VoiceDefaults {
            wave: Wave::Triangle,
            subdivision: "8n",
            octave: 1,
            cutoff: 4000.0,
            steps: 8,
            envelope: base,
        },
        VoiceId::Kick => VoiceDefaults {
            wave: Wave::Sine,
            subdivision: "4n",
            octave: 0,
            cutoff: 200.0,
            steps: 4,
            envelope: Adsr {
                attack: 0.001,
                decay: 0.3,
                sustain: 0.0,
                release: 0.1,
            },
        },
        VoiceId::Snare => VoiceDefaults {
            wave: Wave::Noise,
            subdivision: "4n",
            octave: 0,
            cutoff: 5000.0,
            steps: 4,
            envelope: Adsr {
                attack: 0.001,
                decay: 0.2,
                sustain: 0.0,
                release: 0.1,
            },
        },
        VoiceId::Hat => VoiceDefaults {
            wave: Wave::Noise,
            subdivision: "8n",
            octave: 0,
            cutoff: 8000.0,
            steps: 8,
            envelope: Adsr {
                attack: 0.001,
                decay: 0.05,
                sustain: 0.0,
                release: 0.05,
            },
        },
        VoiceId::Riser => VoiceDefaults {
            wave: Wave::Noise,
            subdivision: "1m",
            octave: 0,
            cutoff: 500.0,
            steps: 1,
            envelope: Adsr {
                attack: 1.0,
                decay: 0.5,
                sustain: 0.5,
                release: 0.5,
            },
        },
    };
    if flavor == Flavor::Dtmf {
        defaults.wave = Wave::Sine;
    }
    defaults
}

/// Default pattern per voice when the recipe names none.
fn default_pattern(voice: VoiceId, steps: usize) -> (PatternKind, Option<Vec<Step>>) {
    match voice {
        VoiceId::Bass => (PatternKind::Groove, None),
        VoiceId::Arp => (PatternKind::ArpUp, None),
        VoiceId::Lead => (PatternKind::ArpUpDown, None),
        VoiceId::Kick => (
            PatternKind::Euclid {
                pulses: steps,
                rotation: 0,
            },
            None,
        ),
        VoiceId::Snare => {
            let backbeat = (0..steps)
                .map(|i| if i % 2 == 1 { Step::Note(0) } else { Step::Rest })
                .collect();
            (PatternKind::Groove, Some(backbeat))
        }
        VoiceId::Hat => {
            let offbeats = (0..steps)
                .map(|i| if i % 2 == 1 { Step::Note(0) } else { Step::Rest })
                .collect();
            (PatternKind::Groove, Some(offbeats))
        }
        VoiceId::Pad | VoiceId::Riser => (PatternKind::Groove, Some(vec![Step::Note(0); steps.max(1)])),
    }
}

/// Resolve a recipe against the engine settings.
pub fn resolve(recipe: &Recipe, settings: &EngineSettings) -> Result<ResolvedConfig, ConfigError> {
    let global = recipe.global.as_ref().ok_or(ConfigError::MissingGlobal)?;
    let sections = recipe.sections.as_ref().ok_or(ConfigError::MissingSections)?;
    let progression = recipe
        .progression
        .as_ref()
        .ok_or(ConfigError::MissingProgression)?;

    let flavor = Flavor::from_name(recipe.kind.as_deref())?;

    let bpm = global.bpm.unwrap_or(DEFAULT_BPM);
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(ConfigError::InvalidTempo(bpm));
    }

    let key = global.key.clone().unwrap_or_else(|| DEFAULT_KEY.to_string());
    let offset = key_offset(&key).ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
    let scale = global
        .scale
        .clone()
        .unwrap_or_else(|| DEFAULT_SCALE.to_string());
    let intervals = scale_intervals(&scale).ok_or_else(|| ConfigError::UnknownScale(scale.clone()))?;
    let seed = global.seed.unwrap_or(0);

    validate_sections(sections)?;
    let timeline = SectionTimeline::build(sections);
    let chords = ChordTable::build(settings.base_midi + offset, intervals, progression)?;

    let roster = flavor.roster();
    for name in recipe.instruments.keys() {
        match VoiceId::from_name(name) {
            None => warn!("Ignoring unknown instrument '{}'", name),
            Some(id) if !roster.contains(&id) => {
                warn!("Instrument '{}' is not part of the {:?} flavor; skipping", name, flavor)
            }
            Some(_) => {}
        }
    }

    let voices = roster
        .iter()
        .filter_map(|&id| recipe.instruments.get(id.name()).map(|raw| (id, raw)))
        .map(|(id, raw)| resolve_voice(id, raw, flavor, seed, &timeline, settings))
        .collect::<Result<Vec<_>, _>>()?;

    let buses = resolve_buses(recipe, flavor, settings)?;

    Ok(ResolvedConfig {
        flavor,
        bpm,
        key,
        scale,
        seed,
        progression: progression.clone(),
        chords,
        timeline,
        voices,
        buses,
    })
}

fn validate_sections(sections: &[SectionSpec]) -> Result<(), ConfigError> {
    if sections.is_empty() {
        return Err(ConfigError::EmptySections);
    }
    let mut seen = HashSet::new();
    for section in sections {
        if section.bars == 0 {
            return Err(ConfigError::InvalidSection {
                name: section.name.clone(),
                reason: "has zero bars".to_string(),
            });
        }
        if !seen.insert(section.name.as_str()) {
            return Err(ConfigError::InvalidSection {
                name: section.name.clone(),
                reason: "appears more than once".to_string(),
            });
        }
    }
    Ok(())
}

fn ticks_for(
    voice: VoiceId,
    notation: &str,
    settings: &EngineSettings,
) -> Result<u64, ConfigError> {
    crate::transport::subdivision_ticks(notation, settings.ppq, settings.beats_per_bar).ok_or_else(
        || ConfigError::UnknownSubdivision {
            voice: voice.name().to_string(),
            value: notation.to_string(),
        },
    )
}

fn resolve_voice(
    id: VoiceId,
    raw: &VoiceConfig,
    flavor: Flavor,
    seed: u64,
    timeline: &SectionTimeline,
    settings: &EngineSettings,
) -> Result<ResolvedVoice, ConfigError> {
    let defaults = voice_defaults(id, flavor);

    let filter = match &raw.filter {
        Some(f) => ResolvedFilter {
            kind: f.kind.unwrap_or(FilterKind::Lowpass),
            cutoff: f.cutoff.unwrap_or(defaults.cutoff),
            q: f.q.unwrap_or(1.0),
            envelope: f.envelope.as_ref().map(|env| FilterEnvelope {
                shape: Adsr::resolve(Some(&env.shape), Adsr::default()),
                octaves: env.octaves.unwrap_or(2.0),
            }),
        },
        None => ResolvedFilter {
            kind: FilterKind::Lowpass,
            cutoff: defaults.cutoff,
            q: 1.0,
            envelope: None,
        },
    };

    let velocities = raw
        .velocity
        .clone()
        .unwrap_or_else(|| vec![DEFAULT_VELOCITY]);

    let playback = match &raw.melody {
        Some(melody) => {
            let rhythm = raw.rhythm.as_deref().unwrap_or("8n");
            Playback::Melody {
                notes: melody
                    .iter()
                    .copied()
                    .map(|note| note.filter(|n| *n >= 0))
                    .collect(),
                velocities,
                interval_ticks: ticks_for(id, rhythm, settings)?,
                start_beat: raw.start_beat.unwrap_or(0) as u64,
                stop_beat: raw.stop_beat.map(u64::from),
            }
        }
        None => {
            let subdivision = raw.subdivision.as_deref().unwrap_or(defaults.subdivision);
            let interval_ticks = ticks_for(id, subdivision, settings)?;
            let steps = raw.steps.unwrap_or(defaults.steps).max(1);
            let rest_probability = raw
                .rest_probability
                .unwrap_or(DEFAULT_REST_PROBABILITY);

            let (kind, explicit) = match &raw.pattern {
                None => default_pattern(id, steps),
                Some(PatternSpec::Steps(values)) => {
                    let explicit = values
                        .iter()
                        .map(|v| v.map_or(Step::Rest, Step::from_raw))
                        .collect();
                    (PatternKind::Groove, Some(explicit))
                }
                Some(PatternSpec::Named(name)) => {
                    let kind = PatternKind::from_name(name, steps, rest_probability, voice_seed(seed, id))
                        .ok_or_else(|| ConfigError::UnknownPattern {
                            voice: id.name().to_string(),
                            name: name.clone(),
                        })?;
                    (kind, None)
                }
                Some(PatternSpec::Euclid { euclid }) => (
                    PatternKind::Euclid {
                        pulses: euclid.pulses,
                        rotation: euclid.rotation.unwrap_or(0),
                    },
                    None,
                ),
            };
            let pattern = generate_pattern(&kind, steps, explicit.as_deref());
            Playback::Pattern {
                steps: apply_velocities(&pattern, &velocities),
                interval_ticks,
            }
        }
    };

    let duration_ticks = match &raw.duration {
        Some(notation) => ticks_for(id, notation, settings)?,
        None => playback.interval_ticks(),
    };

    let mut overrides = HashMap::new();
    for (section, raw_override) in &raw.section_overrides {
        match timeline.get(section) {
            Some(range) => {
                overrides.insert(section.clone(), resolve_override(raw_override, range.bars()));
            }
            None => warn!(
                "Voice '{}' overrides unknown section '{}'; ignoring",
                id, section
            ),
        }
    }

    Ok(ResolvedVoice {
        id,
        configured: !raw.is_trivial(),
        role: VoiceRole::for_voice(id),
        wave: raw.wave.unwrap_or(defaults.wave),
        filter,
        envelope: Adsr::resolve(raw.envelope.as_ref(), defaults.envelope),
        playback,
        duration_ticks,
        octave: raw.octave.unwrap_or(defaults.octave),
        base_volume_db: raw.base_volume.unwrap_or(0.0),
        overrides,
    })
}

/// Per-voice seed so that two random voices never share a sequence.
fn voice_seed(seed: u64, voice: VoiceId) -> u64 {
    seed ^ (voice.index() as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn resolve_override(raw: &SectionOverride, section_bars: u64) -> ResolvedOverride {
    ResolvedOverride {
        enabled: raw.enabled,
        cutoff: raw.cutoff,
        sweep: raw.sweep.as_ref().map(|sweep| ResolvedSweep {
            start_hz: sweep.start_hz,
            end_hz: sweep.end_hz,
            bars: sweep.bars.unwrap_or(section_bars as u32).max(1),
        }),
        volume_db: raw.volume,
    }
}

fn resolve_buses(
    recipe: &Recipe,
    flavor: Flavor,
    settings: &EngineSettings,
) -> Result<ResolvedBuses, ConfigError> {
    let raw = &recipe.buses;

    let reverb = flavor.has_reverb().then(|| {
        let r = raw.reverb.clone().unwrap_or_default();
        ReverbSettings {
            decay: r.decay.unwrap_or(4.0),
            wet: r.wet.unwrap_or(0.35),
        }
    });

    let chorus_raw = raw.chorus.clone().unwrap_or_default();
    let chorus = (flavor.has_chorus() && chorus_raw.enabled.unwrap_or(true)).then(|| ChorusSettings {
        frequency: chorus_raw.frequency.unwrap_or(1.5),
        depth: chorus_raw.depth.unwrap_or(0.7),
        wet: chorus_raw.wet.unwrap_or(0.3),
    });

    let delay_raw = raw.delay.clone().unwrap_or_default();
    let delay = if flavor.has_delay() && delay_raw.enabled.unwrap_or(true) {
        let time = delay_raw.time.as_deref().unwrap_or("8n.");
        let time_ticks = crate::transport::subdivision_ticks(time, settings.ppq, settings.beats_per_bar)
            .ok_or_else(|| ConfigError::UnknownSubdivision {
                voice: "delay".to_string(),
                value: time.to_string(),
            })?;
        Some(DelaySettings {
            time_ticks,
            feedback: delay_raw.feedback.unwrap_or(0.35),
            wet: delay_raw.wet.unwrap_or(0.25),
        })
    } else {
        None
    };

    let duck_raw = raw.duck.clone().unwrap_or_default();
    let duck = DuckSettings {
        attack_secs: duck_raw.attack.unwrap_or(settings.duck_attack_secs),
        release_secs: duck_raw.release.unwrap_or(settings.duck_release_secs),
        depth: duck_raw.depth.unwrap_or(settings.duck_depth).clamp(0.0, 1.0),
    };

    let master_volume_db = raw
        .master
        .as_ref()
        .and_then(|m| m.volume)
        .unwrap_or(-6.0);

    Ok(ResolvedBuses {
        reverb,
        chorus,
        delay,
        duck,
        master_volume_db,
    })
}
