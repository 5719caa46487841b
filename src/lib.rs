//! # Tonegraph - Recipe-Driven Procedural Music
//!
//! Tonegraph turns a declarative JSON recipe into a playing piece of music:
//! a routed graph of synth voices and effect buses, plus a tick-accurate
//! scheduler that decides every note, chord and parameter ramp.
//!
//! Sound itself is produced by an [`AudioHost`]. The engine only plans and
//! schedules; a host implementation turns node specs into real oscillators
//! and filters. [`RecordingHost`] is a complete in-memory host that records
//! every call, which is what the tests run against.
//!
//! ## Pipeline
//!
//! ```text
//! Recipe (JSON) --resolve--> ResolvedConfig --plan--> Topology
//!                                 |                      |
//!                                 v                   realize
//!                             Scheduler ----------> AudioHost
//! ```
//!
//! - [`recipe`]: serde model of the JSON recipe
//! - [`config`]: validation and defaulting into a [`ResolvedConfig`]
//! - [`harmony`], [`euclid`], [`timeline`]: chords, step patterns, sections
//! - [`topology`]: per-flavor routing on a [`SignalGraph`]
//! - [`scheduler`]: lookahead scheduler over a priority event queue
//! - [`automation`]: section automation and sidechain ducking
//! - [`engine`]: init/cleanup lifecycle tying it together
//!
//! ## Quick Start
//!
//! ```rust
//! use tonegraph::{Engine, Recipe, RecordingHost, VoiceId};
//!
//! let recipe = Recipe::from_json_str(r#"{
//!     "global": {"bpm": 120, "key": "A"},
//!     "progression": ["i", "VI", "III", "VII"],
//!     "sections": [{"name": "intro", "bars": 4}],
//!     "instruments": {"bass": {"octave": -1}, "kick": {"steps": 4}}
//! }"#).unwrap();
//!
//! let mut engine = Engine::new(RecordingHost::new());
//! engine.init(Some(&recipe)).unwrap();
//! engine.run_bars(4);
//!
//! let kicks = engine.scheduler().unwrap().task(VoiceId::Kick).unwrap().fired();
//! assert_eq!(kicks, 16);
//!
//! engine.cleanup();
//! assert_eq!(engine.host().live_count(), 0);
//! ```

pub mod automation;
pub mod config;
pub mod dependency_graph;
pub mod engine;
pub mod error;
pub mod euclid;
pub mod harmony;
pub mod host;
pub mod recipe;
pub mod scheduler;
pub mod settings;
pub mod signal_graph;
pub mod timeline;
pub mod topology;
pub mod transport;

pub use config::{resolve, Flavor, ResolvedConfig};
pub use engine::{Engine, EngineHandle, EngineState};
pub use error::{ConfigError, EngineError, GraphError, HostError, SettingsError};
pub use host::{AudioHost, RecordingHost};
pub use recipe::{Recipe, VoiceId};
pub use settings::EngineSettings;
pub use signal_graph::SignalGraph;
