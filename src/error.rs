//! Error types for recipe resolution, settings loading and graph building
//!
//! Every error the engine can report is raised before the transport starts.
//! Once a recipe has been resolved the scheduler runs without error paths.

use thiserror::Error;

/// A recipe could not be turned into a runnable configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no recipe supplied")]
    MissingRecipe,
    #[error("recipe has no `global` block")]
    MissingGlobal,
    #[error("recipe has no `sections`")]
    MissingSections,
    #[error("recipe has no `progression`")]
    MissingProgression,
    #[error("recipe `sections` is empty")]
    EmptySections,
    #[error("recipe `progression` is empty")]
    EmptyProgression,
    #[error("unknown roman numeral `{numeral}` in progression")]
    UnknownRomanNumeral { numeral: String },
    #[error("unknown key `{0}`")]
    UnknownKey(String),
    #[error("unknown scale `{0}`")]
    UnknownScale(String),
    #[error("unknown recipe type `{0}`")]
    UnknownFlavor(String),
    #[error("voice `{voice}` uses unknown pattern `{name}`")]
    UnknownPattern { voice: String, name: String },
    #[error("voice `{voice}` uses unknown subdivision `{value}`")]
    UnknownSubdivision { voice: String, value: String },
    #[error("tempo must be a positive number of beats per minute, got {0}")]
    InvalidTempo(f64),
    #[error("section `{name}` is invalid: {reason}")]
    InvalidSection { name: String, reason: String },
    #[error("recipe could not be decoded: {0}")]
    Parse(String),
    #[error("signal graph could not be built: {0}")]
    Graph(#[from] GraphError),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Routing problems detected while wiring the signal graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("signal graph contains a cycle")]
    Cycle,
    #[error("connection references unknown node `{0}`")]
    UnknownNode(String),
    #[error("node `{0}` was added twice")]
    DuplicateNode(String),
}

/// The audio host refused an operation while the graph was being built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host could not create node `{node}`: {reason}")]
    NodeCreation { node: String, reason: String },
    #[error("host could not connect `{from}` to `{to}`")]
    Connection { from: String, to: String },
}

/// Why `Engine::init` failed. Either way no host nodes are left behind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl From<GraphError> for EngineError {
    fn from(err: GraphError) -> Self {
        EngineError::Config(ConfigError::Graph(err))
    }
}

/// Engine settings file could not be read.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
