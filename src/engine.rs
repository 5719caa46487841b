//! Engine lifecycle
//!
//! [`Engine`] owns the host and everything built from one recipe. The state
//! is explicit and owned by the caller:
//!
//! ```text
//! Uninitialized --init--> Running --cleanup--> Disposed --init--> Running
//! ```
//!
//! `init` while running is a logged no-op. `cleanup` is safe in any state.

use crate::config::{resolve, Flavor};
use crate::error::{ConfigError, EngineError, SettingsError};
use crate::host::AudioHost;
use crate::recipe::{Recipe, VoiceId};
use crate::scheduler::{Scheduler, TaskId};
use crate::settings::EngineSettings;
use crate::signal_graph::NodeId;
use crate::topology::{plan, realize, Topology, VoiceNodes};
use crate::transport::TransportClock;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Running,
    Disposed,
}

/// Host-facing view of one voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceHandle {
    pub voice: VoiceId,
    pub nodes: VoiceNodes,
    pub task: TaskId,
}

/// Read-only snapshot of a running piece, for host bookkeeping such as
/// meters. The engine never needs it back.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineHandle {
    /// Increments on every successful init
    pub generation: u64,
    pub flavor: Flavor,
    pub bpm: f64,
    pub total_bars: u64,
    pub voices: Vec<VoiceHandle>,
    pub buses: Vec<NodeId>,
}

impl EngineHandle {
    pub fn voice(&self, id: VoiceId) -> Option<&VoiceHandle> {
        self.voices.iter().find(|handle| handle.voice == id)
    }
}

/// Everything that exists only while running
struct Session {
    topology: Topology,
    built: Vec<NodeId>,
    scheduler: Scheduler,
    handle: EngineHandle,
}

pub struct Engine<H: AudioHost> {
    host: H,
    settings: EngineSettings,
    state: EngineState,
    generation: u64,
    session: Option<Session>,
}

impl<H: AudioHost> Engine<H> {
    pub fn new(host: H) -> Self {
        Self::build(host, EngineSettings::default())
    }

    /// An engine with custom runtime settings. Fails if the settings are
    /// out of range.
    pub fn with_settings(host: H, settings: EngineSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self::build(host, settings))
    }

    fn build(host: H, settings: EngineSettings) -> Self {
        Self {
            host,
            settings,
            state: EngineState::Uninitialized,
            generation: 0,
            session: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn handle(&self) -> Option<&EngineHandle> {
        self.session.as_ref().map(|s| &s.handle)
    }

    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.session.as_ref().map(|s| &s.scheduler)
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.session.as_ref().map(|s| &s.topology)
    }

    /// Resolve the recipe, build the graph on the host and start the
    /// transport.
    ///
    /// All validation happens before the first host call. If the host
    /// rejects part of the graph, whatever was created is disposed again
    /// and the engine stays in its previous state.
    pub fn init(&mut self, recipe: Option<&Recipe>) -> Result<EngineHandle, EngineError> {
        if let Some(session) = &self.session {
            warn!(
                "init called while already running (generation {}); ignoring",
                session.handle.generation
            );
            return Ok(session.handle.clone());
        }

        let recipe = recipe.ok_or(ConfigError::MissingRecipe)?;
        let config = resolve(recipe, &self.settings)?;
        let clock = TransportClock::new(&self.settings, config.bpm);
        let topology = plan(&config, &clock)?;
        let built = realize(&topology.graph, &mut self.host)?;

        let mut scheduler = Scheduler::new(config, &self.settings);
        let start = self.host.current_time();
        scheduler.start(&mut self.host, start);

        self.generation += 1;
        let handle = EngineHandle {
            generation: self.generation,
            flavor: scheduler.config().flavor,
            bpm: scheduler.config().bpm,
            total_bars: scheduler.config().timeline.total_bars(),
            voices: topology
                .voices
                .iter()
                .filter_map(|nodes| {
                    scheduler.task(nodes.voice).map(|task| VoiceHandle {
                        voice: nodes.voice,
                        nodes: nodes.clone(),
                        task: task.id(),
                    })
                })
                .collect(),
            buses: topology.buses.clone(),
        };

        info!(
            "Engine running: {:?} at {} bpm, {} voices, {} nodes, {} bars (generation {})",
            handle.flavor,
            handle.bpm,
            handle.voices.len(),
            built.len(),
            handle.total_bars,
            handle.generation
        );

        self.session = Some(Session {
            topology,
            built,
            scheduler,
            handle: handle.clone(),
        });
        self.state = EngineState::Running;
        Ok(handle)
    }

    /// Stop the transport, cancel every queued event and parameter ramp,
    /// then dispose each created node exactly once. Safe to call in any
    /// state and any number of times.
    pub fn cleanup(&mut self) {
        let Some(mut session) = self.session.take() else {
            debug!("cleanup with nothing running ({:?})", self.state);
            return;
        };

        session.scheduler.stop(&mut self.host);

        let order = session
            .topology
            .graph
            .dispose_order()
            .unwrap_or_else(|_| session.built.iter().rev().cloned().collect());
        let mut remaining: HashSet<NodeId> = session.built.iter().cloned().collect();
        for id in order {
            if remaining.remove(&id) {
                self.host.dispose_node(&id);
            }
        }

        info!(
            "Engine disposed {} nodes (generation {})",
            session.built.len(),
            session.handle.generation
        );
        self.state = EngineState::Disposed;
    }

    /// Process scheduled events up to `tick`. Does nothing unless running.
    pub fn advance_to_tick(&mut self, tick: u64) -> usize {
        match &mut self.session {
            Some(session) => session.scheduler.advance_to_tick(&mut self.host, tick),
            None => 0,
        }
    }

    /// Realtime entry point: schedule up to the host's current time plus
    /// the configured lookahead.
    pub fn pump(&mut self) -> usize {
        let now = self.host.current_time();
        match &mut self.session {
            Some(session) => session.scheduler.pump(&mut self.host, now),
            None => 0,
        }
    }

    pub fn run_bars(&mut self, bars: u64) -> usize {
        match &mut self.session {
            Some(session) => session.scheduler.run_bars(&mut self.host, bars),
            None => 0,
        }
    }
}

impl<H: AudioHost> Drop for Engine<H> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
