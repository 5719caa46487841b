//! Signal graph builder
//!
//! Lays out the fixed routing for a resolved piece and then realises it on
//! the audio host. Each flavor has its own builder; they share the bus and
//! voice-chain helpers and differ in which buses exist and where voices go.
//!
//! Every voice gets the same chain:
//!
//! ```text
//! <voice>.synth -> <voice>.filter -> <voice>.gain -> bus(es)
//!                       ^
//!            <voice>.filter_env (optional)
//! ```

use crate::config::{Flavor, ResolvedConfig, ResolvedVoice};
use crate::error::{EngineError, GraphError};
use crate::host::AudioHost;
use crate::recipe::VoiceId;
use crate::signal_graph::{NodeId, NodeSpec, SignalGraph};
use crate::transport::TransportClock;
use tracing::{debug, warn};

pub const MASTER: &str = "master";
pub const REVERB: &str = "reverb";
pub const CHORUS: &str = "chorus";
pub const DELAY: &str = "delay";
pub const DUCK: &str = "duck";

/// Host node ids belonging to one voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceNodes {
    pub voice: VoiceId,
    pub synth: NodeId,
    pub filter: NodeId,
    pub filter_env: Option<NodeId>,
    pub gain: NodeId,
}

impl VoiceNodes {
    fn new(voice: VoiceId, with_envelope: bool) -> Self {
        Self {
            voice,
            synth: NodeId::voice(voice, "synth"),
            filter: NodeId::voice(voice, "filter"),
            filter_env: with_envelope.then(|| NodeId::voice(voice, "filter_env")),
            gain: NodeId::voice(voice, "gain"),
        }
    }
}

/// The planned graph plus where each voice and bus lives in it
#[derive(Debug, Clone)]
pub struct Topology {
    pub graph: SignalGraph,
    /// Declaration order
    pub voices: Vec<VoiceNodes>,
    pub buses: Vec<NodeId>,
}

impl Topology {
    pub fn voice(&self, id: VoiceId) -> Option<&VoiceNodes> {
        self.voices.iter().find(|nodes| nodes.voice == id)
    }

    pub fn has_bus(&self, name: &str) -> bool {
        self.buses.iter().any(|bus| bus.as_str() == name)
    }
}

/// Plan the graph for a resolved piece. Fails only if the routing is
/// inconsistent, which the fixed layout never is.
pub fn plan(config: &ResolvedConfig, clock: &TransportClock) -> Result<Topology, GraphError> {
    let mut builder = Builder {
        config,
        clock,
        graph: SignalGraph::new(),
        voices: Vec::new(),
        buses: Vec::new(),
    };

    match config.flavor {
        Flavor::Synthwave => builder.synthwave()?,
        Flavor::Ambient => builder.ambient()?,
        Flavor::Hum => builder.hum()?,
        Flavor::Dtmf => builder.dtmf()?,
    }

    // rejects cycles before anything reaches the host
    builder.graph.build_order()?;
    debug!(
        "Planned {:?} graph: {} nodes, {} connections",
        config.flavor,
        builder.graph.node_count(),
        builder.graph.connections().len()
    );

    Ok(Topology {
        graph: builder.graph,
        voices: builder.voices,
        buses: builder.buses,
    })
}

struct Builder<'a> {
    config: &'a ResolvedConfig,
    clock: &'a TransportClock,
    graph: SignalGraph,
    voices: Vec<VoiceNodes>,
    buses: Vec<NodeId>,
}

impl<'a> Builder<'a> {
    /// Full band: every bus, drums into master, tonal voices through the
    /// duck bus.
    fn synthwave(&mut self) -> Result<(), GraphError> {
        self.shared_buses()?;
        self.effect_sends()?;
        self.add_voices(Self::band_routes)
    }

    /// Same buses as synthwave; the roster has no drums so the duck bus
    /// never moves.
    fn ambient(&mut self) -> Result<(), GraphError> {
        self.shared_buses()?;
        self.effect_sends()?;
        self.add_voices(Self::band_routes)
    }

    fn hum(&mut self) -> Result<(), GraphError> {
        self.shared_buses()?;
        self.add_voices(Self::band_routes)
    }

    /// Dry tones straight to the master.
    fn dtmf(&mut self) -> Result<(), GraphError> {
        self.shared_buses()?;
        self.add_voices(|_, _| vec![NodeId::new(MASTER)])
    }

    fn add_bus(&mut self, name: &str, spec: NodeSpec) -> Result<NodeId, GraphError> {
        let id = self.graph.add_node(NodeId::new(name), spec)?;
        self.buses.push(id.clone());
        Ok(id)
    }

    /// Master, duck and (outside dtmf) reverb.
    fn shared_buses(&mut self) -> Result<(), GraphError> {
        let config = self.config;
        let buses = &config.buses;
        let master = self.add_bus(
            MASTER,
            NodeSpec::Master {
                volume_db: buses.master_volume_db,
            },
        )?;
        let duck = self.add_bus(
            DUCK,
            NodeSpec::Duck {
                depth: buses.duck.depth,
            },
        )?;
        self.graph.connect(&duck, &master)?;

        if let Some(reverb) = buses.reverb.clone() {
            let reverb = self.add_bus(REVERB, NodeSpec::Reverb(reverb))?;
            self.graph.connect(&reverb, &master)?;
        }
        Ok(())
    }

    /// Chorus and delay, each feeding the reverb when enabled.
    fn effect_sends(&mut self) -> Result<(), GraphError> {
        let config = self.config;
        let chorus = config.buses.chorus.clone();
        let delay = config.buses.delay.clone();
        let send = self.reverb_or_master();

        if let Some(chorus) = chorus {
            let chorus = self.add_bus(CHORUS, NodeSpec::Chorus(chorus))?;
            self.graph.connect(&chorus, &send)?;
        }
        if let Some(delay) = delay {
            let spec = NodeSpec::Delay {
                time_secs: self.clock.ticks_to_seconds(delay.time_ticks),
                feedback: delay.feedback,
                wet: delay.wet,
            };
            let delay = self.add_bus(DELAY, spec)?;
            self.graph.connect(&delay, &send)?;
        }
        Ok(())
    }

    fn bus_or(&self, name: &str, fallback: NodeId) -> NodeId {
        let id = NodeId::new(name);
        if self.graph.contains(&id) {
            id
        } else {
            fallback
        }
    }

    fn reverb_or_master(&self) -> NodeId {
        self.bus_or(REVERB, NodeId::new(MASTER))
    }

    /// Destinations for a voice's gain stage in the band flavors.
    fn band_routes(&self, voice: VoiceId) -> Vec<NodeId> {
        let master = NodeId::new(MASTER);
        let duck = NodeId::new(DUCK);
        let reverb = self.reverb_or_master();

        let mut routes = match voice {
            VoiceId::Bass => vec![duck],
            VoiceId::Pad => vec![self.bus_or(CHORUS, reverb), duck],
            VoiceId::Arp => vec![self.bus_or(DELAY, duck.clone()), duck],
            VoiceId::Lead => vec![reverb, master],
            VoiceId::Kick | VoiceId::Hat => vec![master],
            VoiceId::Snare => vec![reverb, master],
            VoiceId::Riser => vec![reverb],
        };
        routes.dedup();
        routes
    }

    fn add_voices<F>(&mut self, routes: F) -> Result<(), GraphError>
    where
        F: Fn(&Self, VoiceId) -> Vec<NodeId>,
    {
        let config = self.config;
        for voice in &config.voices {
            let nodes = self.add_chain(voice)?;
            for destination in routes(self, voice.id) {
                self.graph.connect(&nodes.gain, &destination)?;
            }
            self.voices.push(nodes);
        }
        Ok(())
    }

    fn add_chain(&mut self, voice: &ResolvedVoice) -> Result<VoiceNodes, GraphError> {
        let nodes = VoiceNodes::new(voice.id, voice.filter.envelope.is_some());

        self.graph.add_node(
            nodes.gain.clone(),
            NodeSpec::Gain {
                volume_db: voice.base_volume_db,
            },
        )?;
        self.graph.add_node(
            nodes.filter.clone(),
            NodeSpec::Filter {
                kind: voice.filter.kind,
                cutoff: voice.filter.cutoff,
                q: voice.filter.q,
            },
        )?;
        self.graph.add_node(
            nodes.synth.clone(),
            NodeSpec::Synth {
                voice: voice.id,
                wave: voice.wave,
                envelope: voice.envelope,
            },
        )?;
        self.graph.connect(&nodes.synth, &nodes.filter)?;
        self.graph.connect(&nodes.filter, &nodes.gain)?;

        if let (Some(env_id), Some(env)) = (&nodes.filter_env, voice.filter.envelope) {
            self.graph.add_node(
                env_id.clone(),
                NodeSpec::FilterEnvelope {
                    base_cutoff: voice.filter.cutoff,
                    octaves: env.octaves,
                    shape: env.shape,
                },
            )?;
            self.graph.modulate(env_id, &nodes.filter)?;
        }
        Ok(nodes)
    }
}

/// Create and wire every planned node on the host.
///
/// Nodes are created destinations first, and each node is connected to its
/// destinations right after it is created. If the host refuses anything,
/// the nodes already created are disposed (sources first) and the error is
/// returned; the host is left with nothing from this graph.
pub fn realize<H: AudioHost + ?Sized>(
    graph: &SignalGraph,
    host: &mut H,
) -> Result<Vec<NodeId>, EngineError> {
    let order = graph.build_order()?;
    let mut built: Vec<NodeId> = Vec::with_capacity(order.len());

    for id in order {
        let Some(spec) = graph.node(&id) else {
            continue;
        };
        let result = host.create_node(&id, spec).and_then(|()| {
            built.push(id.clone());
            graph
                .connections()
                .iter()
                .filter(|c| c.from == id)
                .try_for_each(|c| host.connect(&c.from, &c.to))
        });

        if let Err(err) = result {
            warn!("Host rejected graph at node '{}': {}", id, err);
            for created in built.iter().rev() {
                host.dispose_node(created);
            }
            return Err(err.into());
        }
    }

    debug!("Realised {} host nodes", built.len());
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve;
    use crate::host::{HostCall, RecordingHost};
    use crate::recipe::Recipe;
    use crate::settings::EngineSettings;

    fn config(kind: &str, instruments: &str) -> ResolvedConfig {
        let json = format!(
            r#"{{
                "type": "{}",
                "global": {{"bpm": 120}},
                "progression": ["i"],
                "sections": [{{"name": "a", "bars": 4}}],
                "instruments": {}
            }}"#,
            kind, instruments
        );
        let recipe = Recipe::from_json_str(&json).unwrap();
        resolve(&recipe, &EngineSettings::default()).unwrap()
    }

    fn all_voices() -> &'static str {
        r#"{"bass": {}, "pad": {}, "arp": {}, "lead": {}, "kick": {}, "snare": {}, "hat": {}, "riser": {}}"#
    }

    fn topology(config: &ResolvedConfig) -> Topology {
        let clock = TransportClock::new(&EngineSettings::default(), config.bpm);
        plan(config, &clock).unwrap()
    }

    fn targets(topology: &Topology, from: &str) -> Vec<String> {
        let mut out: Vec<String> = topology
            .graph
            .outputs_of(&NodeId::new(from))
            .into_iter()
            .map(|n| n.0.clone())
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_synthwave_routing() {
        let topology = topology(&config("synthwave", all_voices()));
        assert_eq!(topology.voices.len(), 8);
        for bus in [MASTER, DUCK, REVERB, CHORUS, DELAY] {
            assert!(topology.has_bus(bus), "missing {}", bus);
        }

        assert_eq!(targets(&topology, "bass.gain"), vec!["duck"]);
        assert_eq!(targets(&topology, "pad.gain"), vec!["chorus", "duck"]);
        assert_eq!(targets(&topology, "arp.gain"), vec!["delay", "duck"]);
        assert_eq!(targets(&topology, "lead.gain"), vec!["master", "reverb"]);
        assert_eq!(targets(&topology, "kick.gain"), vec!["master"]);
        assert_eq!(targets(&topology, "snare.gain"), vec!["master", "reverb"]);
        assert_eq!(targets(&topology, "hat.gain"), vec!["master"]);
        assert_eq!(targets(&topology, "riser.gain"), vec!["reverb"]);
        assert_eq!(targets(&topology, "chorus"), vec!["reverb"]);
        assert_eq!(targets(&topology, "delay"), vec!["reverb"]);
        assert_eq!(targets(&topology, "reverb"), vec!["master"]);
        assert_eq!(targets(&topology, "duck"), vec!["master"]);
        assert_eq!(targets(&topology, "bass.synth"), vec!["bass.filter"]);
        assert_eq!(targets(&topology, "bass.filter"), vec!["bass.gain"]);
    }

    #[test]
    fn test_disabled_sends_fall_back() {
        let mut config = config("synthwave", all_voices());
        config.buses.chorus = None;
        config.buses.delay = None;
        let topology = topology(&config);
        assert!(!topology.has_bus(CHORUS));
        assert_eq!(targets(&topology, "pad.gain"), vec!["duck", "reverb"]);
        assert_eq!(targets(&topology, "arp.gain"), vec!["duck"]);
    }

    #[test]
    fn test_hum_and_dtmf_layouts() {
        let hum = topology(&config("hum", all_voices()));
        assert_eq!(hum.voices.len(), 2);
        assert!(!hum.has_bus(CHORUS));
        assert_eq!(targets(&hum, "pad.gain"), vec!["duck", "reverb"]);

        let dtmf = topology(&config("dtmf", r#"{"lead": {}}"#));
        assert!(!dtmf.has_bus(REVERB));
        assert_eq!(targets(&dtmf, "lead.gain"), vec!["master"]);
    }

    #[test]
    fn test_filter_envelope_is_optional() {
        let topology = topology(&config(
            "synthwave",
            r#"{"bass": {"filter": {"cutoff": 400, "envelope": {"attack": 0.01, "octaves": 3}}}, "pad": {}}"#,
        ));
        let bass = topology.voice(VoiceId::Bass).unwrap();
        assert_eq!(bass.filter_env, Some(NodeId::new("bass.filter_env")));
        assert_eq!(targets(&topology, "bass.filter_env"), vec!["bass.filter"]);
        assert!(topology.voice(VoiceId::Pad).unwrap().filter_env.is_none());
    }

    #[test]
    fn test_realize_builds_master_first() {
        let topology = topology(&config("synthwave", all_voices()));
        let mut host = RecordingHost::new();
        let built = realize(&topology.graph, &mut host).unwrap();

        assert_eq!(built.len(), topology.graph.node_count());
        assert_eq!(built[0].as_str(), MASTER);
        assert_eq!(host.live_count(), built.len());
        let connects = host
            .calls()
            .iter()
            .filter(|c| matches!(c, HostCall::Connect { .. }))
            .count();
        assert_eq!(connects, topology.graph.connections().len());
    }

    #[test]
    fn test_realize_failure_leaves_nothing() {
        let topology = topology(&config("synthwave", all_voices()));
        let mut host = RecordingHost::failing_on(NodeId::new("pad.synth"));
        let err = realize(&topology.graph, &mut host).unwrap_err();
        assert!(matches!(err, EngineError::Host(_)));
        assert_eq!(host.live_count(), 0);
        assert!(host.created_count() > 0);
        assert_eq!(host.disposed_count(), host.created_count());
        assert!(host.double_disposals().is_empty());
    }
}
