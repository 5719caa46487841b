//! Audio host contract
//!
//! The engine never makes sound itself. It drives an [`AudioHost`] that owns
//! the real synthesis graph and the realtime clock: nodes are created and
//! wired by name, notes are triggered at absolute host times, and parameters
//! are automated with Web-Audio-style scheduled events.
//!
//! [`RecordingHost`] is an in-memory host that records every call. It backs
//! the test suite and is handy for offline rendering of a piece's event list.

use crate::automation::ParamTimeline;
use crate::error::HostError;
use crate::harmony::MidiNote;
use crate::recipe::VoiceId;
use crate::signal_graph::{NodeId, NodeSpec};
use std::collections::{BTreeMap, HashMap};

/// An automatable parameter on a host node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamName {
    /// Filter cutoff in Hz
    Cutoff,
    /// Voice level in dB
    Volume,
    /// Linear gain (the duck bus)
    Gain,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamRef {
    pub node: NodeId,
    pub param: ParamName,
}

impl ParamRef {
    pub fn new(node: NodeId, param: ParamName) -> Self {
        Self { node, param }
    }

    pub fn cutoff(voice: VoiceId) -> Self {
        Self::new(NodeId::voice(voice, "filter"), ParamName::Cutoff)
    }

    pub fn volume(voice: VoiceId) -> Self {
        Self::new(NodeId::voice(voice, "gain"), ParamName::Volume)
    }

    pub fn duck_gain() -> Self {
        Self::new(NodeId::new("duck"), ParamName::Gain)
    }
}

/// Everything the engine needs from the audio runtime.
///
/// All times are absolute host seconds. Calls are made from the single
/// scheduling thread; implementations need no internal locking.
pub trait AudioHost {
    /// Current host clock time
    fn current_time(&self) -> f64;

    fn create_node(&mut self, id: &NodeId, spec: &NodeSpec) -> Result<(), HostError>;

    fn connect(&mut self, from: &NodeId, to: &NodeId) -> Result<(), HostError>;

    /// Release a node. Called at most once per created node.
    fn dispose_node(&mut self, id: &NodeId);

    fn start_transport(&mut self, at: f64);

    fn stop_transport(&mut self);

    /// Attack-release one or more pitches on a synth node.
    fn trigger(
        &mut self,
        node: &NodeId,
        notes: &[MidiNote],
        duration_secs: f64,
        time: f64,
        velocity: f64,
    );

    fn set_value_at_time(&mut self, param: &ParamRef, value: f64, time: f64);

    fn linear_ramp_to(&mut self, param: &ParamRef, value: f64, time: f64);

    /// Drop events at or after `time` and hold the value the parameter has there.
    fn cancel_and_hold(&mut self, param: &ParamRef, time: f64);

    /// Drop events at or after `from`.
    fn cancel_scheduled(&mut self, param: &ParamRef, from: f64);
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub node: NodeId,
    pub notes: Vec<MidiNote>,
    pub duration_secs: f64,
    pub time: f64,
    pub velocity: f64,
}

/// One recorded host call
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    CreateNode { id: NodeId, kind: &'static str },
    Connect { from: NodeId, to: NodeId },
    DisposeNode { id: NodeId },
    StartTransport { at: f64 },
    StopTransport,
    Trigger(TriggerEvent),
    SetValueAtTime { param: ParamRef, value: f64, time: f64 },
    LinearRampTo { param: ParamRef, value: f64, time: f64 },
    CancelAndHold { param: ParamRef, time: f64 },
    CancelScheduled { param: ParamRef, from: f64 },
}

/// In-memory host that records calls and tracks node lifetimes.
#[derive(Debug, Default)]
pub struct RecordingHost {
    now: f64,
    calls: Vec<HostCall>,
    live: BTreeMap<NodeId, NodeSpec>,
    created: usize,
    disposed: usize,
    double_disposals: Vec<NodeId>,
    timelines: HashMap<ParamRef, ParamTimeline>,
    transport_running: bool,
    fail_on_create: Option<NodeId>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that refuses to create the named node.
    pub fn failing_on(node: NodeId) -> Self {
        Self {
            fail_on_create: Some(node),
            ..Self::default()
        }
    }

    pub fn set_time(&mut self, now: f64) {
        self.now = now;
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn triggers(&self) -> impl Iterator<Item = &TriggerEvent> {
        self.calls.iter().filter_map(|call| match call {
            HostCall::Trigger(event) => Some(event),
            _ => None,
        })
    }

    pub fn triggers_for<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a TriggerEvent> {
        self.triggers().filter(move |event| &event.node == node)
    }

    /// Nodes created and not yet disposed
    pub fn live_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.live.keys()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: &NodeId) -> bool {
        self.live.contains_key(id)
    }

    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn disposed_count(&self) -> usize {
        self.disposed
    }

    /// Dispose calls for nodes that were not live at the time
    pub fn double_disposals(&self) -> &[NodeId] {
        &self.double_disposals
    }

    pub fn transport_running(&self) -> bool {
        self.transport_running
    }

    pub fn timeline(&self, param: &ParamRef) -> Option<&ParamTimeline> {
        self.timelines.get(param)
    }

    fn default_value(&self, param: &ParamRef) -> f64 {
        match (self.live.get(&param.node), param.param) {
            (Some(NodeSpec::Filter { cutoff, .. }), ParamName::Cutoff) => *cutoff,
            (Some(NodeSpec::Gain { volume_db }), ParamName::Volume) => *volume_db,
            (Some(NodeSpec::Master { volume_db }), ParamName::Volume) => *volume_db,
            _ => match param.param {
                ParamName::Gain => 1.0,
                ParamName::Volume => 0.0,
                ParamName::Cutoff => 1000.0,
            },
        }
    }

    fn timeline_mut(&mut self, param: &ParamRef) -> &mut ParamTimeline {
        let initial = self.default_value(param);
        self.timelines
            .entry(param.clone())
            .or_insert_with(|| ParamTimeline::new(initial))
    }
}

impl AudioHost for RecordingHost {
    fn current_time(&self) -> f64 {
        self.now
    }

    fn create_node(&mut self, id: &NodeId, spec: &NodeSpec) -> Result<(), HostError> {
        if self.fail_on_create.as_ref() == Some(id) {
            return Err(HostError::NodeCreation {
                node: id.0.clone(),
                reason: "rejected by recording host".to_string(),
            });
        }
        self.calls.push(HostCall::CreateNode {
            id: id.clone(),
            kind: spec.kind_name(),
        });
        self.live.insert(id.clone(), spec.clone());
        self.created += 1;
        Ok(())
    }

    fn connect(&mut self, from: &NodeId, to: &NodeId) -> Result<(), HostError> {
        if !self.is_live(from) || !self.is_live(to) {
            return Err(HostError::Connection {
                from: from.0.clone(),
                to: to.0.clone(),
            });
        }
        self.calls.push(HostCall::Connect {
            from: from.clone(),
            to: to.clone(),
        });
        Ok(())
    }

    fn dispose_node(&mut self, id: &NodeId) {
        self.calls.push(HostCall::DisposeNode { id: id.clone() });
        if self.live.remove(id).is_some() {
            self.disposed += 1;
        } else {
            self.double_disposals.push(id.clone());
        }
    }

    fn start_transport(&mut self, at: f64) {
        self.calls.push(HostCall::StartTransport { at });
        self.transport_running = true;
    }

    fn stop_transport(&mut self) {
        self.calls.push(HostCall::StopTransport);
        self.transport_running = false;
    }

    fn trigger(
        &mut self,
        node: &NodeId,
        notes: &[MidiNote],
        duration_secs: f64,
        time: f64,
        velocity: f64,
    ) {
        self.calls.push(HostCall::Trigger(TriggerEvent {
            node: node.clone(),
            notes: notes.to_vec(),
            duration_secs,
            time,
            velocity,
        }));
    }

    fn set_value_at_time(&mut self, param: &ParamRef, value: f64, time: f64) {
        self.calls.push(HostCall::SetValueAtTime {
            param: param.clone(),
            value,
            time,
        });
        self.timeline_mut(param).set_value_at_time(value, time);
    }

    fn linear_ramp_to(&mut self, param: &ParamRef, value: f64, time: f64) {
        self.calls.push(HostCall::LinearRampTo {
            param: param.clone(),
            value,
            time,
        });
        self.timeline_mut(param).linear_ramp_to(value, time);
    }

    fn cancel_and_hold(&mut self, param: &ParamRef, time: f64) {
        self.calls.push(HostCall::CancelAndHold {
            param: param.clone(),
            time,
        });
        self.timeline_mut(param).cancel_and_hold(time);
    }

    fn cancel_scheduled(&mut self, param: &ParamRef, from: f64) {
        self.calls.push(HostCall::CancelScheduled {
            param: param.clone(),
            from,
        });
        self.timeline_mut(param).cancel_scheduled(from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gain_spec() -> NodeSpec {
        NodeSpec::Gain { volume_db: -3.0 }
    }

    #[test]
    fn test_tracks_node_lifetimes() {
        let mut host = RecordingHost::new();
        let master = NodeId::new("master");
        let gain = NodeId::voice(VoiceId::Bass, "gain");
        host.create_node(&master, &NodeSpec::Master { volume_db: 0.0 })
            .unwrap();
        host.create_node(&gain, &gain_spec()).unwrap();
        host.connect(&gain, &master).unwrap();
        assert_eq!(host.live_count(), 2);

        host.dispose_node(&gain);
        host.dispose_node(&gain);
        assert_eq!(host.disposed_count(), 1);
        assert_eq!(host.double_disposals(), &[gain.clone()]);
        assert!(!host.is_live(&gain));
        assert!(host.is_live(&master));
    }

    #[test]
    fn test_connect_requires_live_nodes() {
        let mut host = RecordingHost::new();
        let master = NodeId::new("master");
        host.create_node(&master, &NodeSpec::Master { volume_db: 0.0 })
            .unwrap();
        let err = host.connect(&NodeId::new("reverb"), &master).unwrap_err();
        assert!(matches!(err, HostError::Connection { .. }));
    }

    #[test]
    fn test_injected_creation_failure() {
        let mut host = RecordingHost::failing_on(NodeId::new("reverb"));
        assert!(host.create_node(&NodeId::new("master"), &gain_spec()).is_ok());
        assert!(host.create_node(&NodeId::new("reverb"), &gain_spec()).is_err());
        assert_eq!(host.created_count(), 1);
    }

    #[test]
    fn test_param_timeline_starts_from_node_value() {
        let mut host = RecordingHost::new();
        let gain = NodeId::voice(VoiceId::Pad, "gain");
        host.create_node(&gain, &gain_spec()).unwrap();

        let volume = ParamRef::volume(VoiceId::Pad);
        host.linear_ramp_to(&volume, -12.0, 2.0);
        let timeline = host.timeline(&volume).unwrap();
        assert_eq!(timeline.value_at(0.0), -3.0);
        assert!((timeline.value_at(1.0) - -7.5).abs() < 1e-9);
        assert_eq!(timeline.value_at(3.0), -12.0);
    }

    #[test]
    fn test_trigger_filtering() {
        let mut host = RecordingHost::new();
        let bass = NodeId::voice(VoiceId::Bass, "synth");
        let kick = NodeId::voice(VoiceId::Kick, "synth");
        host.trigger(&bass, &[45], 0.25, 0.0, 0.8);
        host.trigger(&kick, &[36], 0.5, 0.0, 1.0);
        host.trigger(&bass, &[48], 0.25, 0.25, 0.8);

        assert_eq!(host.triggers().count(), 3);
        let bass_notes: Vec<MidiNote> = host.triggers_for(&bass).map(|e| e.notes[0]).collect();
        assert_eq!(bass_notes, vec![45, 48]);
    }
}
