//! Event scheduler
//!
//! Every voice is a periodic task on one shared tick counter. Pending work
//! lives in a single priority queue keyed by `(tick, lane, sequence)`:
//! section automation runs in lane 0 and each voice runs in the lane after
//! its declaration index, so everything due on the same tick fires in a
//! fixed order no matter when it was queued.
//!
//! Time only moves when the caller advances it, either to an explicit tick
//! or to "host now plus lookahead". Empty ticks cost nothing.

use crate::automation::{section_automation, AutomationAction, Ducker, SectionAutomation};
use crate::config::{Playback, ResolvedConfig, ResolvedVoice, VoiceRole};
use crate::euclid::PlayableStep;
use crate::harmony::{chord_tone, MidiNote};
use crate::host::{AudioHost, ParamRef};
use crate::recipe::VoiceId;
use crate::settings::EngineSettings;
use crate::signal_graph::NodeId;
use crate::timeline::is_enabled;
use crate::transport::TransportClock;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, trace};

/// Lane reserved for section automation; voices follow in declaration order.
pub const AUTOMATION_LANE: u32 = 0;

pub type TaskId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub tick: u64,
    pub lane: u32,
    /// Insertion counter, breaks ties within a lane
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    VoiceStep { task: TaskId },
    Automation { index: usize },
}

#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub key: EventKey,
    pub kind: EventKind,
}

// BinaryHeap is a max-heap; reverse the key so the earliest event pops first.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

/// Min-heap of scheduled events.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, tick: u64, lane: u32, kind: EventKind) -> EventKey {
        let key = EventKey {
            tick,
            lane,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent { key, kind });
        key
    }

    pub fn peek_tick(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.key.tick)
    }

    /// Pop the next event if it is due at or before `up_to_tick`.
    pub fn pop_if_ready(&mut self, up_to_tick: u64) -> Option<ScheduledEvent> {
        if self.heap.peek().is_some_and(|e| e.key.tick <= up_to_tick) {
            self.heap.pop()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not queued: transport stopped, or a melody past its stop beat
    Idle,
    /// Next step is in the queue
    Armed,
    /// Currently being evaluated
    Firing,
}

/// Mutable per-voice position, advanced by the scheduler only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceCursor {
    /// Next pattern step; advances on every evaluation so the pattern stays
    /// locked to the grid across silent sections
    pub step: usize,
    /// Next melody entry; advances only when the voice plays, never resets
    pub melody: usize,
    /// Melody notes reached so far; picks the next velocity
    pub melody_onsets: usize,
    pub last_fired_bar: Option<u64>,
}

/// Scheduling state for one voice
#[derive(Debug, Clone)]
pub struct VoiceTask {
    id: TaskId,
    voice: VoiceId,
    lane: u32,
    synth: NodeId,
    state: TaskState,
    cursor: VoiceCursor,
    evaluations: u64,
    fired: u64,
}

impl VoiceTask {
    fn new(id: TaskId, voice: VoiceId) -> Self {
        Self {
            id,
            voice,
            lane: voice.index() as u32 + 1,
            synth: NodeId::voice(voice, "synth"),
            state: TaskState::Idle,
            cursor: VoiceCursor::default(),
            evaluations: 0,
            fired: 0,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    pub fn lane(&self) -> u32 {
        self.lane
    }

    pub fn synth(&self) -> &NodeId {
        &self.synth
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn cursor(&self) -> &VoiceCursor {
        &self.cursor
    }

    /// Times this task has been invoked, silent or not
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Times this task triggered a note
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

/// What one evaluation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Fired,
    /// Disabled section, rest step, or outside the piece
    Silent,
    /// Melody past its stop beat; the task goes idle
    Finished,
}

pub struct Scheduler {
    config: ResolvedConfig,
    clock: TransportClock,
    queue: EventQueue,
    tasks: Vec<VoiceTask>,
    automation: Vec<SectionAutomation>,
    ducker: Ducker,
    lookahead_secs: f64,
    /// First tick not yet processed
    horizon: u64,
    running: bool,
}

impl Scheduler {
    pub fn new(config: ResolvedConfig, settings: &EngineSettings) -> Self {
        let clock = TransportClock::new(settings, config.bpm);
        let tasks = config
            .voices
            .iter()
            .enumerate()
            .map(|(id, voice)| VoiceTask::new(id, voice.id))
            .collect();
        let automation = section_automation(&config, clock.ticks_per_bar());
        let ducker = Ducker::new(&config.buses.duck);

        Self {
            config,
            clock,
            queue: EventQueue::new(),
            tasks,
            automation,
            ducker,
            lookahead_secs: settings.lookahead_secs,
            horizon: 0,
            running: false,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn tasks(&self) -> &[VoiceTask] {
        &self.tasks
    }

    pub fn task(&self, voice: VoiceId) -> Option<&VoiceTask> {
        self.tasks.iter().find(|task| task.voice == voice)
    }

    pub fn automation(&self) -> &[SectionAutomation] {
        &self.automation
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start the transport with tick 0 at host time `at_secs` and queue the
    /// first step of every voice plus all section automation.
    pub fn start<H: AudioHost + ?Sized>(&mut self, host: &mut H, at_secs: f64) {
        if self.running {
            return;
        }
        self.clock.start(at_secs);
        host.start_transport(at_secs);

        for (index, entry) in self.automation.iter().enumerate() {
            self.queue
                .schedule(entry.tick, AUTOMATION_LANE, EventKind::Automation { index });
        }

        let ticks_per_beat = self.clock.ticks_per_beat();
        for (task, voice) in self.tasks.iter_mut().zip(&self.config.voices) {
            let first = match &voice.playback {
                Playback::Pattern { .. } => 0,
                Playback::Melody { start_beat, .. } => start_beat * ticks_per_beat,
            };
            self.queue
                .schedule(first, task.lane, EventKind::VoiceStep { task: task.id });
            task.state = TaskState::Armed;
        }

        self.running = true;
        debug!(
            "Transport started at {:.3}s with {} voices, {} automation events",
            at_secs,
            self.tasks.len(),
            self.automation.len()
        );
    }

    /// Stop the transport, drop every queued event and cancel all parameter
    /// automation from the host's current time on.
    pub fn stop<H: AudioHost + ?Sized>(&mut self, host: &mut H) {
        host.stop_transport();
        self.clock.stop();
        self.queue.clear();
        for task in &mut self.tasks {
            task.state = TaskState::Idle;
        }

        let now = host.current_time();
        for param in self.automated_params() {
            host.cancel_scheduled(&param, now);
        }
        self.running = false;
    }

    /// Every parameter this scheduler may have automated.
    pub fn automated_params(&self) -> Vec<ParamRef> {
        let mut params: Vec<ParamRef> = Vec::new();
        if self.task(VoiceId::Kick).is_some() {
            params.push(self.ducker.param().clone());
        }
        for entry in &self.automation {
            let param = match entry.action {
                AutomationAction::SetCutoff { voice, .. } | AutomationAction::Sweep { voice, .. } => {
                    ParamRef::cutoff(voice)
                }
                AutomationAction::SetVolume { voice, .. } => ParamRef::volume(voice),
            };
            if !params.contains(&param) {
                params.push(param);
            }
        }
        params
    }

    /// Process every event due at or before `tick`. Returns how many events
    /// were processed.
    pub fn advance_to_tick<H: AudioHost + ?Sized>(&mut self, host: &mut H, tick: u64) -> usize {
        if !self.running {
            return 0;
        }
        let mut processed = 0;
        while let Some(event) = self.queue.pop_if_ready(tick) {
            self.clock.advance_to(event.key.tick);
            match event.kind {
                EventKind::Automation { index } => self.run_automation(host, index),
                EventKind::VoiceStep { task } => self.run_step(host, task, event.key.tick),
            }
            processed += 1;
        }
        self.clock.advance_to(tick);
        self.horizon = self.horizon.max(tick.saturating_add(1));
        processed
    }

    /// Schedule everything due up to the host time `now_secs` plus lookahead.
    pub fn pump<H: AudioHost + ?Sized>(&mut self, host: &mut H, now_secs: f64) -> usize {
        let target = self.clock.seconds_to_tick(now_secs + self.lookahead_secs);
        self.advance_to_tick(host, target)
    }

    /// Run through the end of the bar `bars - 1` bars after the current one.
    /// From a fresh start, `run_bars(n)` covers exactly bars `0..n`.
    pub fn run_bars<H: AudioHost + ?Sized>(&mut self, host: &mut H, bars: u64) -> usize {
        if bars == 0 {
            return 0;
        }
        let ticks_per_bar = self.clock.ticks_per_bar();
        let target = (self.horizon / ticks_per_bar + bars) * ticks_per_bar - 1;
        self.advance_to_tick(host, target)
    }

    fn run_automation<H: AudioHost + ?Sized>(&mut self, host: &mut H, index: usize) {
        let Some(entry) = self.automation.get(index) else {
            return;
        };
        let time = self.clock.tick_to_seconds(entry.tick);
        debug!(
            "Section '{}' automation at tick {}: {:?}",
            entry.section, entry.tick, entry.action
        );
        entry.action.apply(host, time, &self.clock);
    }

    fn run_step<H: AudioHost + ?Sized>(&mut self, host: &mut H, index: TaskId, tick: u64) {
        let Some(voice) = self.config.voices.get(index) else {
            return;
        };
        let Some(task) = self.tasks.get_mut(index) else {
            return;
        };

        task.state = TaskState::Firing;
        let outcome = evaluate(voice, task, &self.config, &self.clock, host, tick);
        if outcome == StepOutcome::Fired && voice.id == VoiceId::Kick {
            self.ducker.duck(host, self.clock.tick_to_seconds(tick));
        }

        if outcome == StepOutcome::Finished {
            task.state = TaskState::Idle;
            trace!("{} reached its stop beat at tick {}", voice.id, tick);
        } else {
            let next = tick.saturating_add(voice.playback.interval_ticks());
            self.queue
                .schedule(next, task.lane, EventKind::VoiceStep { task: index });
            task.state = TaskState::Armed;
        }
    }
}

/// One invocation of a voice task at `tick`.
fn evaluate<H: AudioHost + ?Sized>(
    voice: &ResolvedVoice,
    task: &mut VoiceTask,
    config: &ResolvedConfig,
    clock: &TransportClock,
    host: &mut H,
    tick: u64,
) -> StepOutcome {
    let bar = clock.bar_at(tick);

    if let Playback::Melody {
        stop_beat: Some(stop),
        ..
    } = voice.playback
    {
        if clock.beat_at(tick) >= stop {
            return StepOutcome::Finished;
        }
    }

    task.evaluations += 1;
    let pattern_index = task.cursor.step;
    task.cursor.step += 1;

    let enabled = config
        .timeline
        .section_at(bar as i64)
        .is_some_and(|section| is_enabled(voice, section));
    if !enabled {
        return StepOutcome::Silent;
    }

    let (notes, velocity): (Vec<MidiNote>, f64) = match &voice.playback {
        Playback::Pattern { steps, .. } => {
            if steps.is_empty() {
                return StepOutcome::Silent;
            }
            let PlayableStep::Note { index, velocity } = steps[pattern_index % steps.len()] else {
                return StepOutcome::Silent;
            };
            let chord = config.chords.chord_at_bar(bar);
            let shift = 12 * voice.octave;
            let notes = match voice.role {
                VoiceRole::Melodic => vec![chord_tone(&chord, index) + shift],
                VoiceRole::Chordal => chord.iter().map(|note| note + shift).collect(),
                VoiceRole::Percussive { pitch } => vec![pitch],
            };
            (notes, velocity)
        }
        Playback::Melody {
            notes, velocities, ..
        } => {
            if notes.is_empty() {
                return StepOutcome::Silent;
            }
            let entry = task.cursor.melody;
            task.cursor.melody += 1;
            let Some(note) = notes[entry % notes.len()] else {
                return StepOutcome::Silent;
            };
            let onset = task.cursor.melody_onsets;
            task.cursor.melody_onsets += 1;
            let velocity = if velocities.is_empty() {
                1.0
            } else {
                velocities[onset % velocities.len()]
            };
            if velocity <= 0.0 {
                return StepOutcome::Silent;
            }
            (vec![note], velocity)
        }
    };

    let time = clock.tick_to_seconds(tick);
    let duration = clock.ticks_to_seconds(voice.duration_ticks);
    trace!(
        "{} tick {} bar {} -> {:?} @ {:.2}",
        voice.id,
        tick,
        bar,
        notes,
        velocity
    );
    host.trigger(&task.synth, &notes, duration, time, velocity);
    task.fired += 1;
    task.cursor.last_fired_bar = Some(bar);
    StepOutcome::Fired
}
