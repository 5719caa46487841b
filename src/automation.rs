//! Parameter automation and sidechain ducking
//!
//! Two producers of parameter events live here. Section automation is
//! computed once from the resolved config: per-section filter cutoffs,
//! sweeps and volume levels, each anchored to the tick its section starts
//! on. The ducker reacts to kicks at run time.
//!
//! [`ParamTimeline`] is an engine-side model of a host parameter's event
//! list, used by the recording host to answer "what value does this
//! parameter have at time t".

use crate::config::{DuckSettings, ResolvedConfig};
use crate::host::{AudioHost, ParamRef};
use crate::recipe::VoiceId;
use crate::transport::TransportClock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamEvent {
    /// Jump to `value` at `time`
    Set { time: f64, value: f64 },
    /// Arrive at `value` at `time`, moving linearly from the previous event
    Ramp { time: f64, value: f64 },
}

impl ParamEvent {
    pub fn time(&self) -> f64 {
        match self {
            ParamEvent::Set { time, .. } | ParamEvent::Ramp { time, .. } => *time,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            ParamEvent::Set { value, .. } | ParamEvent::Ramp { value, .. } => *value,
        }
    }
}

/// Time-ordered parameter events over a starting value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTimeline {
    initial: f64,
    events: Vec<ParamEvent>,
}

impl ParamTimeline {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events with equal times keep insertion order.
    fn insert(&mut self, event: ParamEvent) {
        let at = self
            .events
            .partition_point(|existing| existing.time() <= event.time());
        self.events.insert(at, event);
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(ParamEvent::Set { time, value });
    }

    pub fn linear_ramp_to(&mut self, value: f64, time: f64) {
        self.insert(ParamEvent::Ramp { time, value });
    }

    pub fn cancel_scheduled(&mut self, from: f64) {
        self.events.retain(|event| event.time() < from);
    }

    /// Freeze the parameter at whatever value it has at `time`. A ramp in
    /// progress is cut short so that it ends at `time` on the held value.
    pub fn cancel_and_hold(&mut self, time: f64) {
        let held = self.value_at(time);
        let cuts_ramp = matches!(
            self.events.iter().find(|event| event.time() > time),
            Some(ParamEvent::Ramp { .. })
        );
        self.cancel_scheduled(time);
        self.events.push(if cuts_ramp {
            ParamEvent::Ramp { time, value: held }
        } else {
            ParamEvent::Set { time, value: held }
        });
    }

    /// Parameter value at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        let mut prev_time = 0.0;
        let mut prev_value = self.initial;

        for event in &self.events {
            if event.time() <= time {
                prev_time = event.time();
                prev_value = event.value();
                continue;
            }
            if let ParamEvent::Ramp {
                time: end,
                value: target,
            } = *event
            {
                let span = end - prev_time;
                if span > 0.0 {
                    let progress = ((time - prev_time) / span).clamp(0.0, 1.0);
                    return prev_value + (target - prev_value) * progress;
                }
            }
            return prev_value;
        }
        prev_value
    }
}

/// Sidechain envelope on the duck bus gain.
#[derive(Debug, Clone, PartialEq)]
pub struct Ducker {
    param: ParamRef,
    attack_secs: f64,
    release_secs: f64,
    depth: f64,
}

impl Ducker {
    pub fn new(settings: &DuckSettings) -> Self {
        Self {
            param: ParamRef::duck_gain(),
            attack_secs: settings.attack_secs,
            release_secs: settings.release_secs,
            depth: settings.depth,
        }
    }

    pub fn param(&self) -> &ParamRef {
        &self.param
    }

    /// Dip the duck bus for a kick at `time`.
    ///
    /// The gain is first held at its current value, so a kick landing
    /// during a previous release starts from wherever that release had got
    /// to. Ramps never stack.
    pub fn duck<H: AudioHost + ?Sized>(&self, host: &mut H, time: f64) {
        let bottom = time + self.attack_secs;
        host.cancel_and_hold(&self.param, time);
        host.linear_ramp_to(&self.param, self.depth, bottom);
        host.linear_ramp_to(&self.param, 1.0, bottom + self.release_secs);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutomationAction {
    SetCutoff {
        voice: VoiceId,
        hz: f64,
    },
    Sweep {
        voice: VoiceId,
        start_hz: f64,
        end_hz: f64,
        ticks: u64,
    },
    SetVolume {
        voice: VoiceId,
        db: f64,
    },
}

impl AutomationAction {
    pub fn voice(&self) -> VoiceId {
        match self {
            AutomationAction::SetCutoff { voice, .. }
            | AutomationAction::Sweep { voice, .. }
            | AutomationAction::SetVolume { voice, .. } => *voice,
        }
    }

    /// Schedule this action on the host, starting at host time `time`.
    pub fn apply<H: AudioHost + ?Sized>(&self, host: &mut H, time: f64, clock: &TransportClock) {
        match *self {
            AutomationAction::SetCutoff { voice, hz } => {
                let param = ParamRef::cutoff(voice);
                host.cancel_and_hold(&param, time);
                host.set_value_at_time(&param, hz, time);
            }
            AutomationAction::Sweep {
                voice,
                start_hz,
                end_hz,
                ticks,
            } => {
                let param = ParamRef::cutoff(voice);
                host.cancel_and_hold(&param, time);
                host.set_value_at_time(&param, start_hz, time);
                host.linear_ramp_to(&param, end_hz, time + clock.ticks_to_seconds(ticks));
            }
            AutomationAction::SetVolume { voice, db } => {
                host.set_value_at_time(&ParamRef::volume(voice), db, time);
            }
        }
    }
}

/// One automation entry anchored at a section's first tick
#[derive(Debug, Clone, PartialEq)]
pub struct SectionAutomation {
    pub tick: u64,
    pub section: String,
    pub action: AutomationAction,
}

/// Every section-start automation entry for a piece, in section order and
/// then voice declaration order.
///
/// Overrides are scoped to their section: a voice whose cutoff or volume
/// was changed in one section is put back to its configured value at the
/// start of the next section that does not override it.
pub fn section_automation(config: &ResolvedConfig, ticks_per_bar: u64) -> Vec<SectionAutomation> {
    let mut entries = Vec::new();

    for voice in &config.voices {
        if !voice.overrides.values().any(|o| o.has_automation()) {
            continue;
        }
        let base_cutoff = voice.filter.cutoff;
        // None while a sweep is still ramping past the end of its section
        let mut cutoff = Some(base_cutoff);
        let mut volume = voice.base_volume_db;

        for range in config.timeline.iter() {
            let tick = range.start_bar * ticks_per_bar;
            let mut push = |action: AutomationAction| {
                entries.push(SectionAutomation {
                    tick,
                    section: range.name.clone(),
                    action,
                });
            };
            let overrides = voice.overrides.get(&range.name);

            let target_volume = overrides
                .and_then(|o| o.volume_db)
                .unwrap_or(voice.base_volume_db);
            if target_volume != volume {
                push(AutomationAction::SetVolume {
                    voice: voice.id,
                    db: target_volume,
                });
                volume = target_volume;
            }

            match overrides.and_then(|o| o.sweep.as_ref()) {
                Some(sweep) => {
                    push(AutomationAction::Sweep {
                        voice: voice.id,
                        start_hz: sweep.start_hz,
                        end_hz: sweep.end_hz,
                        ticks: sweep.bars as u64 * ticks_per_bar,
                    });
                    cutoff = (sweep.bars as u64 <= range.bars()).then_some(sweep.end_hz);
                }
                None => {
                    let target = overrides
                        .and_then(|o| o.cutoff)
                        .unwrap_or(base_cutoff);
                    if cutoff != Some(target) {
                        push(AutomationAction::SetCutoff {
                            voice: voice.id,
                            hz: target,
                        });
                        cutoff = Some(target);
                    }
                }
            }
        }
    }

    entries.sort_by_key(|entry| (entry.tick, entry.action.voice()));
    debug!("Planned {} section automation events", entries.len());
    entries
}
