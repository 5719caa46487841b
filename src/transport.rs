//! Transport clock
//!
//! The one authoritative musical clock. Every bar, beat and step position in
//! the engine is integer arithmetic on this tick counter, so voices never
//! drift apart. Seconds only appear when an event is handed to the host.

use crate::settings::EngineSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Started,
}

#[derive(Debug, Clone)]
pub struct TransportClock {
    ppq: u32,
    beats_per_bar: u32,
    bpm: f64,
    ticks: u64,
    /// Host time at which tick 0 sounds
    start_secs: f64,
    state: TransportState,
}

impl TransportClock {
    pub fn new(settings: &EngineSettings, bpm: f64) -> Self {
        Self {
            ppq: settings.ppq.max(1),
            beats_per_bar: settings.beats_per_bar.max(1),
            bpm,
            ticks: 0,
            start_secs: 0.0,
            state: TransportState::Stopped,
        }
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn ticks_per_beat(&self) -> u64 {
        self.ppq as u64
    }

    pub fn ticks_per_bar(&self) -> u64 {
        self.ppq as u64 * self.beats_per_bar as u64
    }

    pub fn bar_at(&self, tick: u64) -> u64 {
        tick / self.ticks_per_bar()
    }

    pub fn beat_at(&self, tick: u64) -> u64 {
        tick / self.ticks_per_beat()
    }

    /// Absolute host time of a tick.
    pub fn tick_to_seconds(&self, tick: u64) -> f64 {
        self.start_secs + self.ticks_to_seconds(tick)
    }

    /// Last tick at or before the given host time.
    pub fn seconds_to_tick(&self, secs: f64) -> u64 {
        let elapsed = (secs - self.start_secs).max(0.0);
        (elapsed * self.bpm * self.ppq as f64 / 60.0).floor() as u64
    }

    pub fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        ticks as f64 * 60.0 / (self.bpm * self.ppq as f64)
    }

    pub(crate) fn start(&mut self, at_secs: f64) {
        self.start_secs = at_secs;
        self.state = TransportState::Started;
    }

    pub(crate) fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    /// Move the position forward; the counter never runs backwards.
    pub(crate) fn advance_to(&mut self, tick: u64) {
        self.ticks = self.ticks.max(tick);
    }
}

/// Parse a note-value string into ticks.
///
/// Accepts `Nm` (bars), `Nn` (1/N of a whole note), `Nt` or `Nnt` (triplet),
/// `Ni` (raw ticks), with an optional trailing `.` for dotted values.
/// Returns `None` when the value is malformed, overflows, or is not a whole
/// number of ticks.
pub fn subdivision_ticks(notation: &str, ppq: u32, beats_per_bar: u32) -> Option<u64> {
    let notation = notation.trim();
    let (body, dotted) = match notation.strip_suffix('.') {
        Some(body) => (body, true),
        None => (notation, false),
    };
    let unit = body.chars().last()?;
    let digits = &body[..body.len() - unit.len_utf8()];
    let digits = match unit {
        't' => digits.strip_suffix('n').unwrap_or(digits),
        _ => digits,
    };
    let count: u64 = digits.parse().ok()?;
    if count == 0 {
        return None;
    }

    let whole = 4 * ppq as u64;
    // Exact rational length: numerator / (3 * denominator) ticks
    let (numerator, denominator) = match unit {
        'm' => (
            count
                .checked_mul(ppq as u64)?
                .checked_mul(beats_per_bar as u64)?
                .checked_mul(3)?,
            1,
        ),
        'n' => (3 * whole, count),
        't' => (2 * whole, count),
        'i' => (count.checked_mul(3)?, 1),
        _ => return None,
    };
    let (numerator, denominator) = if dotted {
        (numerator.checked_mul(3)?, denominator.checked_mul(2)?)
    } else {
        (numerator, denominator)
    };
    let divisor = denominator.checked_mul(3)?;
    if numerator == 0 || numerator % divisor != 0 {
        return None;
    }
    Some(numerator / divisor)
}
