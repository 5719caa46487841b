//! Section timeline
//!
//! Turns the ordered `{name, bars}` list into contiguous half-open bar
//! ranges and answers which section a bar falls in, and whether a voice
//! plays in a given section.

use crate::recipe::{SectionSpec, VoiceConfig};

/// A named `[start_bar, end_bar)` range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRange {
    pub name: String,
    pub start_bar: u64,
    pub end_bar: u64,
}

impl SectionRange {
    pub fn bars(&self) -> u64 {
        self.end_bar - self.start_bar
    }

    pub fn contains(&self, bar: i64) -> bool {
        bar >= 0 && (bar as u64) >= self.start_bar && (bar as u64) < self.end_bar
    }
}

/// Ordered sections covering `[0, total_bars)` with no gaps or overlaps
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionTimeline {
    sections: Vec<SectionRange>,
    total_bars: u64,
}

impl SectionTimeline {
    /// Build ranges with a running prefix sum over the section lengths.
    pub fn build(sections: &[SectionSpec]) -> Self {
        let mut start = 0u64;
        let ranges = sections
            .iter()
            .map(|section| {
                let end = start + section.bars as u64;
                let range = SectionRange {
                    name: section.name.clone(),
                    start_bar: start,
                    end_bar: end,
                };
                start = end;
                range
            })
            .collect();

        Self {
            sections: ranges,
            total_bars: start,
        }
    }

    /// Name of the section containing `bar`, or `None` outside the piece.
    ///
    /// First match in section order wins. Callers treat `None` as
    /// "everything disabled".
    pub fn section_at(&self, bar: i64) -> Option<&str> {
        self.sections
            .iter()
            .find(|range| range.contains(bar))
            .map(|range| range.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&SectionRange> {
        self.sections.iter().find(|range| range.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionRange> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn total_bars(&self) -> u64 {
        self.total_bars
    }
}

/// What the enablement check needs to know about a voice.
pub trait SectionGate {
    /// False when the voice carries no settings of its own.
    fn is_configured(&self) -> bool;
    /// Explicit `enabled` flag for a section, if one was given.
    fn enabled_override(&self, section: &str) -> Option<bool>;
}

impl SectionGate for VoiceConfig {
    fn is_configured(&self) -> bool {
        !self.is_trivial()
    }

    fn enabled_override(&self, section: &str) -> Option<bool> {
        self.section_overrides.get(section).and_then(|o| o.enabled)
    }
}

/// Whether a voice plays in `section`.
///
/// An explicit override wins. Without one, configured voices play and
/// unconfigured ones stay silent.
pub fn is_enabled(voice: &impl SectionGate, section: &str) -> bool {
    voice
        .enabled_override(section)
        .unwrap_or_else(|| voice.is_configured())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::SectionOverride;

    fn three_sections() -> SectionTimeline {
        SectionTimeline::build(&[
            SectionSpec::new("intro", 4),
            SectionSpec::new("verse", 8),
            SectionSpec::new("outro", 4),
        ])
    }

    #[test]
    fn test_prefix_sum_ranges() {
        let timeline = three_sections();
        let ranges: Vec<(u64, u64)> = timeline.iter().map(|r| (r.start_bar, r.end_bar)).collect();
        assert_eq!(ranges, vec![(0, 4), (4, 12), (12, 16)]);
        assert_eq!(timeline.total_bars(), 16);
    }

    #[test]
    fn test_section_at_is_half_open() {
        let timeline = three_sections();
        assert_eq!(timeline.section_at(0), Some("intro"));
        assert_eq!(timeline.section_at(3), Some("intro"));
        assert_eq!(timeline.section_at(4), Some("verse"));
        assert_eq!(timeline.section_at(15), Some("outro"));
        assert_eq!(timeline.section_at(16), None);
        assert_eq!(timeline.section_at(-1), None);
    }

    #[test]
    fn test_ranges_are_contiguous() {
        let timeline = three_sections();
        let ranges: Vec<&SectionRange> = timeline.iter().collect();
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end_bar, pair[1].start_bar);
        }
        assert_eq!(ranges[0].start_bar, 0);
        assert_eq!(timeline.get("verse").map(|r| r.bars()), Some(8));
    }

    #[test]
    fn test_override_only_voice_defaults_disabled() {
        let mut voice = VoiceConfig::default();
        voice.section_overrides.insert(
            "verse".to_string(),
            SectionOverride {
                enabled: Some(true),
                ..Default::default()
            },
        );
        assert!(!is_enabled(&voice, "intro"));
        assert!(is_enabled(&voice, "verse"));
    }

    #[test]
    fn test_configured_voice_defaults_enabled() {
        let mut voice = VoiceConfig {
            octave: Some(-1),
            ..Default::default()
        };
        assert!(is_enabled(&voice, "intro"));

        voice.section_overrides.insert(
            "intro".to_string(),
            SectionOverride {
                enabled: Some(false),
                ..Default::default()
            },
        );
        assert!(!is_enabled(&voice, "intro"));
        assert!(is_enabled(&voice, "verse"));
    }

    #[test]
    fn test_override_without_flag_keeps_default() {
        let mut voice = VoiceConfig {
            octave: Some(0),
            ..Default::default()
        };
        voice.section_overrides.insert(
            "intro".to_string(),
            SectionOverride {
                cutoff: Some(400.0),
                ..Default::default()
            },
        );
        assert!(is_enabled(&voice, "intro"));
    }
}
