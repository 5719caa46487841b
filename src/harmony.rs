//! Chords and harmony
//!
//! Maps a Roman-numeral progression in a key and scale onto concrete MIDI
//! triads. Every chord is built as a minor-shaped triad `[root, root+3, root+7]`
//! regardless of numeral case; quality is not modelled.

use crate::error::ConfigError;
use std::collections::HashMap;

/// MIDI note number, signed so transpositions can be computed freely
pub type MidiNote = i32;

/// Three chord tones, lowest first
pub type Triad = [MidiNote; 3];

lazy_static::lazy_static! {
    static ref KEY_OFFSETS: HashMap<&'static str, i32> = {
        let mut m = HashMap::new();
        m.insert("c", 0);
        m.insert("cs", 1); m.insert("df", 1);
        m.insert("d", 2);
        m.insert("ds", 3); m.insert("ef", 3);
        m.insert("e", 4);
        m.insert("f", 5);
        m.insert("fs", 6); m.insert("gf", 6);
        m.insert("g", 7);
        m.insert("gs", 8); m.insert("af", 8);
        m.insert("a", 9);
        m.insert("as", 10); m.insert("bf", 10);
        m.insert("b", 11);
        m
    };

    static ref SCALES: HashMap<&'static str, Vec<i32>> = {
        let mut m = HashMap::new();
        m.insert("major", vec![0, 2, 4, 5, 7, 9, 11]);
        m.insert("minor", vec![0, 2, 3, 5, 7, 8, 10]);
        m.insert("harmonic", vec![0, 2, 3, 5, 7, 8, 11]);
        m.insert("melodic", vec![0, 2, 3, 5, 7, 9, 11]);
        m.insert("dorian", vec![0, 2, 3, 5, 7, 9, 10]);
        m.insert("phrygian", vec![0, 1, 3, 5, 7, 8, 10]);
        m.insert("lydian", vec![0, 2, 4, 6, 7, 9, 11]);
        m.insert("mixolydian", vec![0, 2, 4, 5, 7, 9, 10]);
        m.insert("locrian", vec![0, 1, 3, 5, 6, 8, 10]);
        m
    };

    static ref ROMAN_DEGREES: HashMap<&'static str, usize> = {
        let mut m = HashMap::new();
        m.insert("i", 0);
        m.insert("ii", 1);
        m.insert("iii", 2);
        m.insert("iv", 3);
        m.insert("v", 4);
        m.insert("vi", 5);
        m.insert("vii", 6);
        m
    };
}

/// Semitone offset of a key name above C (`"A"`, `"F#"`, `"Bb"`).
pub fn key_offset(key: &str) -> Option<i32> {
    let normalized = key.trim().to_lowercase().replace('#', "s");
    let normalized = match normalized.strip_suffix('b') {
        // "b" alone is the note B, "bb"/"eb" are flats
        Some(stem) if !stem.is_empty() => format!("{}f", stem),
        _ => normalized,
    };
    KEY_OFFSETS.get(normalized.as_str()).copied()
}

pub fn scale_intervals(name: &str) -> Option<&'static [i32]> {
    SCALES.get(name.trim().to_lowercase().as_str()).map(|v| v.as_slice())
}

/// Zero-based scale degree of a Roman numeral, either case.
pub fn roman_degree(numeral: &str) -> Option<usize> {
    ROMAN_DEGREES
        .get(numeral.trim().to_lowercase().as_str())
        .copied()
}

/// Root MIDI note for a numeral: tonic plus the scale degree's interval.
pub fn degree(tonic: MidiNote, scale: &[i32], numeral: &str) -> Option<MidiNote> {
    let index = roman_degree(numeral)?;
    let interval = *scale.get(index % scale.len())?;
    Some(tonic + interval)
}

pub fn triad(root: MidiNote) -> Triad {
    [root, root + 3, root + 7]
}

/// Progression resolved to triads once, looked up by bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordTable {
    chords: Vec<Triad>,
}

impl ChordTable {
    /// Resolve every numeral up front. Unknown numerals are an error here
    /// rather than undefined pitches later.
    pub fn build(tonic: MidiNote, scale: &[i32], progression: &[String]) -> Result<Self, ConfigError> {
        if progression.is_empty() {
            return Err(ConfigError::EmptyProgression);
        }
        let chords = progression
            .iter()
            .map(|numeral| {
                degree(tonic, scale, numeral)
                    .map(triad)
                    .ok_or_else(|| ConfigError::UnknownRomanNumeral {
                        numeral: numeral.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { chords })
    }

    /// Chord for an absolute bar; the progression repeats every `len()` bars.
    pub fn chord_at_bar(&self, bar: u64) -> Triad {
        self.chords[(bar % self.chords.len() as u64) as usize]
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }
}

/// Pitch of a pattern note index against a triad: indices past the triad
/// climb by octaves.
pub fn chord_tone(chord: &Triad, index: u32) -> MidiNote {
    let octave = (index / 3) as i32;
    chord[(index % 3) as usize] + 12 * octave
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progression(numerals: &[&str]) -> Vec<String> {
        numerals.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_key_offsets() {
        assert_eq!(key_offset("C"), Some(0));
        assert_eq!(key_offset("A"), Some(9));
        assert_eq!(key_offset("F#"), Some(6));
        assert_eq!(key_offset("Bb"), Some(10));
        assert_eq!(key_offset("b"), Some(11));
        assert_eq!(key_offset("H"), None);
    }

    #[test]
    fn test_roman_degrees_ignore_case() {
        assert_eq!(roman_degree("i"), Some(0));
        assert_eq!(roman_degree("VI"), Some(5));
        assert_eq!(roman_degree("vii"), Some(6));
        assert_eq!(roman_degree("VIII"), None);
    }

    #[test]
    fn test_degree_in_a_minor() {
        let minor = scale_intervals("minor").unwrap();
        let tonic = 48 + 9;
        assert_eq!(degree(tonic, minor, "i"), Some(57));
        assert_eq!(degree(tonic, minor, "VI"), Some(65));
        assert_eq!(degree(tonic, minor, "III"), Some(60));
        assert_eq!(degree(tonic, minor, "VII"), Some(67));
    }

    #[test]
    fn test_triads_are_minor_shaped() {
        assert_eq!(triad(60), [60, 63, 67]);
        let minor = scale_intervals("minor").unwrap();
        let table = ChordTable::build(57, minor, &progression(&["I", "i"])).unwrap();
        assert_eq!(table.chord_at_bar(0), table.chord_at_bar(1));
    }

    #[test]
    fn test_chord_at_bar_is_periodic() {
        let minor = scale_intervals("minor").unwrap();
        let table = ChordTable::build(57, minor, &progression(&["i", "VI", "III", "VII"])).unwrap();
        for bar in 0..64 {
            assert_eq!(table.chord_at_bar(bar), table.chord_at_bar(bar + table.len() as u64));
        }
        assert_eq!(table.chord_at_bar(1)[0], 65);
        assert_eq!(table.chord_at_bar(5)[0], 65);
    }

    #[test]
    fn test_unknown_numeral_is_an_error() {
        let minor = scale_intervals("minor").unwrap();
        let err = ChordTable::build(57, minor, &progression(&["i", "IX"])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownRomanNumeral {
                numeral: "IX".to_string()
            }
        );
    }

    #[test]
    fn test_chord_tones_climb_octaves() {
        let chord = triad(57);
        assert_eq!(chord_tone(&chord, 0), 57);
        assert_eq!(chord_tone(&chord, 2), 64);
        assert_eq!(chord_tone(&chord, 3), 69);
        assert_eq!(chord_tone(&chord, 4), 72);
    }
}
