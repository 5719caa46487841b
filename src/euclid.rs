//! Euclidean rhythms and step-pattern generation
//!
//! Patterns are fixed-length sequences of note indices and rests. They come
//! either straight from the recipe or from one of a small, closed set of
//! generators. A pattern is then zipped with a velocity sequence to yield the
//! steps a voice actually plays.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Raw value used for a rest in explicit step arrays
pub const REST: i32 = -1;

/// One slot of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Index into the current chord (0..3 are the triad, 3 is the octave root)
    Note(u32),
    Rest,
}

impl Step {
    /// Any negative value is a rest.
    pub fn from_raw(value: i32) -> Self {
        if value < 0 {
            Step::Rest
        } else {
            Step::Note(value as u32)
        }
    }
}

/// A step resolved against its velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayableStep {
    Note { index: u32, velocity: f64 },
    Rest,
}

impl PlayableStep {
    pub fn is_rest(&self) -> bool {
        matches!(self, PlayableStep::Rest)
    }
}

/// Named pattern generators
#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// Fixed syncopated groove
    Groove,
    ArpUp,
    ArpDown,
    ArpUpDown,
    /// Random chord tones with rests, reproducible from the seed
    Random { rest_probability: f64, seed: u64 },
    /// Euclidean onsets on the chord root
    Euclid { pulses: usize, rotation: i32 },
}

impl PatternKind {
    /// Map a recipe pattern name onto a generator. `euclid` by name gets
    /// half the steps as pulses.
    pub fn from_name(name: &str, steps: usize, rest_probability: f64, seed: u64) -> Option<Self> {
        let kind = match name {
            "groove" => PatternKind::Groove,
            "arp_up" | "up" => PatternKind::ArpUp,
            "arp_down" | "down" => PatternKind::ArpDown,
            "arp_up_down" | "updown" | "up_down" => PatternKind::ArpUpDown,
            "random" => PatternKind::Random {
                rest_probability,
                seed,
            },
            "euclid" | "euclidean" => PatternKind::Euclid {
                pulses: steps / 2,
                rotation: 0,
            },
            _ => return None,
        };
        Some(kind)
    }
}

const GROOVE: [Step; 8] = [
    Step::Note(0),
    Step::Rest,
    Step::Note(0),
    Step::Note(2),
    Step::Rest,
    Step::Note(0),
    Step::Note(1),
    Step::Rest,
];

const UP_DOWN: [u32; 6] = [0, 1, 2, 3, 2, 1];

/// Distribute `pulses` onsets as evenly as possible over `steps` slots
/// using Bjorklund's algorithm.
///
/// The recursive construction is rotated so the first onset lands on step 0:
/// - E(3,8) -> X..X..X.
/// - E(5,8) -> X.XX.XX.
pub fn euclidean(steps: usize, pulses: usize) -> Vec<bool> {
    if pulses == 0 {
        return vec![false; steps];
    }
    if pulses >= steps {
        return vec![true; steps];
    }

    let mut counts = Vec::new();
    let mut remainders = vec![pulses];
    let mut divisor = steps - pulses;
    let mut level = 0usize;

    while remainders[level] > 1 {
        counts.push(divisor / remainders[level]);
        remainders.push(divisor % remainders[level]);
        divisor = remainders[level];
        level += 1;
    }
    counts.push(divisor);

    let mut pattern = Vec::with_capacity(steps);
    build(level as isize, &counts, &remainders, &mut pattern);
    pattern.truncate(steps);

    if let Some(first) = pattern.iter().position(|&onset| onset) {
        pattern.rotate_left(first);
    }
    pattern
}

fn build(level: isize, counts: &[usize], remainders: &[usize], pattern: &mut Vec<bool>) {
    match level {
        -1 => pattern.push(false),
        -2 => pattern.push(true),
        _ => {
            let idx = level as usize;
            for _ in 0..counts[idx] {
                build(level - 1, counts, remainders, pattern);
            }
            if remainders[idx] != 0 {
                build(level - 2, counts, remainders, pattern);
            }
        }
    }
}

/// Rotate a pattern; positive values shift onsets earlier.
pub fn rotate<T>(pattern: &mut [T], rotation: i32) {
    let len = pattern.len() as i32;
    if len == 0 || rotation == 0 {
        return;
    }
    let shift = rotation.rem_euclid(len) as usize;
    pattern.rotate_left(shift);
}

/// Produce a pattern of `steps` slots. Explicit step data wins and is
/// returned unchanged; otherwise the generator runs.
pub fn generate_pattern(kind: &PatternKind, steps: usize, explicit: Option<&[Step]>) -> Vec<Step> {
    if let Some(explicit) = explicit {
        return explicit.to_vec();
    }

    match kind {
        PatternKind::Groove => (0..steps).map(|i| GROOVE[i % GROOVE.len()]).collect(),
        PatternKind::ArpUp => (0..steps).map(|i| Step::Note((i % 4) as u32)).collect(),
        PatternKind::ArpDown => (0..steps).map(|i| Step::Note(3 - (i % 4) as u32)).collect(),
        PatternKind::ArpUpDown => (0..steps)
            .map(|i| Step::Note(UP_DOWN[i % UP_DOWN.len()]))
            .collect(),
        PatternKind::Random {
            rest_probability,
            seed,
        } => {
            let mut rng = StdRng::seed_from_u64(*seed);
            let p = rest_probability.clamp(0.0, 1.0);
            (0..steps)
                .map(|_| {
                    if rng.gen_bool(p) {
                        Step::Rest
                    } else {
                        Step::Note(rng.gen_range(0..4))
                    }
                })
                .collect()
        }
        PatternKind::Euclid { pulses, rotation } => {
            let mut onsets = euclidean(steps, *pulses);
            rotate(&mut onsets, *rotation);
            onsets
                .into_iter()
                .map(|hit| if hit { Step::Note(0) } else { Step::Rest })
                .collect()
        }
    }
}

/// Zip a pattern with velocities. The velocity list is consumed one entry
/// per onset and cycles by its own length; rest slots take none.
///
/// A pattern rest and a zero velocity both come out as [`PlayableStep::Rest`].
/// An empty velocity list plays every note at full velocity.
pub fn apply_velocities(pattern: &[Step], velocities: &[f64]) -> Vec<PlayableStep> {
    let mut onset = 0;
    pattern
        .iter()
        .map(|step| {
            let Step::Note(index) = *step else {
                return PlayableStep::Rest;
            };
            let velocity = if velocities.is_empty() {
                1.0
            } else {
                velocities[onset % velocities.len()]
            };
            onset += 1;
            if velocity > 0.0 {
                PlayableStep::Note { index, velocity }
            } else {
                PlayableStep::Rest
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(pattern: &[bool]) -> String {
        pattern.iter().map(|&b| if b { 'X' } else { '.' }).collect()
    }

    #[test]
    fn test_euclidean_edges() {
        assert_eq!(euclidean(8, 0), vec![false; 8]);
        assert_eq!(euclidean(8, 8), vec![true; 8]);
        assert_eq!(euclidean(8, 12), vec![true; 8]);
        assert!(euclidean(0, 0).is_empty());
    }

    #[test]
    fn test_euclidean_canonical_rhythms() {
        assert_eq!(render(&euclidean(8, 3)), "X..X..X.");
        assert_eq!(render(&euclidean(8, 5)), "X.XX.XX.");
        assert_eq!(render(&euclidean(16, 5)), "X..X..X..X..X...");
        assert_eq!(render(&euclidean(4, 1)), "X...");
    }

    #[test]
    fn test_euclidean_counts() {
        for steps in 1..=32 {
            for pulses in 1..steps {
                let pattern = euclidean(steps, pulses);
                assert_eq!(pattern.len(), steps, "E({},{})", pulses, steps);
                assert_eq!(
                    pattern.iter().filter(|&&b| b).count(),
                    pulses,
                    "E({},{})",
                    pulses,
                    steps
                );
            }
        }
    }

    #[test]
    fn test_rotation() {
        let mut pattern = euclidean(8, 3);
        rotate(&mut pattern, 1);
        assert_eq!(render(&pattern), "..X..X.X");
        rotate(&mut pattern, -1);
        assert_eq!(render(&pattern), "X..X..X.");
    }

    #[test]
    fn test_explicit_data_passes_through() {
        let explicit = [Step::Note(2), Step::Rest, Step::Note(7)];
        let pattern = generate_pattern(&PatternKind::ArpUp, 8, Some(&explicit));
        assert_eq!(pattern, explicit.to_vec());
    }

    #[test]
    fn test_arp_generators() {
        assert_eq!(
            generate_pattern(&PatternKind::ArpUp, 5, None),
            vec![Step::Note(0), Step::Note(1), Step::Note(2), Step::Note(3), Step::Note(0)]
        );
        assert_eq!(
            generate_pattern(&PatternKind::ArpDown, 4, None),
            vec![Step::Note(3), Step::Note(2), Step::Note(1), Step::Note(0)]
        );
        let up_down = generate_pattern(&PatternKind::ArpUpDown, 8, None);
        assert_eq!(up_down[4], Step::Note(2));
        assert_eq!(up_down[6], Step::Note(0));
    }

    #[test]
    fn test_random_is_reproducible() {
        let kind = PatternKind::Random {
            rest_probability: 0.3,
            seed: 42,
        };
        let a = generate_pattern(&kind, 16, None);
        let b = generate_pattern(&kind, 16, None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let never_rests = PatternKind::Random {
            rest_probability: 0.0,
            seed: 1,
        };
        assert!(generate_pattern(&never_rests, 16, None)
            .iter()
            .all(|step| matches!(step, Step::Note(i) if *i < 4)));
    }

    #[test]
    fn test_euclid_generator_hits_root() {
        let kind = PatternKind::Euclid {
            pulses: 3,
            rotation: 0,
        };
        let pattern = generate_pattern(&kind, 8, None);
        assert_eq!(pattern[0], Step::Note(0));
        assert_eq!(pattern[1], Step::Rest);
        assert_eq!(pattern[3], Step::Note(0));
    }

    #[test]
    fn test_apply_velocities_collapses_both_rests() {
        let pattern: Vec<Step> = [0, REST, 1, REST].into_iter().map(Step::from_raw).collect();
        let steps = apply_velocities(&pattern, &[0.5, 0.0, 0.5, 0.5]);
        assert_eq!(
            steps,
            vec![
                PlayableStep::Note {
                    index: 0,
                    velocity: 0.5
                },
                PlayableStep::Rest,
                PlayableStep::Rest,
                PlayableStep::Rest,
            ]
        );
    }

    #[test]
    fn test_velocities_cycle_independently() {
        let pattern = vec![Step::Note(0); 5];
        let steps = apply_velocities(&pattern, &[1.0, 0.5]);
        let velocities: Vec<f64> = steps
            .iter()
            .map(|s| match s {
                PlayableStep::Note { velocity, .. } => *velocity,
                PlayableStep::Rest => 0.0,
            })
            .collect();
        assert_eq!(velocities, vec![1.0, 0.5, 1.0, 0.5, 1.0]);
    }

    #[test]
    fn test_rest_slots_consume_no_velocity() {
        let pattern: Vec<Step> = [0, REST, REST, 2, 1].into_iter().map(Step::from_raw).collect();
        let steps = apply_velocities(&pattern, &[0.9, 0.4]);
        assert_eq!(
            steps,
            vec![
                PlayableStep::Note {
                    index: 0,
                    velocity: 0.9
                },
                PlayableStep::Rest,
                PlayableStep::Rest,
                PlayableStep::Note {
                    index: 2,
                    velocity: 0.4
                },
                PlayableStep::Note {
                    index: 1,
                    velocity: 0.9
                },
            ]
        );
    }

    #[test]
    fn test_named_generators() {
        assert_eq!(PatternKind::from_name("groove", 8, 0.3, 0), Some(PatternKind::Groove));
        assert_eq!(
            PatternKind::from_name("euclid", 8, 0.3, 0),
            Some(PatternKind::Euclid {
                pulses: 4,
                rotation: 0
            })
        );
        assert_eq!(PatternKind::from_name("zigzag", 8, 0.3, 0), None);
    }
}
