/// End-to-end playback tests
///
/// These run full recipes through the engine against the recording host and
/// check what came out the other side: which pitches were triggered when,
/// which sections were silent, and how section automation landed on the
/// filter and gain parameters.
use tonegraph::host::{ParamRef, RecordingHost};
use tonegraph::signal_graph::NodeId;
use tonegraph::{Engine, Recipe, VoiceId};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Two sections of two bars each, a four-chord progression in C minor
fn two_section_recipe() -> Recipe {
    Recipe::from_json_str(
        r#"{
            "global": {"bpm": 120, "key": "C", "scale": "minor"},
            "progression": ["i", "iv", "v", "VI"],
            "sections": [
                {"name": "intro", "bars": 2},
                {"name": "drop", "bars": 2}
            ],
            "instruments": {
                "bass": {"octave": 0, "pattern": [0, 0, 0, 0, 0, 0, 0, 0]},
                "pad": {"octave": 0, "section_overrides": {"intro": {"enabled": false}}},
                "lead": {"octave": 1, "section_overrides": {"drop": {"cutoff": 1200}}}
            }
        }"#,
    )
    .expect("recipe parses")
}

// ============================================================================
// Harmony and timing
// ============================================================================

#[test]
fn test_bass_roots_follow_progression() {
    init_tracing();
    let mut engine = Engine::new(RecordingHost::new());
    engine.init(Some(&two_section_recipe())).unwrap();
    engine.run_bars(4);

    let bass = engine.scheduler().unwrap().task(VoiceId::Bass).unwrap();
    assert_eq!(bass.evaluations(), 4 * 8, "one evaluation per step per bar");
    assert_eq!(bass.fired(), 32);

    let synth = NodeId::voice(VoiceId::Bass, "synth");
    let roots: Vec<i32> = engine
        .host()
        .triggers_for(&synth)
        .map(|t| t.notes[0])
        .collect();
    let expected: Vec<i32> = [48, 53, 55, 56]
        .iter()
        .flat_map(|root| std::iter::repeat(*root).take(8))
        .collect();
    assert_eq!(roots, expected);
}

#[test]
fn test_eighth_notes_land_on_the_grid() {
    let mut engine = Engine::new(RecordingHost::new());
    engine.init(Some(&two_section_recipe())).unwrap();
    engine.run_bars(1);

    let synth = NodeId::voice(VoiceId::Bass, "synth");
    let times: Vec<f64> = engine
        .host()
        .triggers_for(&synth)
        .map(|t| t.time)
        .collect();
    assert_eq!(times.len(), 8);
    // 120 bpm: an eighth note is 0.25s
    for (i, time) in times.iter().enumerate() {
        assert!(
            (time - i as f64 * 0.25).abs() < 1e-9,
            "step {} at {}",
            i,
            time
        );
    }
}

#[test]
fn test_disabled_section_is_silent() {
    let mut engine = Engine::new(RecordingHost::new());
    engine.init(Some(&two_section_recipe())).unwrap();
    engine.run_bars(4);

    let pad = engine.scheduler().unwrap().task(VoiceId::Pad).unwrap();
    assert_eq!(pad.evaluations(), 4);
    assert_eq!(pad.fired(), 2);

    let synth = NodeId::voice(VoiceId::Pad, "synth");
    let chords: Vec<(f64, Vec<i32>)> = engine
        .host()
        .triggers_for(&synth)
        .map(|t| (t.time, t.notes.clone()))
        .collect();
    assert_eq!(chords.len(), 2);
    assert!((chords[0].0 - 4.0).abs() < 1e-9);
    assert_eq!(chords[0].1, vec![55, 58, 62]);
    assert!((chords[1].0 - 6.0).abs() < 1e-9);
    assert_eq!(chords[1].1, vec![56, 59, 63]);
}

#[test]
fn test_playback_stops_at_end_of_piece() {
    let mut engine = Engine::new(RecordingHost::new());
    engine.init(Some(&two_section_recipe())).unwrap();
    engine.run_bars(6);

    let bass = engine.scheduler().unwrap().task(VoiceId::Bass).unwrap();
    assert_eq!(bass.evaluations(), 48);
    assert_eq!(bass.fired(), 32);
}

// ============================================================================
// Section automation
// ============================================================================

#[test]
fn test_section_cutoff_applies_from_section_start() {
    let mut engine = Engine::new(RecordingHost::new());
    engine.init(Some(&two_section_recipe())).unwrap();
    engine.run_bars(4);

    let cutoff = engine
        .host()
        .timeline(&ParamRef::cutoff(VoiceId::Lead))
        .expect("lead cutoff automated");
    assert!((cutoff.value_at(1.0) - 4000.0).abs() < 1e-9);
    assert!((cutoff.value_at(4.0) - 1200.0).abs() < 1e-9);
    assert!((cutoff.value_at(7.5) - 1200.0).abs() < 1e-9);
}

#[test]
fn test_sweep_ramps_across_section() {
    let recipe = Recipe::from_json_str(
        r#"{
            "type": "ambient",
            "global": {"bpm": 60},
            "progression": ["i"],
            "sections": [
                {"name": "calm", "bars": 1},
                {"name": "build", "bars": 2}
            ],
            "instruments": {
                "riser": {"section_overrides": {
                    "calm": {"enabled": false},
                    "build": {"sweep": {"start_hz": 200, "end_hz": 4200}}
                }}
            }
        }"#,
    )
    .unwrap();

    let mut engine = Engine::new(RecordingHost::new());
    engine.init(Some(&recipe)).unwrap();
    engine.run_bars(3);

    // 60 bpm, 4/4: the build starts at 4s and sweeps for 8s
    let cutoff = engine
        .host()
        .timeline(&ParamRef::cutoff(VoiceId::Riser))
        .unwrap();
    assert!((cutoff.value_at(4.0) - 200.0).abs() < 1e-9);
    assert!((cutoff.value_at(8.0) - 2200.0).abs() < 1e-6);
    assert!((cutoff.value_at(12.0) - 4200.0).abs() < 1e-9);
}

// ============================================================================
// Ducking
// ============================================================================

#[test]
fn test_fast_kicks_never_stack_ducking() {
    let recipe = Recipe::from_json_str(
        r#"{
            "global": {"bpm": 480},
            "progression": ["i"],
            "sections": [{"name": "a", "bars": 2}],
            "instruments": {"bass": {"octave": -1}, "kick": {"steps": 4}}
        }"#,
    )
    .unwrap();

    let mut engine = Engine::new(RecordingHost::new());
    engine.init(Some(&recipe)).unwrap();
    engine.run_bars(2);

    let kick = engine.scheduler().unwrap().task(VoiceId::Kick).unwrap();
    assert_eq!(kick.fired(), 8);

    // 480 bpm puts kicks 0.125s apart, inside the 0.2s release
    let gain = engine.host().timeline(&ParamRef::duck_gain()).unwrap();
    let mut t = 0.0;
    while t < 1.0 {
        let value = gain.value_at(t);
        assert!(
            value >= 0.3 - 1e-9 && value <= 1.0 + 1e-9,
            "duck gain {} at {}",
            value,
            t
        );
        t += 0.001;
    }
    for beat in 0..8 {
        let bottom = beat as f64 * 0.125 + 0.005;
        assert!((gain.value_at(bottom) - 0.3).abs() < 1e-9);
    }
}
