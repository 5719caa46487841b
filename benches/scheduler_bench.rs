//! Benchmarks for pattern generation and event scheduling
//!
//! Run with: cargo bench --bench scheduler_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tonegraph::euclid::{euclidean, generate_pattern, PatternKind};
use tonegraph::scheduler::Scheduler;
use tonegraph::{resolve, EngineSettings, Recipe, RecordingHost};

fn full_band() -> Recipe {
    Recipe::from_json_str(
        r#"{
            "global": {"bpm": 110, "key": "E", "seed": 7},
            "progression": ["i", "VI", "III", "VII"],
            "sections": [{"name": "a", "bars": 16}, {"name": "b", "bars": 16}],
            "instruments": {
                "bass": {"octave": -1},
                "pad": {"octave": 0},
                "arp": {"pattern": "random", "steps": 16},
                "lead": {"melody": [0, 2, null, 4, 7, null, 4, 2], "rhythm": "8n"},
                "kick": {"pattern": {"euclid": {"pulses": 5}}, "steps": 16, "subdivision": "16n"},
                "snare": {"steps": 4},
                "hat": {"steps": 16, "subdivision": "16n"}
            }
        }"#,
    )
    .expect("bench recipe parses")
}

fn bench_euclidean(c: &mut Criterion) {
    let mut group = c.benchmark_group("euclidean");

    for steps in [8usize, 16, 64] {
        group.bench_function(BenchmarkId::new("bjorklund", steps), |b| {
            b.iter(|| euclidean(black_box(steps), black_box(steps * 3 / 8)))
        });
    }

    group.bench_function("random_16", |b| {
        let kind = PatternKind::Random {
            rest_probability: 0.3,
            seed: 42,
        };
        b.iter(|| generate_pattern(black_box(&kind), 16, None))
    });

    group.finish();
}

fn bench_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");
    group.sample_size(50);

    let settings = EngineSettings::default();
    let config = resolve(&full_band(), &settings).expect("bench recipe resolves");

    group.bench_function("full_band_32_bars", |b| {
        b.iter(|| {
            let mut host = RecordingHost::new();
            let mut scheduler = Scheduler::new(config.clone(), &settings);
            scheduler.start(&mut host, 0.0);
            black_box(scheduler.run_bars(&mut host, 32))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_euclidean, bench_scheduler);
criterion_main!(benches);
