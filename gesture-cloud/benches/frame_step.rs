use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use gesture_cloud::animation::{step, AnimationContext};
use gesture_cloud::color::Palette;
use gesture_cloud::gesture::GestureState;
use gesture_cloud::template::{Preset, Template, DEFAULT_PARTICLE_COUNT};

fn bench_step(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let template = Template::build(Preset::Saturn, DEFAULT_PARTICLE_COUNT, &mut rng)
        .expect("built-in generators are never empty");
    let mut ctx = AnimationContext::new(Arc::new(template), Palette::default(), &mut rng);
    let gesture = GestureState {
        hand_openness: 0.8,
        pinch_strength: 0.4,
        move_x: 0.2,
        ..GestureState::NEUTRAL
    };

    c.bench_function("step_5000_particles", |b| {
        b.iter(|| step(&mut ctx, black_box(1.0 / 60.0), black_box(&gesture), &mut rng))
    });
}

fn bench_template_build(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    c.bench_function("build_jarvis_template", |b| {
        b.iter(|| Template::build(Preset::Jarvis, DEFAULT_PARTICLE_COUNT, &mut rng))
    });
}

criterion_group!(benches, bench_step, bench_template_build);
criterion_main!(benches);
