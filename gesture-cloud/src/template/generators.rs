//! Procedural point generators, one per preset.
//!
//! Every generator returns its raw point set; the size depends on the shape
//! and is reconciled with the particle count by [`super::resample`].

use std::f32::consts::TAU;

use rand::{Rng, RngCore};

use super::Point3;
use crate::math::centered_noise;

/// Samples along the heart curve
pub const HEART_STEPS: usize = 1400;
/// Samples along the rose curve
pub const FLOWER_STEPS: usize = 2200;
/// Points on the planet body
pub const SATURN_SPHERE_POINTS: usize = 2500;
/// Points on the ring
pub const SATURN_RING_POINTS: usize = 2600;
/// Number of firework bursts
pub const FIREWORK_BURSTS: usize = 7;
/// Concentric rings in the HUD
pub const JARVIS_RINGS: usize = 14;
/// Scattered points in the outer shell of the HUD
pub const JARVIS_SHELL_POINTS: usize = 1200;

const HEART_SCALE: f32 = 0.08;
const FLOWER_PETALS: f32 = 6.0;
const FLOWER_SCALE: f32 = 1.15;

/// Heart curve `x = 16 sin³t`, `y = 13 cos t - 5 cos 2t - 2 cos 3t - cos 4t`.
pub fn heart(_count: usize, _rng: &mut dyn RngCore) -> Vec<Point3> {
    (0..HEART_STEPS)
        .map(|i| {
            let t = i as f32 / HEART_STEPS as f32 * TAU;
            let x = 16.0 * t.sin().powi(3);
            let y = 13.0 * t.cos()
                - 5.0 * (2.0 * t).cos()
                - 2.0 * (3.0 * t).cos()
                - (4.0 * t).cos();
            Point3::new(x * HEART_SCALE, y * HEART_SCALE, 0.0)
        })
        .collect()
}

/// Six-petal polar rose `r = 1.1 sin(6θ) + 0.8`.
pub fn flower(_count: usize, _rng: &mut dyn RngCore) -> Vec<Point3> {
    (0..FLOWER_STEPS)
        .map(|i| {
            let a = i as f32 / FLOWER_STEPS as f32 * TAU;
            let r = 1.1 * (FLOWER_PETALS * a).sin() + 0.8;
            Point3::new(a.cos() * r * FLOWER_SCALE, a.sin() * r * FLOWER_SCALE, 0.0)
        })
        .collect()
}

/// Shell sphere plus a flattened ring.
pub fn saturn(_count: usize, rng: &mut dyn RngCore) -> Vec<Point3> {
    let mut points = Vec::with_capacity(SATURN_SPHERE_POINTS + SATURN_RING_POINTS);

    // Uniform over solid angle: polar angle from acos of a uniform cosine
    for _ in 0..SATURN_SPHERE_POINTS {
        let u = rng.random::<f32>() * TAU;
        let v = (2.0 * rng.random::<f32>() - 1.0).acos();
        let r = 1.2 + centered_noise(rng, 0.15);
        points.push(Point3::new(
            r * v.sin() * u.cos(),
            r * v.cos(),
            r * v.sin() * u.sin(),
        ));
    }

    for _ in 0..SATURN_RING_POINTS {
        let a = rng.random::<f32>() * TAU;
        let ring_r = 2.0 + centered_noise(rng, 0.34);
        points.push(Point3::new(
            a.cos() * ring_r,
            centered_noise(rng, 0.08),
            a.sin() * ring_r * 0.8,
        ));
    }

    points
}

/// Spherical bursts around random centers, `count / 7` points each.
pub fn fireworks(count: usize, rng: &mut dyn RngCore) -> Vec<Point3> {
    let per_burst = count / FIREWORK_BURSTS;
    let mut points = Vec::with_capacity(per_burst * FIREWORK_BURSTS);

    for _ in 0..FIREWORK_BURSTS {
        let center = Point3::new(
            centered_noise(rng, 3.5),
            (rng.random::<f32>() - 0.2) * 2.8,
            centered_noise(rng, 2.0),
        );
        for _ in 0..per_burst {
            let dir = Point3::new(
                centered_noise(rng, 1.0),
                centered_noise(rng, 1.0),
                centered_noise(rng, 1.0),
            )
            .try_normalize()
            .unwrap_or(Point3::Y);
            let dist = rng.random::<f32>() * 1.25;
            points.push(center + dir * dist);
        }
    }

    // Fewer than seven particles leaves every burst empty
    if points.is_empty() {
        points.push(Point3::ZERO);
    }

    points
}

/// Concentric pulsing rings with a loose outer shell.
pub fn jarvis(_count: usize, rng: &mut dyn RngCore) -> Vec<Point3> {
    let mut points = Vec::new();

    for r in 0..JARVIS_RINGS {
        let ring_r = 0.45 + r as f32 * 0.16;
        let y = (r as f32 - JARVIS_RINGS as f32 / 2.0) * 0.06;
        let segments = 120 + r * 8;
        for i in 0..segments {
            let a = i as f32 / segments as f32 * TAU;
            let pulse = 1.0 + (a * 4.0 + r as f32).sin() * 0.05;
            points.push(Point3::new(a.cos() * ring_r * pulse, y, a.sin() * ring_r));
        }
    }

    for _ in 0..JARVIS_SHELL_POINTS {
        let a = rng.random::<f32>() * TAU;
        let r = 2.2 + rng.random::<f32>() * 0.9;
        points.push(Point3::new(a.cos() * r, centered_noise(rng, 1.8), a.sin() * r));
    }

    points
}

/// Number of points in the HUD rings, excluding the shell.
pub fn jarvis_ring_points() -> usize {
    (0..JARVIS_RINGS).map(|r| 120 + r * 8).sum()
}
