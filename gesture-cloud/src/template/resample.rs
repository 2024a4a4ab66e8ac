//! Cyclic resampling of raw generator output to a fixed particle count.

use rand::RngCore;

use super::{Point3, TemplateError};
use crate::math::centered_noise;

/// Produce exactly `count` points from `raw`.
///
/// Output `i` copies `raw[i % raw.len()]` and adds uniform noise in
/// `[-z_spread / 2, z_spread / 2)` to its z coordinate. x and y are untouched.
pub fn resample(
    raw: &[Point3],
    count: usize,
    z_spread: f32,
    rng: &mut dyn RngCore,
) -> Result<Vec<Point3>, TemplateError> {
    if raw.is_empty() {
        return Err(TemplateError::EmptyPointSet);
    }

    let points = (0..count)
        .map(|i| {
            let mut p = raw[i % raw.len()];
            p.z += centered_noise(rng, z_spread);
            p
        })
        .collect();

    Ok(points)
}
