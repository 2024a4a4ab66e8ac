//! Small scalar helpers shared by the gesture and animation code.

use rand::Rng;

/// Linear interpolation, `a + (b - a) * t`.
///
/// With a constant `t` in (0, 1) this is a fixed-factor exponential smoother.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Uniform noise centered on zero, in `[-span / 2, span / 2)`.
#[inline]
pub fn centered_noise<R: Rng + ?Sized>(rng: &mut R, span: f32) -> f32 {
    (rng.random::<f32>() - 0.5) * span
}
