//! Per-frame particle animation
//!
//! [`AnimationContext`] holds everything that persists between frames. The
//! frame update is [`step`]: read a gesture snapshot and the active template,
//! pull each particle toward its gesture-scaled target, then advance the
//! rotation drift, jitter relaxation, and colors.

pub mod clock;

pub use clock::FrameClock;

use std::sync::Arc;

use rand::Rng;

use crate::color::{self, Palette};
use crate::gesture::GestureState;
use crate::math::{centered_noise, lerp};
use crate::template::{Point3, SecondaryMotion, Template, TemplateError, CALM_JITTER};

/// Particle smoothing factor toward its target
pub const POSITION_RATE: f32 = 0.08;
/// Impulse smoothing factor toward pinch strength
pub const IMPULSE_RATE: f32 = 0.2;
/// Jitter multiplier at full impulse is `1 + IMPULSE_JITTER_GAIN`
pub const IMPULSE_JITTER_GAIN: f32 = 1.8;

/// Hand openness maps linearly onto this scale range
pub const OPENNESS_SCALE_MIN: f32 = 0.55;
pub const OPENNESS_SCALE_MAX: f32 = 1.45;

const BASE_YAW_DRIFT: f32 = 0.002;
const IMPULSE_YAW_GAIN: f32 = 0.01;
const PITCH_AMPLITUDE: f32 = 0.12;
const PITCH_FREQUENCY: f32 = 0.35;
const PITCH_MOVE_GAIN: f32 = 0.1;

/// Initial particles are scattered in a cube of this edge length
const INITIAL_SPREAD: f32 = 3.0;

/// Cloud orientation in radians, applied in XYZ order
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotation {
    /// Model matrix for the renderer
    pub fn to_mat4(self) -> glam::Mat4 {
        glam::Mat4::from_euler(glam::EulerRot::XYZ, self.pitch, self.yaw, self.roll)
    }
}

/// Animation state owned by the frame loop
pub struct AnimationContext {
    positions: Vec<Point3>,
    colors: Vec<[f32; 3]>,
    /// Active morph target, swapped whole
    template: Arc<Template>,
    palette: Palette,
    /// User scale on top of the gesture scale
    pub global_scale: f32,
    impulse: f32,
    jitter: f32,
    rotation: Rotation,
    elapsed: f32,
    frame: u64,
}

impl AnimationContext {
    /// Scatter particles randomly around the origin, one per template point.
    pub fn new<R: Rng + ?Sized>(template: Arc<Template>, palette: Palette, rng: &mut R) -> Self {
        let count = template.len();
        let positions = (0..count)
            .map(|_| {
                Point3::new(
                    centered_noise(rng, INITIAL_SPREAD),
                    centered_noise(rng, INITIAL_SPREAD),
                    centered_noise(rng, INITIAL_SPREAD),
                )
            })
            .collect();

        let mut colors = vec![[0.0; 3]; count];
        color::refresh(&mut colors, &palette, 0.0);

        Self {
            positions,
            colors,
            template,
            palette,
            global_scale: 1.0,
            impulse: 0.0,
            jitter: CALM_JITTER,
            rotation: Rotation::default(),
            elapsed: 0.0,
            frame: 0,
        }
    }

    /// Replace the active template. The particle count never changes.
    pub fn set_template(&mut self, template: Arc<Template>) -> Result<(), TemplateError> {
        if template.len() != self.positions.len() {
            return Err(TemplateError::CountMismatch {
                expected: self.positions.len(),
                actual: template.len(),
            });
        }
        log::info!("Morphing to {} template", template.name());
        self.template = template;
        Ok(())
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[Point3] {
        &self.positions
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn impulse(&self) -> f32 {
        self.impulse
    }

    pub fn jitter(&self) -> f32 {
        self.jitter
    }

    /// Seconds of animation time
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

/// Advance the animation by one frame of `dt` seconds.
pub fn step<R: Rng + ?Sized>(ctx: &mut AnimationContext, dt: f32, gesture: &GestureState, rng: &mut R) {
    ctx.elapsed += dt;
    ctx.frame += 1;

    // Read the active template once for the whole frame
    let template = Arc::clone(&ctx.template);
    let profile = template.preset().profile();

    let openness_scale = lerp(OPENNESS_SCALE_MIN, OPENNESS_SCALE_MAX, gesture.hand_openness);
    let dynamic_scale = openness_scale * gesture.two_hand_scale * ctx.global_scale;

    ctx.impulse = lerp(ctx.impulse, gesture.pinch_strength, IMPULSE_RATE);
    let impulse_boost = 1.0 + ctx.impulse * IMPULSE_JITTER_GAIN;
    let jitter_span = ctx.jitter * impulse_boost;

    let offset = Point3::new(gesture.move_x, gesture.move_y, 0.0);
    for (pos, point) in ctx.positions.iter_mut().zip(template.points()) {
        let target = *point * dynamic_scale + offset;
        let noisy = target
            + Point3::new(
                centered_noise(rng, jitter_span),
                centered_noise(rng, jitter_span),
                centered_noise(rng, jitter_span),
            );
        *pos = pos.lerp(noisy, POSITION_RATE);
    }

    let rotation = &mut ctx.rotation;
    rotation.yaw += BASE_YAW_DRIFT + ctx.impulse * IMPULSE_YAW_GAIN;
    rotation.pitch =
        (ctx.elapsed * PITCH_FREQUENCY).sin() * PITCH_AMPLITUDE + gesture.move_y * PITCH_MOVE_GAIN;

    match profile.secondary {
        SecondaryMotion::None => {}
        SecondaryMotion::Roll { base, impulse_gain } => {
            rotation.roll += base + ctx.impulse * impulse_gain;
        }
        SecondaryMotion::ExtraYaw(yaw) => {
            rotation.yaw += yaw;
        }
    }
    ctx.jitter = lerp(ctx.jitter, profile.jitter_target, profile.jitter_relax);

    color::refresh(&mut ctx.colors, &ctx.palette, ctx.elapsed);
}
