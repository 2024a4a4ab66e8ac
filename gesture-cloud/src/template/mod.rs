//! Shape templates
//!
//! A template is the point cloud the particles currently morph toward. Each
//! [`Preset`] maps to a [`PresetProfile`] holding its generator and its
//! per-preset motion tuning, so the frame loop never branches on names.

pub mod generators;
mod resample;

pub use resample::resample;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// 3D point used for templates and particle positions
pub type Point3 = glam::Vec3;

/// Default number of particles in the cloud
pub const DEFAULT_PARTICLE_COUNT: usize = 5000;

/// Generator signature: `(particle_count, rng) -> raw points`
pub type GeneratorFn = fn(usize, &mut dyn RngCore) -> Vec<Point3>;

/// Template construction errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("cannot resample an empty point set")]
    EmptyPointSet,
    #[error("template has {actual} points, expected {expected}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Shape presets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Heart,
    Flower,
    Saturn,
    Fireworks,
    Jarvis,
}

impl Preset {
    /// All presets in selector order
    pub const ALL: [Preset; 5] = [
        Preset::Heart,
        Preset::Flower,
        Preset::Saturn,
        Preset::Fireworks,
        Preset::Jarvis,
    ];

    /// Get display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            Preset::Heart => "Heart",
            Preset::Flower => "Flower",
            Preset::Saturn => "Saturn",
            Preset::Fireworks => "Fireworks",
            Preset::Jarvis => "Jarvis",
        }
    }

    /// Preset for a zero-based selector index
    pub fn from_index(index: usize) -> Option<Preset> {
        Self::ALL.get(index).copied()
    }

    /// Generator and motion tuning for this preset
    pub fn profile(&self) -> PresetProfile {
        match self {
            Preset::Heart => PresetProfile {
                generator: generators::heart,
                z_spread: 0.28,
                jitter_target: CALM_JITTER,
                jitter_relax: 0.07,
                secondary: SecondaryMotion::None,
            },
            Preset::Flower => PresetProfile {
                generator: generators::flower,
                z_spread: 0.32,
                jitter_target: CALM_JITTER,
                jitter_relax: 0.07,
                secondary: SecondaryMotion::None,
            },
            Preset::Saturn => PresetProfile {
                generator: generators::saturn,
                z_spread: 0.12,
                jitter_target: CALM_JITTER,
                jitter_relax: 0.07,
                secondary: SecondaryMotion::None,
            },
            Preset::Fireworks => PresetProfile {
                generator: generators::fireworks,
                z_spread: 0.22,
                jitter_target: 0.03,
                jitter_relax: 0.05,
                secondary: SecondaryMotion::Roll {
                    base: 0.004,
                    impulse_gain: 0.02,
                },
            },
            Preset::Jarvis => PresetProfile {
                generator: generators::jarvis,
                z_spread: 0.18,
                jitter_target: 0.012,
                jitter_relax: 0.07,
                secondary: SecondaryMotion::ExtraYaw(0.01),
            },
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Jitter strength the cloud settles to outside the lively presets
pub const CALM_JITTER: f32 = 0.008;

/// Extra rotation applied on top of the global drift
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SecondaryMotion {
    None,
    /// Roll drift per frame, `base + impulse * impulse_gain`
    Roll { base: f32, impulse_gain: f32 },
    /// Constant extra yaw per frame
    ExtraYaw(f32),
}

/// Per-preset generator and tuning
#[derive(Clone, Copy, Debug)]
pub struct PresetProfile {
    pub generator: GeneratorFn,
    /// Depth variance added while resampling
    pub z_spread: f32,
    /// Jitter strength the animation relaxes toward
    pub jitter_target: f32,
    /// Smoothing factor for that relaxation
    pub jitter_relax: f32,
    pub secondary: SecondaryMotion,
}

/// Morph target with exactly one point per particle
#[derive(Clone, Debug)]
pub struct Template {
    preset: Preset,
    points: Vec<Point3>,
}

impl Template {
    /// Generate and resample the template for `preset`.
    pub fn build(preset: Preset, count: usize, rng: &mut dyn RngCore) -> Result<Self, TemplateError> {
        let profile = preset.profile();
        let raw = (profile.generator)(count, rng);
        let points = resample(&raw, count, profile.z_spread, rng)?;

        log::debug!(
            "Built {} template: {} raw points -> {} particles",
            preset,
            raw.len(),
            points.len()
        );

        Ok(Self { preset, points })
    }

    /// Preset that produced this template
    pub fn preset(&self) -> Preset {
        self.preset
    }

    /// Template name, same as the preset's display name
    pub fn name(&self) -> &'static str {
        self.preset.display_name()
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_every_preset_fills_particle_count() {
        let mut rng = StdRng::seed_from_u64(11);
        for preset in Preset::ALL {
            for count in [1, 700, DEFAULT_PARTICLE_COUNT] {
                let template = Template::build(preset, count, &mut rng).unwrap();
                assert_eq!(template.len(), count, "{preset} with {count}");
                assert_eq!(template.preset(), preset);
            }
        }
    }

    #[test]
    fn test_heart_template_deterministic_origin() {
        let mut rng = StdRng::seed_from_u64(12);
        let raw = generators::heart(1400, &mut rng);
        let points = resample(&raw, 1400, 0.0, &mut rng).unwrap();
        assert!(points[0].x.abs() < 1e-6);
        assert!((points[0].y - 0.4).abs() < 1e-5);
        assert!(points[0].z.abs() < 1e-6);
    }

    #[test]
    fn test_preset_profiles() {
        assert_eq!(Preset::Heart.profile().z_spread, 0.28);
        assert_eq!(Preset::Flower.profile().z_spread, 0.32);
        assert_eq!(Preset::Saturn.profile().z_spread, 0.12);
        assert_eq!(Preset::Fireworks.profile().z_spread, 0.22);
        assert_eq!(Preset::Jarvis.profile().z_spread, 0.18);

        assert_eq!(Preset::Fireworks.profile().jitter_target, 0.03);
        assert_eq!(Preset::Jarvis.profile().jitter_target, 0.012);
        assert_eq!(Preset::Saturn.profile().jitter_target, CALM_JITTER);
        assert_eq!(Preset::Jarvis.profile().secondary, SecondaryMotion::ExtraYaw(0.01));
    }

    #[test]
    fn test_preset_index_and_serde() {
        assert_eq!(Preset::from_index(0), Some(Preset::Heart));
        assert_eq!(Preset::from_index(4), Some(Preset::Jarvis));
        assert_eq!(Preset::from_index(5), None);

        let json = serde_json::to_string(&Preset::Fireworks).unwrap();
        assert_eq!(json, "\"fireworks\"");
        let back: Preset = serde_json::from_str("\"saturn\"").unwrap();
        assert_eq!(back, Preset::Saturn);
    }
}
