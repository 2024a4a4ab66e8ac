//! Orbit view around the particle cloud
//!
//! Mouse drags feed a rotation delta that is applied gradually, so the view
//! keeps gliding for a moment after the drag ends. Pan and zoom are fixed.

use std::f32::consts::PI;

use glam::{Mat4, Vec3};

/// Default eye position, looking at the origin
pub const DEFAULT_EYE: Vec3 = Vec3::new(0.0, 0.4, 6.2);
pub const FOV_DEGREES: f32 = 60.0;
pub const NEAR: f32 = 0.01;
pub const FAR: f32 = 100.0;
/// Share of the pending rotation applied per frame
pub const DAMPING: f32 = 0.05;

/// Keeps the polar angle off the poles
const POLAR_EPSILON: f32 = 1e-6;

/// Damped orbit camera in spherical coordinates
#[derive(Clone, Debug)]
pub struct OrbitView {
    /// Angle around the Y axis, 0 looks down -Z
    azimuth: f32,
    /// Angle from +Y
    polar: f32,
    distance: f32,
    target: Vec3,
    /// Rotation still to be applied
    pending_azimuth: f32,
    pending_polar: f32,
    aspect: f32,
    fov: f32,
}

impl OrbitView {
    pub fn new(aspect: f32) -> Self {
        let distance = DEFAULT_EYE.length();
        Self {
            azimuth: DEFAULT_EYE.x.atan2(DEFAULT_EYE.z),
            polar: (DEFAULT_EYE.y / distance).clamp(-1.0, 1.0).acos(),
            distance,
            target: Vec3::ZERO,
            pending_azimuth: 0.0,
            pending_polar: 0.0,
            aspect: sanitize_aspect(aspect),
            fov: FOV_DEGREES.to_radians(),
        }
    }

    /// Queue a rotation for a drag of `(dx, dy)` pixels.
    ///
    /// A drag across the full viewport height turns the view once around.
    pub fn on_mouse_drag(&mut self, delta: (f32, f32), viewport_height: f32) {
        let height = viewport_height.max(1.0);
        self.pending_azimuth -= 2.0 * PI * delta.0 / height;
        self.pending_polar -= 2.0 * PI * delta.1 / height;
    }

    /// Apply one frame of damped rotation
    pub fn update(&mut self) {
        self.azimuth += self.pending_azimuth * DAMPING;
        self.polar = (self.polar + self.pending_polar * DAMPING)
            .clamp(POLAR_EPSILON, PI - POLAR_EPSILON);

        self.pending_azimuth *= 1.0 - DAMPING;
        self.pending_polar *= 1.0 - DAMPING;
    }

    /// Update aspect ratio on resize
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = sanitize_aspect(aspect);
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    pub fn polar(&self) -> f32 {
        self.polar
    }

    /// Calculate camera position from spherical coordinates
    pub fn eye_position(&self) -> Vec3 {
        let (sin_polar, cos_polar) = self.polar.sin_cos();
        let (sin_azimuth, cos_azimuth) = self.azimuth.sin_cos();
        self.target
            + Vec3::new(
                sin_polar * sin_azimuth,
                cos_polar,
                sin_polar * cos_azimuth,
            ) * self.distance
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye_position(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, NEAR, FAR)
    }
}

fn sanitize_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_eye() {
        let view = OrbitView::new(16.0 / 9.0);
        let eye = view.eye_position();
        assert!(eye.distance(DEFAULT_EYE) < 1e-4, "{eye:?}");
    }

    #[test]
    fn test_drag_is_damped() {
        let mut view = OrbitView::new(1.0);
        view.on_mouse_drag((100.0, 0.0), 800.0);

        view.update();
        let expected_total = -2.0 * PI * 100.0 / 800.0;
        let first = view.azimuth();
        assert!((first - expected_total * DAMPING).abs() < 1e-6);

        for _ in 0..600 {
            view.update();
        }
        // The whole drag is applied eventually
        assert!((view.azimuth() - expected_total).abs() < 1e-4);
    }

    #[test]
    fn test_polar_clamped() {
        let mut view = OrbitView::new(1.0);
        view.on_mouse_drag((0.0, -10_000.0), 100.0);
        for _ in 0..400 {
            view.update();
            assert!(view.polar() > 0.0 && view.polar() < PI);
        }
        // Still a valid view matrix at the pole
        assert!(view.view_matrix().is_finite());
    }

    #[test]
    fn test_invalid_aspect_ignored() {
        let mut view = OrbitView::new(0.0);
        assert_eq!(view.aspect(), 1.0);
        view.set_aspect(2.0);
        assert_eq!(view.aspect(), 2.0);
        view.set_aspect(f32::NAN);
        assert_eq!(view.aspect(), 1.0);
    }

    #[test]
    fn test_origin_projects_to_center() {
        let view = OrbitView::new(1.5);
        let clip = view.projection_matrix() * view.view_matrix() * glam::Vec4::W;
        assert!((clip.x / clip.w).abs() < 1e-5);
        assert!((clip.y / clip.w).abs() < 1e-5);
        // w is the view-space depth
        assert!((clip.w - DEFAULT_EYE.length()).abs() < 1e-4);
    }
}
