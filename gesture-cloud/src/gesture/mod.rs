//! Gesture estimation
//!
//! Turns noisy per-frame hand landmarks into smoothed control signals.
//! Every signal is a fixed-factor exponential smoother with its own rate;
//! the rates are independent tuning constants, not one shared filter.

use crate::math::lerp;
use crate::ml::{HandLandmarkResult, FINGERTIPS, INDEX_TIP, MIDDLE_MCP, THUMB_TIP, WRIST};

/// Smoothing factors while a hand is visible
pub const OPENNESS_RATE: f32 = 0.25;
pub const PINCH_RATE: f32 = 0.25;
pub const MOVE_RATE: f32 = 0.25;
pub const TWO_HAND_RATE: f32 = 0.18;
/// Two-hand scale relaxing back to 1 while only one hand is visible
pub const ONE_HAND_SCALE_DECAY: f32 = 0.07;

/// Decay factors toward neutral while no hand is visible
pub const IDLE_OPENNESS_DECAY: f32 = 0.1;
pub const IDLE_PINCH_DECAY: f32 = 0.15;
pub const IDLE_MOVE_DECAY: f32 = 0.1;
pub const IDLE_SCALE_DECAY: f32 = 0.06;

/// Openness mapping: `(raw - OFFSET) / RANGE`
const OPENNESS_OFFSET: f32 = 0.18;
const OPENNESS_RANGE: f32 = 0.18;
/// Pinch mapping: `(THRESHOLD - distance) / RANGE`
const PINCH_THRESHOLD: f32 = 0.11;
const PINCH_RANGE: f32 = 0.07;
/// Camera-space to scene-space offsets; the signs mirror x and flip y
const MOVE_X_GAIN: f32 = -2.2;
const MOVE_Y_GAIN: f32 = 1.8;

pub const TWO_HAND_SCALE_MIN: f32 = 0.65;
pub const TWO_HAND_SCALE_MAX: f32 = 2.4;

/// Smoothed gesture signals
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureState {
    /// 0 = closed fist, 1 = fully open
    pub hand_openness: f32,
    /// 0 = apart, 1 = index and thumb touching
    pub pinch_strength: f32,
    /// Horizontal offset in scene units
    pub move_x: f32,
    /// Vertical offset in scene units
    pub move_y: f32,
    /// Scale from the spread between two hands
    pub two_hand_scale: f32,
    /// Hands in the last detection
    pub detected_hands: usize,
}

impl GestureState {
    /// Baseline every signal decays toward
    pub const NEUTRAL: GestureState = GestureState {
        hand_openness: 0.5,
        pinch_strength: 0.0,
        move_x: 0.0,
        move_y: 0.0,
        two_hand_scale: 1.0,
        detected_hands: 0,
    };

    /// Clamp bounded fields into range.
    ///
    /// `f32::clamp` passes NaN through, and a NaN never decays away under
    /// `lerp`, so non-finite fields restart from neutral.
    fn clamped(mut self) -> Self {
        let neutral = Self::NEUTRAL;
        self.hand_openness = finite_or(self.hand_openness, neutral.hand_openness).clamp(0.0, 1.0);
        self.pinch_strength = finite_or(self.pinch_strength, neutral.pinch_strength).clamp(0.0, 1.0);
        self.move_x = finite_or(self.move_x, neutral.move_x);
        self.move_y = finite_or(self.move_y, neutral.move_y);
        self.two_hand_scale = finite_or(self.two_hand_scale, neutral.two_hand_scale)
            .clamp(TWO_HAND_SCALE_MIN, TWO_HAND_SCALE_MAX);
        self
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

impl Default for GestureState {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Owns the gesture state and folds detections into it
#[derive(Debug, Default)]
pub struct GestureEstimator {
    state: GestureState,
}

impl GestureEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an arbitrary state, clamped into bounds
    pub fn with_state(state: GestureState) -> Self {
        Self {
            state: state.clamped(),
        }
    }

    /// Snapshot for this frame
    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = GestureState::NEUTRAL;
    }

    /// Fold one detector result into the state.
    ///
    /// Hands with non-finite landmarks are skipped as if undetected.
    pub fn update(&mut self, result: &HandLandmarkResult) {
        let s = &mut self.state;
        let mut hands = result.hands.iter().filter(|hand| hand.is_finite());
        s.detected_hands = hands.clone().count();

        let Some(hand) = hands.next() else {
            s.hand_openness = lerp(s.hand_openness, GestureState::NEUTRAL.hand_openness, IDLE_OPENNESS_DECAY);
            s.pinch_strength = lerp(s.pinch_strength, 0.0, IDLE_PINCH_DECAY);
            s.move_x = lerp(s.move_x, 0.0, IDLE_MOVE_DECAY);
            s.move_y = lerp(s.move_y, 0.0, IDLE_MOVE_DECAY);
            s.two_hand_scale = lerp(s.two_hand_scale, 1.0, IDLE_SCALE_DECAY);
            self.state = self.state.clamped();
            return;
        };

        let wrist = hand.landmark(WRIST);

        let openness_raw = FINGERTIPS
            .iter()
            .map(|&tip| hand.landmark(tip).distance(wrist))
            .sum::<f32>()
            / FINGERTIPS.len() as f32;
        let openness = ((openness_raw - OPENNESS_OFFSET) / OPENNESS_RANGE).clamp(0.0, 1.0);
        s.hand_openness = lerp(s.hand_openness, openness, OPENNESS_RATE);

        let pinch_distance = hand.landmark(INDEX_TIP).distance(hand.landmark(THUMB_TIP));
        let pinch = ((PINCH_THRESHOLD - pinch_distance) / PINCH_RANGE).clamp(0.0, 1.0);
        s.pinch_strength = lerp(s.pinch_strength, pinch, PINCH_RATE);

        s.move_x = lerp(s.move_x, (wrist.x - 0.5) * MOVE_X_GAIN, MOVE_RATE);
        s.move_y = lerp(s.move_y, (0.5 - wrist.y) * MOVE_Y_GAIN, MOVE_RATE);

        if let Some(other) = hands.next() {
            let spread = hand.landmark(MIDDLE_MCP).distance(other.landmark(MIDDLE_MCP));
            let scale = (0.4 + spread * 2.2).clamp(TWO_HAND_SCALE_MIN, TWO_HAND_SCALE_MAX);
            s.two_hand_scale = lerp(s.two_hand_scale, scale, TWO_HAND_RATE);
        } else {
            s.two_hand_scale = lerp(s.two_hand_scale, 1.0, ONE_HAND_SCALE_DECAY);
        }

        self.state = self.state.clamped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{Hand, HandLandmark, LANDMARK_COUNT, PINKY_TIP, RING_TIP, MIDDLE_TIP};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Hand with every landmark at the wrist, then selected overrides
    fn hand_at(wrist: (f32, f32), overrides: &[(usize, (f32, f32))]) -> Hand {
        let mut landmarks = [HandLandmark::new(wrist.0, wrist.1, 0.0); LANDMARK_COUNT];
        for &(idx, (x, y)) in overrides {
            landmarks[idx] = HandLandmark::new(x, y, 0.0);
        }
        Hand::new(landmarks)
    }

    fn random_hand(rng: &mut StdRng) -> Hand {
        let mut landmarks = [HandLandmark::default(); LANDMARK_COUNT];
        for l in landmarks.iter_mut() {
            *l = HandLandmark::new(
                rng.random_range(-0.5..1.5),
                rng.random_range(-0.5..1.5),
                rng.random_range(-1.0..1.0),
            );
        }
        Hand::new(landmarks)
    }

    #[test]
    fn test_neutral_default() {
        let estimator = GestureEstimator::new();
        assert_eq!(estimator.state(), GestureState::NEUTRAL);
    }

    #[test]
    fn test_decay_converges_monotonically() {
        let mut estimator = GestureEstimator::with_state(GestureState {
            hand_openness: 1.0,
            pinch_strength: 1.0,
            move_x: -1.1,
            move_y: 0.9,
            two_hand_scale: 2.4,
            detected_hands: 2,
        });
        let empty = HandLandmarkResult::empty();

        let mut prev = estimator.state();
        for _ in 0..200 {
            estimator.update(&empty);
            let s = estimator.state();
            assert_eq!(s.detected_hands, 0);

            // Never overshoot the neutral value, always approach it
            assert!(s.hand_openness >= 0.5 && s.hand_openness <= prev.hand_openness);
            assert!(s.pinch_strength >= 0.0 && s.pinch_strength <= prev.pinch_strength);
            assert!(s.move_x <= 0.0 && s.move_x >= prev.move_x);
            assert!(s.move_y >= 0.0 && s.move_y <= prev.move_y);
            assert!(s.two_hand_scale >= 1.0 && s.two_hand_scale <= prev.two_hand_scale);
            prev = s;
        }

        let s = estimator.state();
        let eps = 1e-3;
        assert!((s.hand_openness - 0.5).abs() < eps);
        assert!(s.pinch_strength.abs() < eps);
        assert!(s.move_x.abs() < eps);
        assert!(s.move_y.abs() < eps);
        assert!((s.two_hand_scale - 1.0).abs() < eps);
    }

    #[test]
    fn test_decay_uses_per_field_rates() {
        let mut estimator = GestureEstimator::with_state(GestureState {
            hand_openness: 1.0,
            pinch_strength: 1.0,
            move_x: 1.0,
            move_y: 1.0,
            two_hand_scale: 2.0,
            detected_hands: 1,
        });
        estimator.update(&HandLandmarkResult::empty());
        let s = estimator.state();
        assert!((s.hand_openness - 0.95).abs() < 1e-6);
        assert!((s.pinch_strength - 0.85).abs() < 1e-6);
        assert!((s.move_x - 0.9).abs() < 1e-6);
        assert!((s.two_hand_scale - 1.94).abs() < 1e-6);
    }

    #[test]
    fn test_open_hand_and_pinch() {
        // Fingertips 0.36 from the wrist: fully open. Thumb on the index tip: full pinch.
        let hand = hand_at(
            (0.5, 0.5),
            &[
                (INDEX_TIP, (0.5, 0.14)),
                (MIDDLE_TIP, (0.5, 0.14)),
                (RING_TIP, (0.5, 0.14)),
                (PINKY_TIP, (0.5, 0.14)),
                (THUMB_TIP, (0.5, 0.14)),
            ],
        );
        let result = HandLandmarkResult::from_hands(vec![hand]);

        let mut estimator = GestureEstimator::new();
        estimator.update(&result);
        let s = estimator.state();
        assert_eq!(s.detected_hands, 1);
        assert!((s.hand_openness - lerp(0.5, 1.0, OPENNESS_RATE)).abs() < 1e-5);
        assert!((s.pinch_strength - lerp(0.0, 1.0, PINCH_RATE)).abs() < 1e-5);

        for _ in 0..100 {
            estimator.update(&result);
        }
        let s = estimator.state();
        assert!((s.hand_openness - 1.0).abs() < 1e-4);
        assert!((s.pinch_strength - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_wrist_offset_signs() {
        // Wrist at the top-left of the camera image
        let hand = hand_at((0.0, 0.0), &[]);
        let result = HandLandmarkResult::from_hands(vec![hand]);

        let mut estimator = GestureEstimator::new();
        for _ in 0..100 {
            estimator.update(&result);
        }
        let s = estimator.state();
        // Mirrored: camera-left maps to scene-right, camera-top to scene-up
        assert!((s.move_x - 1.1).abs() < 1e-4);
        assert!((s.move_y - 0.9).abs() < 1e-4);
        // Closed fist
        assert!(s.hand_openness < 1e-4);
    }

    #[test]
    fn test_two_hand_scale() {
        let a = hand_at((0.2, 0.5), &[(MIDDLE_MCP, (0.2, 0.5))]);
        let b = hand_at((0.8, 0.5), &[(MIDDLE_MCP, (0.8, 0.5))]);
        let two = HandLandmarkResult::from_hands(vec![a.clone(), b]);

        let mut estimator = GestureEstimator::new();
        for _ in 0..200 {
            estimator.update(&two);
        }
        // 0.4 + 0.6 * 2.2 = 1.72
        assert!((estimator.state().two_hand_scale - 1.72).abs() < 1e-4);
        assert_eq!(estimator.state().detected_hands, 2);

        // One hand relaxes it back toward 1
        let one = HandLandmarkResult::from_hands(vec![a]);
        estimator.update(&one);
        let expected = lerp(1.72, 1.0, ONE_HAND_SCALE_DECAY);
        assert!((estimator.state().two_hand_scale - expected).abs() < 1e-3);
    }

    #[test]
    fn test_clamp_bounds_for_arbitrary_input() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut estimator = GestureEstimator::new();

        for i in 0..2000 {
            let hands = match i % 3 {
                0 => vec![],
                1 => vec![random_hand(&mut rng)],
                _ => vec![random_hand(&mut rng), random_hand(&mut rng)],
            };
            estimator.update(&HandLandmarkResult::from_hands(hands));
            let s = estimator.state();
            assert!((0.0..=1.0).contains(&s.hand_openness));
            assert!((0.0..=1.0).contains(&s.pinch_strength));
            assert!((TWO_HAND_SCALE_MIN..=TWO_HAND_SCALE_MAX).contains(&s.two_hand_scale));
        }
    }

    #[test]
    fn test_with_state_clamps() {
        let estimator = GestureEstimator::with_state(GestureState {
            hand_openness: 3.0,
            pinch_strength: -1.0,
            two_hand_scale: 10.0,
            ..GestureState::NEUTRAL
        });
        let s = estimator.state();
        assert_eq!(s.hand_openness, 1.0);
        assert_eq!(s.pinch_strength, 0.0);
        assert_eq!(s.two_hand_scale, TWO_HAND_SCALE_MAX);
    }

    #[test]
    fn test_non_finite_landmarks_never_poison_state() {
        let mut bad = hand_at((0.5, 0.5), &[]);
        bad.landmarks[INDEX_TIP].x = f32::NAN;

        let mut estimator = GestureEstimator::new();
        estimator.update(&HandLandmarkResult::from_hands(vec![bad.clone()]));
        assert_eq!(estimator.state().detected_hands, 0);

        // A corrupt second hand is dropped, the good one still counts
        let good = hand_at((0.2, 0.5), &[]);
        estimator.update(&HandLandmarkResult::from_hands(vec![bad, good]));
        assert_eq!(estimator.state().detected_hands, 1);

        let empty = HandLandmarkResult::empty();
        for _ in 0..500 {
            estimator.update(&empty);
        }
        let s = estimator.state();
        assert!(s.hand_openness.is_finite() && (0.0..=1.0).contains(&s.hand_openness));
        assert!(s.pinch_strength.is_finite() && (0.0..=1.0).contains(&s.pinch_strength));
        assert!(s.move_x.is_finite() && s.move_y.is_finite());
        assert!((TWO_HAND_SCALE_MIN..=TWO_HAND_SCALE_MAX).contains(&s.two_hand_scale));
        assert!((s.hand_openness - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_with_state_replaces_non_finite() {
        let estimator = GestureEstimator::with_state(GestureState {
            hand_openness: f32::NAN,
            pinch_strength: f32::INFINITY,
            move_x: f32::NEG_INFINITY,
            move_y: f32::NAN,
            two_hand_scale: f32::NAN,
            detected_hands: 0,
        });
        assert_eq!(estimator.state(), GestureState::NEUTRAL);
    }
}
