//! Palm detection stage
//!
//! Decodes the SSD-style palm detector (192x192 input, 2016 anchors) into
//! palm boxes, suppresses overlaps, and turns each palm into a rotated square
//! region that the landmark model is run on.

use std::f32::consts::PI;

/// Input resolution of the palm model
pub const PALM_INPUT_SIZE: u32 = 192;
/// Anchors produced by `generate_anchors`
pub const ANCHOR_COUNT: usize = 2016;
/// Regressor values per anchor: box (cx, cy, w, h) then 7 keypoints
pub const REGRESSOR_STRIDE: usize = 18;
pub const PALM_KEYPOINTS: usize = 7;

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
pub const NMS_IOU_THRESHOLD: f32 = 0.3;
/// Hands tracked per frame
pub const MAX_HANDS: usize = 2;

/// Palm keypoints that orient the hand region
const KEYPOINT_WRIST: usize = 0;
const KEYPOINT_MIDDLE_MCP: usize = 2;

/// The palm box grows and shifts toward the fingers to cover the whole hand
const ROI_SCALE: f32 = 2.6;
const ROI_SHIFT_Y: f32 = -0.5;

/// (stride, anchors per grid cell). Layers sharing a stride are merged.
const ANCHOR_LAYERS: [(u32, usize); 2] = [(8, 2), (16, 6)];

/// Anchor center, normalized to the palm input
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    pub cx: f32,
    pub cy: f32,
}

/// Fixed-size SSD anchors in the order the palm model emits them
pub fn generate_anchors() -> Vec<Anchor> {
    let mut anchors = Vec::with_capacity(ANCHOR_COUNT);
    for (stride, per_cell) in ANCHOR_LAYERS {
        let grid = PALM_INPUT_SIZE / stride;
        for y in 0..grid {
            for x in 0..grid {
                let anchor = Anchor {
                    cx: (x as f32 + 0.5) / grid as f32,
                    cy: (y as f32 + 0.5) / grid as f32,
                };
                anchors.extend(std::iter::repeat(anchor).take(per_cell));
            }
        }
    }
    anchors
}

/// One palm, normalized to the square palm input
#[derive(Clone, Debug, PartialEq)]
pub struct PalmDetection {
    pub score: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
    pub keypoints: [(f32, f32); PALM_KEYPOINTS],
}

impl PalmDetection {
    fn is_valid(&self) -> bool {
        let coords_finite = [self.cx, self.cy, self.width, self.height]
            .iter()
            .chain(self.keypoints.iter().flat_map(|(x, y)| [x, y]))
            .all(|v| v.is_finite());
        coords_finite && self.width > 0.0 && self.height > 0.0
    }

    /// Intersection over union of the two boxes
    pub fn iou(&self, other: &PalmDetection) -> f32 {
        let overlap = |a_center: f32, a_size: f32, b_center: f32, b_size: f32| {
            let lo = (a_center - a_size / 2.0).max(b_center - b_size / 2.0);
            let hi = (a_center + a_size / 2.0).min(b_center + b_size / 2.0);
            (hi - lo).max(0.0)
        };
        let inter = overlap(self.cx, self.width, other.cx, other.width)
            * overlap(self.cy, self.height, other.cy, other.height);
        let union = self.width * self.height + other.width * other.height - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-100.0, 100.0)).exp())
}

/// Decode raw palm model output.
///
/// `regressors` holds `REGRESSOR_STRIDE` values per anchor in input pixels,
/// `scores` one logit per anchor. Detections below `threshold` or with
/// non-finite values are dropped.
pub fn decode_detections(
    regressors: &[f32],
    scores: &[f32],
    anchors: &[Anchor],
    threshold: f32,
) -> Vec<PalmDetection> {
    let size = PALM_INPUT_SIZE as f32;

    anchors
        .iter()
        .zip(scores)
        .zip(regressors.chunks_exact(REGRESSOR_STRIDE))
        .filter_map(|((anchor, &logit), reg)| {
            let score = sigmoid(logit);
            // Also rejects NaN logits
            if !(score >= threshold) {
                return None;
            }

            let mut keypoints = [(0.0, 0.0); PALM_KEYPOINTS];
            for (k, point) in keypoints.iter_mut().enumerate() {
                *point = (
                    reg[4 + 2 * k] / size + anchor.cx,
                    reg[5 + 2 * k] / size + anchor.cy,
                );
            }

            let detection = PalmDetection {
                score,
                cx: reg[0] / size + anchor.cx,
                cy: reg[1] / size + anchor.cy,
                width: reg[2] / size,
                height: reg[3] / size,
                keypoints,
            };
            detection.is_valid().then_some(detection)
        })
        .collect()
}

/// Greedy non-maximum suppression, best score first, at most `max_count` kept
pub fn non_max_suppression(
    mut detections: Vec<PalmDetection>,
    iou_threshold: f32,
    max_count: usize,
) -> Vec<PalmDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<PalmDetection> = Vec::with_capacity(max_count);
    for detection in detections {
        if kept.len() >= max_count {
            break;
        }
        if kept.iter().all(|k| k.iou(&detection) <= iou_threshold) {
            kept.push(detection);
        }
    }
    kept
}

/// Centered square padding around a frame, so the palm model sees it
/// without distortion
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    side: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        let (w, h) = (frame_width as f32, frame_height as f32);
        let side = w.max(h);
        Self {
            side,
            pad_x: (side - w) / 2.0,
            pad_y: (side - h) / 2.0,
        }
    }

    pub fn side(&self) -> f32 {
        self.side
    }

    /// Square-normalized point to frame pixels
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.side - self.pad_x, y * self.side - self.pad_y)
    }
}

/// Rotated square crop around one hand, in frame pixels.
///
/// `rotation` is in radians, clockwise in image coordinates; zero means the
/// fingers point up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandRegion {
    pub center_x: f32,
    pub center_y: f32,
    pub size: f32,
    pub rotation: f32,
}

impl HandRegion {
    pub fn from_detection(detection: &PalmDetection, letterbox: &Letterbox) -> Self {
        let (cx, cy) = letterbox.to_frame(detection.cx, detection.cy);
        let width = detection.width * letterbox.side();
        let height = detection.height * letterbox.side();

        let (x0, y0) = letterbox.to_frame(
            detection.keypoints[KEYPOINT_WRIST].0,
            detection.keypoints[KEYPOINT_WRIST].1,
        );
        let (x1, y1) = letterbox.to_frame(
            detection.keypoints[KEYPOINT_MIDDLE_MCP].0,
            detection.keypoints[KEYPOINT_MIDDLE_MCP].1,
        );
        let rotation = normalize_radians(PI / 2.0 - (-(y1 - y0)).atan2(x1 - x0));

        // Shift along the hand's own vertical axis
        let (sin, cos) = rotation.sin_cos();
        let shift_x = -height * ROI_SHIFT_Y * sin;
        let shift_y = height * ROI_SHIFT_Y * cos;

        Self {
            center_x: cx + shift_x,
            center_y: cy + shift_y,
            size: width.max(height) * ROI_SCALE,
            rotation,
        }
    }

    /// Crop-normalized point (0..1 across the region) to frame pixels
    pub fn to_frame(&self, u: f32, v: f32) -> (f32, f32) {
        let lx = (u - 0.5) * self.size;
        let ly = (v - 0.5) * self.size;
        let (sin, cos) = self.rotation.sin_cos();
        (
            self.center_x + lx * cos - ly * sin,
            self.center_y + lx * sin + ly * cos,
        )
    }
}

/// Wrap an angle into [-PI, PI)
fn normalize_radians(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}
