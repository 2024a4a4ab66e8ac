//! Hand landmark detection
//!
//! Provides the landmark types consumed by the gesture estimator and an ONNX
//! Runtime tracker running MediaPipe-compatible palm detection and hand
//! landmark models (from the PINTO Model Zoo).
//!
//! Landmarks use the detector's convention: x and y normalized to [0, 1]
//! with the origin at the top-left of the camera frame, z a relative depth.

pub mod palm;

use std::path::{Path, PathBuf};

use ndarray::Array4;

use crate::camera::session::SetupError;
use crate::camera::CameraFrame;
use palm::{
    decode_detections, generate_anchors, non_max_suppression, Anchor, HandRegion, Letterbox,
    PalmDetection, ANCHOR_COUNT, DEFAULT_SCORE_THRESHOLD, MAX_HANDS, NMS_IOU_THRESHOLD,
    PALM_INPUT_SIZE, REGRESSOR_STRIDE,
};

/// Landmarks per hand
pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;

/// Fingertips used for openness, thumb excluded
pub const FINGERTIPS: [usize; 4] = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// Model files expected in the model directory
pub const PALM_DETECTION_MODEL: &str = "palm_detection.onnx";
pub const HAND_LANDMARK_MODEL: &str = "hand_landmark.onnx";

/// Input resolution of the landmark model
const LANDMARK_INPUT_SIZE: u32 = 224;

/// Minimum hand presence score to report a hand
pub const DEFAULT_PRESENCE_THRESHOLD: f32 = 0.45;

/// Hand landmark (normalized coordinates)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HandLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl HandLandmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in landmark space
    pub fn distance(&self, other: &HandLandmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Detected hand
#[derive(Clone, Debug)]
pub struct Hand {
    /// 21 landmarks
    pub landmarks: [HandLandmark; LANDMARK_COUNT],
    /// Presence score
    pub confidence: f32,
}

impl Hand {
    pub fn new(landmarks: [HandLandmark; LANDMARK_COUNT]) -> Self {
        Self {
            landmarks,
            confidence: 1.0,
        }
    }

    pub fn landmark(&self, index: usize) -> &HandLandmark {
        &self.landmarks[index]
    }

    /// Every coordinate is a real number
    pub fn is_finite(&self) -> bool {
        self.landmarks
            .iter()
            .all(|l| l.x.is_finite() && l.y.is_finite() && l.z.is_finite())
    }
}

impl Default for Hand {
    fn default() -> Self {
        Self::new([HandLandmark::default(); LANDMARK_COUNT])
    }
}

/// Per-frame detector output: zero, one, or two hands
#[derive(Clone, Debug, Default)]
pub struct HandLandmarkResult {
    pub hands: Vec<Hand>,
}

impl HandLandmarkResult {
    /// Result with no hands, the transient-gap case
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_hands(hands: Vec<Hand>) -> Self {
        Self { hands }
    }

    pub fn hand_count(&self) -> usize {
        self.hands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }
}

/// Errors from a single detection pass
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("frame is empty ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Output(String),
}

/// Anything that turns a camera frame into hand landmarks
pub trait LandmarkDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Result<HandLandmarkResult, DetectionError>;
}

/// ONNX Runtime hand tracker
///
/// Two stages per frame: the palm detector finds up to two hands on a
/// letterboxed copy of the frame, then the landmark model runs on a rotated
/// crop around each palm.
pub struct OrtHandTracker {
    palm_detection: ort::session::Session,
    hand_landmark: ort::session::Session,
    anchors: Vec<Anchor>,
    palm_threshold: f32,
    presence_threshold: f32,
}

impl OrtHandTracker {
    /// Initialize ONNX Runtime and load both models.
    ///
    /// `model_dir` overrides the directory search.
    pub fn load(model_dir: Option<&Path>) -> Result<Self, SetupError> {
        let model_dir = match model_dir {
            Some(dir) => dir.to_path_buf(),
            None => find_model_dir()?,
        };
        log::info!("Model directory: {:?}", model_dir);

        let palm_path = model_dir.join(PALM_DETECTION_MODEL);
        let landmark_path = model_dir.join(HAND_LANDMARK_MODEL);
        for path in [&palm_path, &landmark_path] {
            if !path.exists() {
                return Err(SetupError::ModelNotFound(path.clone()));
            }
        }

        ort::init()
            .with_name("GestureCloud")
            .commit()
            .map_err(|e| SetupError::DetectorInit(format!("failed to initialize ORT: {}", e)))?;

        let palm_detection = load_session(&palm_path)?;
        log::info!("Loaded palm detection model from {:?}", palm_path);
        let hand_landmark = load_session(&landmark_path)?;
        log::info!("Loaded hand landmark model from {:?}", landmark_path);

        Ok(Self {
            palm_detection,
            hand_landmark,
            anchors: generate_anchors(),
            palm_threshold: DEFAULT_SCORE_THRESHOLD,
            presence_threshold: DEFAULT_PRESENCE_THRESHOLD,
        })
    }

    fn detect_palms(
        &mut self,
        frame: &CameraFrame,
        letterbox: &Letterbox,
    ) -> Result<Vec<PalmDetection>, DetectionError> {
        let input = sample_chw(frame, PALM_INPUT_SIZE, |u, v| letterbox.to_frame(u, v));
        let outputs = run_model(&mut self.palm_detection, input, PALM_INPUT_SIZE)?;

        // Outputs are told apart by size: boxes (2016 x 18) and scores (2016)
        let regressors = outputs
            .iter()
            .find(|o| o.len() == ANCHOR_COUNT * REGRESSOR_STRIDE)
            .ok_or_else(|| DetectionError::Output("no palm box output".to_string()))?;
        let scores = outputs
            .iter()
            .find(|o| o.len() == ANCHOR_COUNT)
            .ok_or_else(|| DetectionError::Output("no palm score output".to_string()))?;

        let detections = decode_detections(regressors, scores, &self.anchors, self.palm_threshold);
        Ok(non_max_suppression(detections, NMS_IOU_THRESHOLD, MAX_HANDS))
    }

    fn detect_landmarks(
        &mut self,
        frame: &CameraFrame,
        region: &HandRegion,
    ) -> Result<Option<Hand>, DetectionError> {
        let input = sample_chw(frame, LANDMARK_INPUT_SIZE, |u, v| region.to_frame(u, v));
        let outputs = run_model(&mut self.hand_landmark, input, LANDMARK_INPUT_SIZE)?;
        let mut values = outputs.into_iter();

        // First output: 21 * (x, y, z) in crop pixels
        let coords = values
            .next()
            .ok_or_else(|| DetectionError::Output("no landmark output".to_string()))?;

        // Second output, when present: hand presence score
        let presence = match values.next() {
            Some(score) => score.first().copied().unwrap_or(0.0),
            None => 1.0,
        };
        if !(presence >= self.presence_threshold) {
            return Ok(None);
        }

        let hand = decode_landmarks(&coords, region, frame.width, frame.height)?;
        Ok(hand.map(|hand| Hand {
            confidence: presence,
            ..hand
        }))
    }
}

impl LandmarkDetector for OrtHandTracker {
    fn detect(&mut self, frame: &CameraFrame) -> Result<HandLandmarkResult, DetectionError> {
        if frame.width == 0 || frame.height == 0 || frame.data.is_empty() {
            return Err(DetectionError::EmptyFrame {
                width: frame.width,
                height: frame.height,
            });
        }

        let letterbox = Letterbox::new(frame.width, frame.height);
        let palms = self.detect_palms(frame, &letterbox)?;

        let mut hands = Vec::with_capacity(palms.len());
        for palm in &palms {
            let region = HandRegion::from_detection(palm, &letterbox);
            if let Some(hand) = self.detect_landmarks(frame, &region)? {
                hands.push(hand);
            }
        }

        Ok(HandLandmarkResult::from_hands(hands))
    }
}

fn load_session(path: &Path) -> Result<ort::session::Session, SetupError> {
    ort::session::Session::builder()
        .map_err(|e| SetupError::DetectorInit(format!("failed to create session builder: {}", e)))?
        .with_intra_threads(2)
        .map_err(|e| SetupError::DetectorInit(format!("failed to set threads: {}", e)))?
        .commit_from_file(path)
        .map_err(|e| SetupError::DetectorInit(format!("failed to load {:?}: {}", path, e)))
}

/// Run a single-input square model and copy every output out as flat f32
fn run_model(
    session: &mut ort::session::Session,
    input: Vec<f32>,
    input_size: u32,
) -> Result<Vec<Vec<f32>>, DetectionError> {
    let size = input_size as usize;

    // NCHW (1, 3, size, size)
    let input_array = Array4::from_shape_vec((1, 3, size, size), input)
        .map_err(|e| DetectionError::Inference(format!("failed to create input array: {}", e)))?;
    let input_tensor = ort::value::Tensor::from_array(input_array)
        .map_err(|e| DetectionError::Inference(format!("failed to create tensor: {}", e)))?;

    let outputs = session
        .run(ort::inputs![input_tensor])
        .map_err(|e| DetectionError::Inference(e.to_string()))?;

    let values: Result<Vec<Vec<f32>>, DetectionError> = outputs
        .iter()
        .map(|(_name, value)| {
            value
                .try_extract_tensor::<f32>()
                .map(|(_shape, data)| data.to_vec())
                .map_err(|e| DetectionError::Output(e.to_string()))
        })
        .collect();
    values
}

/// Convert landmark model output in crop pixels to frame-normalized landmarks.
///
/// Returns `None` when any coordinate is non-finite, so a corrupt inference
/// reads as a missing hand.
fn decode_landmarks(
    coords: &[f32],
    region: &HandRegion,
    frame_width: u32,
    frame_height: u32,
) -> Result<Option<Hand>, DetectionError> {
    if coords.len() < LANDMARK_COUNT * 3 {
        return Err(DetectionError::Output(format!(
            "expected {} landmark values, got {}",
            LANDMARK_COUNT * 3,
            coords.len()
        )));
    }

    let input_size = LANDMARK_INPUT_SIZE as f32;
    let (width, height) = (frame_width as f32, frame_height as f32);
    // Depth shares the x scale, as in the model's own convention
    let depth_scale = region.size / input_size / width;

    let mut landmarks = [HandLandmark::default(); LANDMARK_COUNT];
    for (i, landmark) in landmarks.iter_mut().enumerate() {
        let base = i * 3;
        let (x, y) = region.to_frame(coords[base] / input_size, coords[base + 1] / input_size);
        *landmark = HandLandmark::new(x / width, y / height, coords[base + 2] * depth_scale);
    }

    let hand = Hand::new(landmarks);
    Ok(hand.is_finite().then_some(hand))
}

/// Sample an RGBA frame into CHW float RGB in [0, 1].
///
/// `to_frame` maps a normalized output position to frame pixels; samples
/// falling outside the frame stay black.
fn sample_chw(
    frame: &CameraFrame,
    target_size: u32,
    to_frame: impl Fn(f32, f32) -> (f32, f32),
) -> Vec<f32> {
    let channel_stride = (target_size * target_size) as usize;
    let mut output = vec![0.0f32; channel_stride * 3];
    let size = target_size as f32;

    for y in 0..target_size {
        for x in 0..target_size {
            let (fx, fy) = to_frame((x as f32 + 0.5) / size, (y as f32 + 0.5) / size);
            if !(fx >= 0.0 && fy >= 0.0) {
                continue;
            }
            let (src_x, src_y) = (fx as u32, fy as u32);
            if src_x >= frame.width || src_y >= frame.height {
                continue;
            }

            let src_idx = ((src_y * frame.width + src_x) * 4) as usize;
            if src_idx + 2 < frame.data.len() {
                let pixel_idx = (y * target_size + x) as usize;
                output[pixel_idx] = frame.data[src_idx] as f32 / 255.0;
                output[channel_stride + pixel_idx] = frame.data[src_idx + 1] as f32 / 255.0;
                output[2 * channel_stride + pixel_idx] = frame.data[src_idx + 2] as f32 / 255.0;
            }
        }
    }

    output
}

/// Find the models directory next to the executable or in the working directory
pub fn find_model_dir() -> Result<PathBuf, SetupError> {
    let mut candidates = Vec::new();

    if let Ok(exe_path) = std::env::current_exe() {
        // Walk up for `cargo run` layouts like target/release
        for ancestor in exe_path.ancestors().skip(1).take(4) {
            candidates.push(ancestor.join("models"));
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("models"));
        candidates.push(cwd.join("gesture-cloud").join("models"));
    }

    candidates
        .into_iter()
        .find(|dir| dir.is_dir())
        .ok_or_else(|| SetupError::ModelNotFound(PathBuf::from("models")))
}
