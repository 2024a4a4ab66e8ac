//! Camera capture
//!
//! A nokhwa capture thread writes RGBA frames into a triple buffer; the
//! frame loop only ever reads the newest one. [`session`] wraps a frame
//! source and a landmark detector into the start/stop lifecycle.

pub mod session;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use parking_lot::Mutex;

use crossbeam_channel::Receiver;

use crate::ml::OrtHandTracker;
use session::{DetectorLoad, SessionBackend, SetupError};

/// Camera frame data
#[derive(Clone)]
pub struct CameraFrame {
    /// RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame number
    pub frame_number: u64,
    /// Capture timestamp, used to skip frames already processed
    pub timestamp: Instant,
}

/// Source of video frames for the camera session
pub trait FrameSource {
    /// Latest captured frame, if any has arrived yet
    fn latest_frame(&self) -> Option<CameraFrame>;

    /// Timestamp of the latest frame without copying pixels
    fn latest_timestamp(&self) -> Option<Instant> {
        self.latest_frame().map(|frame| frame.timestamp)
    }

    /// Whether the source can still deliver frames
    fn is_running(&self) -> bool;

    /// Why the source stopped, if it failed
    fn failure(&self) -> Option<String> {
        None
    }

    /// Release the device
    fn stop(&mut self);
}

/// Camera capture interface
pub struct CameraCapture {
    /// Current frame (latest captured) - triple buffered
    frames: [Arc<Mutex<Option<CameraFrame>>>; 3],
    /// Index of the latest complete frame
    latest_frame_idx: Arc<AtomicU64>,
    /// Whether any frame has been written
    has_frame: Arc<AtomicBool>,
    /// Whether capture is running
    running: Arc<AtomicBool>,
    /// Reason the capture thread gave up
    failure: Arc<Mutex<Option<String>>>,
    /// Capture thread handle
    thread_handle: Option<std::thread::JoinHandle<()>>,
    /// Frame counter
    frame_count: Arc<AtomicU64>,
}

impl CameraCapture {
    /// Start capturing from `camera_index`, requesting `width`x`height`.
    ///
    /// Opening the device happens on the capture thread; a failure there
    /// shows up as `is_running() == false` with a `failure()` reason.
    pub fn new(camera_index: u32, width: u32, height: u32) -> Result<Self, SetupError> {
        let frames: [Arc<Mutex<Option<CameraFrame>>>; 3] = [
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
        ];
        let latest_frame_idx = Arc::new(AtomicU64::new(0));
        let has_frame = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let failure = Arc::new(Mutex::new(None));
        let frame_count = Arc::new(AtomicU64::new(0));

        let shared = CaptureShared {
            frames: frames.clone(),
            latest_frame_idx: latest_frame_idx.clone(),
            has_frame: has_frame.clone(),
            running: running.clone(),
            failure: failure.clone(),
            frame_count: frame_count.clone(),
        };

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_thread(camera_index, width, height, shared))
            .map_err(|e| SetupError::CaptureThread(e.to_string()))?;

        Ok(Self {
            frames,
            latest_frame_idx,
            has_frame,
            running,
            failure,
            thread_handle: Some(thread_handle),
            frame_count,
        })
    }

    /// Get frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }
}

impl FrameSource for CameraCapture {
    fn latest_frame(&self) -> Option<CameraFrame> {
        if !self.has_frame.load(Ordering::Acquire) {
            return None;
        }
        let idx = self.latest_frame_idx.load(Ordering::Acquire);
        let slot = (idx % 3) as usize;
        self.frames[slot].lock().clone()
    }

    fn latest_timestamp(&self) -> Option<Instant> {
        if !self.has_frame.load(Ordering::Acquire) {
            return None;
        }
        let idx = self.latest_frame_idx.load(Ordering::Acquire);
        let slot = (idx % 3) as usize;
        self.frames[slot].lock().as_ref().map(|frame| frame.timestamp)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State shared between the capture thread and [`CameraCapture`]
struct CaptureShared {
    frames: [Arc<Mutex<Option<CameraFrame>>>; 3],
    latest_frame_idx: Arc<AtomicU64>,
    has_frame: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<String>>>,
    frame_count: Arc<AtomicU64>,
}

impl CaptureShared {
    fn fail(&self, reason: String) {
        log::error!("{}", reason);
        *self.failure.lock() = Some(reason);
        self.running.store(false, Ordering::Release);
    }
}

/// Camera capture thread
fn capture_thread(camera_index: u32, width: u32, height: u32, shared: CaptureShared) {
    log::info!("Starting camera capture thread (camera {})", camera_index);

    let index = CameraIndex::Index(camera_index);

    // Closest to the requested size first, then whatever the device offers
    let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::HighestResolution(
        Resolution::new(width, height),
    ));

    let mut camera = match Camera::new(index.clone(), requested) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Failed to open camera at {}x{}: {:?}", width, height, e);

            let fallback = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::None);
            match Camera::new(index, fallback) {
                Ok(c) => c,
                Err(e2) => {
                    shared.fail(format!("Failed to open camera {}: {}", camera_index, e2));
                    return;
                }
            }
        }
    };

    if let Err(e) = camera.open_stream() {
        shared.fail(format!("Failed to open camera stream: {}", e));
        return;
    }

    log::info!(
        "Camera opened: {} ({}x{})",
        camera.info().human_name(),
        camera.resolution().width(),
        camera.resolution().height()
    );

    let mut write_idx: u64 = 0;

    while shared.running.load(Ordering::Acquire) {
        match camera.frame() {
            Ok(frame) => match frame.decode_image::<RgbAFormat>() {
                Ok(image) => {
                    let frame_num = shared.frame_count.fetch_add(1, Ordering::Relaxed);

                    let camera_frame = CameraFrame {
                        data: image.into_raw(),
                        width: frame.resolution().width(),
                        height: frame.resolution().height(),
                        frame_number: frame_num,
                        timestamp: Instant::now(),
                    };

                    let slot = (write_idx % 3) as usize;
                    *shared.frames[slot].lock() = Some(camera_frame);

                    shared.latest_frame_idx.store(write_idx, Ordering::Release);
                    shared.has_frame.store(true, Ordering::Release);
                    write_idx = write_idx.wrapping_add(1);
                }
                Err(e) => {
                    log::warn!("Failed to decode frame: {:?}", e);
                }
            },
            Err(e) => {
                log::warn!("Failed to capture frame: {:?}", e);
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        log::warn!("Failed to stop camera stream: {:?}", e);
    }
    log::info!("Camera capture thread stopped");
}

/// Real camera plus ONNX hand tracking models
pub struct NativeBackend {
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
    pub model_dir: Option<PathBuf>,
}

impl SessionBackend for NativeBackend {
    type Source = CameraCapture;
    type Detector = OrtHandTracker;

    /// Load the models on a worker thread; ORT session creation takes
    /// seconds and must not stall the frame loop.
    fn load_detector(&mut self) -> Receiver<DetectorLoad<OrtHandTracker>> {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let model_dir = self.model_dir.clone();

        let spawned = std::thread::Builder::new()
            .name("detector-load".to_string())
            .spawn(move || {
                let result = OrtHandTracker::load(model_dir.as_deref());
                // The session may have been dropped meanwhile
                let _ = sender.send(result);
            });
        if let Err(e) = spawned {
            // The sender went down with the closure; the session sees a
            // disconnected channel and reports the failure
            log::error!("Failed to spawn detector load thread: {}", e);
        }

        receiver
    }

    fn open_camera(&mut self) -> Result<CameraCapture, SetupError> {
        log::info!(
            "Connecting to camera {} (requested {}x{})",
            self.camera_index,
            self.width,
            self.height
        );
        CameraCapture::new(self.camera_index, self.width, self.height)
    }
}
