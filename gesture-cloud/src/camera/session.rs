//! Camera session lifecycle
//!
//! `Idle -> Starting -> Active -> Idle`. Starting covers the asynchronous
//! part of setup: the detector loads in the background (once, then reused)
//! while the capture thread opens the device. The session becomes Active
//! once both the detector and the first frame are there, and falls back to
//! Idle if either gives up.

use std::path::PathBuf;
use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError};

use super::FrameSource;
use crate::gesture::GestureEstimator;
use crate::ml::{HandLandmarkResult, LandmarkDetector};

pub const STATUS_INACTIVE: &str = "Camera inactive";
pub const STATUS_LOADING_DETECTOR: &str = "Loading hand detector...";
pub const STATUS_STARTING: &str = "Starting camera...";
pub const STATUS_ACTIVE: &str = "Camera active · detecting hands";
pub const STATUS_FAILED: &str = "Could not start camera";

/// Setup failures; the session stays or returns to Idle
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("camera access denied: {0}")]
    CameraPermission(String),
    #[error("failed to spawn capture thread: {0}")]
    CaptureThread(String),
    #[error("hand tracking model not found: {0:?}")]
    ModelNotFound(PathBuf),
    #[error("hand detector failed to initialize: {0}")]
    DetectorInit(String),
}

impl SetupError {
    /// Classify a capture thread failure reason
    pub fn from_capture_failure(reason: String) -> Self {
        let lower = reason.to_lowercase();
        if ["permission", "denied", "authoriz", "not allowed"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            SetupError::CameraPermission(reason)
        } else {
            SetupError::CameraUnavailable(reason)
        }
    }
}

/// Session states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
}

/// Outcome of a background detector load
pub type DetectorLoad<D> = Result<D, SetupError>;

/// Opens the collaborators a session needs
pub trait SessionBackend {
    type Source: FrameSource;
    type Detector: LandmarkDetector;

    /// Start loading the detector. The receiver yields one result; a
    /// disconnect without a result counts as a failed load.
    fn load_detector(&mut self) -> Receiver<DetectorLoad<Self::Detector>>;
    fn open_camera(&mut self) -> Result<Self::Source, SetupError>;
}

/// Camera session state machine
pub struct CameraSession<B: SessionBackend> {
    backend: B,
    state: SessionState,
    /// Kept across start/stop cycles
    detector: Option<B::Detector>,
    /// In-flight detector load, also kept across cycles
    pending_detector: Option<Receiver<DetectorLoad<B::Detector>>>,
    source: Option<B::Source>,
    /// Timestamp of the last frame fed to the detector
    last_frame_time: Option<Instant>,
    status: String,
}

impl<B: SessionBackend> CameraSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: SessionState::Idle,
            detector: None,
            pending_detector: None,
            source: None,
            last_frame_time: None,
            status: STATUS_INACTIVE.to_string(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// User-facing status line
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn detector_ready(&self) -> bool {
        self.detector.is_some()
    }

    /// Begin starting the camera. No-op unless Idle.
    ///
    /// Never blocks on the detector: the load is kicked off here and picked
    /// up by `poll`.
    pub fn start(&mut self) -> Result<(), SetupError> {
        if self.state != SessionState::Idle {
            return Ok(());
        }
        self.state = SessionState::Starting;

        if self.detector.is_none() && self.pending_detector.is_none() {
            log::info!("Loading hand detector...");
            self.pending_detector = Some(self.backend.load_detector());
        }
        // A load that already finished is picked up right away
        self.collect_detector()?;

        match self.backend.open_camera() {
            Ok(source) => {
                self.source = Some(source);
                self.last_frame_time = None;
                self.update_starting_status();
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Take the result of a finished detector load, if any.
    fn collect_detector(&mut self) -> Result<(), SetupError> {
        let Some(receiver) = &self.pending_detector else {
            return Ok(());
        };
        let outcome = match receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return Ok(()),
            Err(TryRecvError::Disconnected) => Err(SetupError::DetectorInit(
                "detector loader exited without a result".to_string(),
            )),
        };
        self.pending_detector = None;

        match outcome {
            Ok(detector) => {
                self.detector = Some(detector);
                log::info!("Hand detector initialized");
                Ok(())
            }
            Err(e) => {
                self.stop_source();
                Err(self.fail(e))
            }
        }
    }

    fn update_starting_status(&mut self) {
        self.status = if self.detector.is_some() {
            STATUS_STARTING
        } else {
            STATUS_LOADING_DETECTOR
        }
        .to_string();
    }

    /// Advance Starting to Active or back to Idle. Call once per frame.
    pub fn poll(&mut self) -> Result<(), SetupError> {
        if self.state == SessionState::Idle {
            return Ok(());
        }
        self.collect_detector()?;

        let Some(source) = &self.source else {
            self.state = SessionState::Idle;
            return Ok(());
        };

        if !source.is_running() {
            let reason = source
                .failure()
                .unwrap_or_else(|| "capture stopped".to_string());
            self.stop_source();
            return Err(self.fail(SetupError::from_capture_failure(reason)));
        }

        if self.state == SessionState::Starting {
            if self.detector.is_some() && source.latest_timestamp().is_some() {
                self.state = SessionState::Active;
                self.status = STATUS_ACTIVE.to_string();
                log::info!("Camera session active");
            } else {
                self.update_starting_status();
            }
        }

        Ok(())
    }

    /// Stop the camera. No-op while Idle.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.stop_source();
        self.state = SessionState::Idle;
        self.last_frame_time = None;
        self.status = STATUS_INACTIVE.to_string();
        log::info!("Camera stopped");
    }

    /// Start when Idle, stop otherwise.
    pub fn toggle(&mut self) -> Result<(), SetupError> {
        match self.state {
            SessionState::Idle => self.start(),
            SessionState::Starting | SessionState::Active => {
                self.stop();
                Ok(())
            }
        }
    }

    /// Run detection on the latest frame if it has not been processed yet.
    ///
    /// Returns `None` when the session is not Active or the frame is
    /// unchanged. Detection errors are logged and reported as an empty
    /// result so the gesture state decays instead of freezing.
    pub fn next_detection(&mut self) -> Option<HandLandmarkResult> {
        if self.state != SessionState::Active {
            return None;
        }
        let source = self.source.as_ref()?;
        let timestamp = source.latest_timestamp()?;
        if self.last_frame_time == Some(timestamp) {
            return None;
        }

        let frame = source.latest_frame()?;
        // Use the copied frame's own timestamp; the source may have moved on
        self.last_frame_time = Some(frame.timestamp);

        let detector = self.detector.as_mut()?;
        match detector.detect(&frame) {
            Ok(result) => Some(result),
            Err(e) => {
                log::warn!("Hand detection failed on frame {}: {}", frame.frame_number, e);
                Some(HandLandmarkResult::empty())
            }
        }
    }

    /// Feed this tick's detection into the estimator.
    ///
    /// While Active only new frames are fed, so the smoothing advances once
    /// per camera frame. Otherwise an empty result is fed every tick and the
    /// gesture decays to neutral.
    pub fn feed_gesture(&mut self, estimator: &mut GestureEstimator) {
        if self.is_active() {
            if let Some(result) = self.next_detection() {
                estimator.update(&result);
            }
        } else {
            estimator.update(&HandLandmarkResult::empty());
        }
    }

    fn stop_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
    }

    fn fail(&mut self, error: SetupError) -> SetupError {
        log::error!("Camera setup failed: {}", error);
        self.state = SessionState::Idle;
        self.status = STATUS_FAILED.to_string();
        error
    }
}

impl<B: SessionBackend> Drop for CameraSession<B> {
    fn drop(&mut self) {
        self.stop_source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraFrame;
    use crate::gesture::GestureState;
    use crate::ml::{DetectionError, Hand};
    use crossbeam_channel::Sender;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration;

    /// Frame source driven by the test
    #[derive(Clone, Default)]
    struct FakeSource {
        frame: Rc<RefCell<Option<CameraFrame>>>,
        running: Rc<Cell<bool>>,
        stopped: Rc<Cell<bool>>,
    }

    impl FakeSource {
        fn push(&self, timestamp: Instant) {
            *self.frame.borrow_mut() = Some(CameraFrame {
                data: vec![0; 4],
                width: 1,
                height: 1,
                frame_number: 0,
                timestamp,
            });
        }
    }

    impl FrameSource for FakeSource {
        fn latest_frame(&self) -> Option<CameraFrame> {
            self.frame.borrow().clone()
        }

        fn is_running(&self) -> bool {
            self.running.get()
        }

        fn failure(&self) -> Option<String> {
            (!self.running.get()).then(|| "permission denied".to_string())
        }

        fn stop(&mut self) {
            self.stopped.set(true);
        }
    }

    struct CountingDetector {
        calls: Rc<Cell<usize>>,
    }

    impl LandmarkDetector for CountingDetector {
        fn detect(&mut self, _frame: &CameraFrame) -> Result<HandLandmarkResult, DetectionError> {
            self.calls.set(self.calls.get() + 1);
            Ok(HandLandmarkResult::from_hands(vec![Hand::default()]))
        }
    }

    type HeldLoad = Rc<RefCell<Option<(Sender<DetectorLoad<CountingDetector>>, DetectorLoad<CountingDetector>)>>>;

    struct FakeBackend {
        source: FakeSource,
        detector_inits: Rc<Cell<usize>>,
        detect_calls: Rc<Cell<usize>>,
        fail_detector: bool,
        /// Hold the load result until the test releases it
        defer_load: bool,
        held_load: HeldLoad,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                source: FakeSource::default(),
                detector_inits: Rc::new(Cell::new(0)),
                detect_calls: Rc::new(Cell::new(0)),
                fail_detector: false,
                defer_load: false,
                held_load: Rc::new(RefCell::new(None)),
            }
        }
    }

    fn finish_load(held: &HeldLoad) {
        let (sender, result) = held.borrow_mut().take().expect("no load in flight");
        sender.send(result).unwrap();
    }

    impl SessionBackend for FakeBackend {
        type Source = FakeSource;
        type Detector = CountingDetector;

        fn load_detector(&mut self) -> Receiver<DetectorLoad<CountingDetector>> {
            self.detector_inits.set(self.detector_inits.get() + 1);
            let result = if self.fail_detector {
                Err(SetupError::DetectorInit("no model".to_string()))
            } else {
                Ok(CountingDetector {
                    calls: self.detect_calls.clone(),
                })
            };

            let (sender, receiver) = crossbeam_channel::bounded(1);
            if self.defer_load {
                *self.held_load.borrow_mut() = Some((sender, result));
            } else {
                sender.send(result).unwrap();
            }
            receiver
        }

        fn open_camera(&mut self) -> Result<FakeSource, SetupError> {
            self.source.running.set(true);
            self.source.stopped.set(false);
            *self.source.frame.borrow_mut() = None;
            Ok(self.source.clone())
        }
    }

    #[test]
    fn test_start_then_first_frame_activates() {
        let backend = FakeBackend::new();
        let source = backend.source.clone();
        let mut session = CameraSession::new(backend);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.status(), STATUS_INACTIVE);

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Starting);
        assert!(session.detector_ready());

        // No frame yet
        session.poll().unwrap();
        assert_eq!(session.state(), SessionState::Starting);
        assert!(session.next_detection().is_none());

        source.push(Instant::now());
        session.poll().unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.status(), STATUS_ACTIVE);
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let backend = FakeBackend::new();
        let inits = backend.detector_inits.clone();
        let source = backend.source.clone();
        let mut session = CameraSession::new(backend);

        // Stop while idle does nothing
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);

        session.start().unwrap();
        source.push(Instant::now());
        session.poll().unwrap();
        assert!(session.is_active());

        // Start while active does nothing
        session.start().unwrap();
        assert!(session.is_active());
        assert_eq!(inits.get(), 1);

        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(source.stopped.get());
        assert_eq!(session.status(), STATUS_INACTIVE);
    }

    #[test]
    fn test_detector_initialized_once_across_cycles() {
        let backend = FakeBackend::new();
        let inits = backend.detector_inits.clone();
        let mut session = CameraSession::new(backend);

        for _ in 0..3 {
            session.toggle().unwrap();
            assert_eq!(session.state(), SessionState::Starting);
            session.toggle().unwrap();
            assert_eq!(session.state(), SessionState::Idle);
        }
        assert_eq!(inits.get(), 1);
    }

    #[test]
    fn test_capture_failure_returns_to_idle() {
        let backend = FakeBackend::new();
        let source = backend.source.clone();
        let mut session = CameraSession::new(backend);

        session.start().unwrap();
        source.running.set(false);

        let result = session.poll();
        assert!(matches!(result, Err(SetupError::CameraPermission(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.status(), STATUS_FAILED);

        // The user may retry
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Starting);
    }

    #[test]
    fn test_capture_failure_classification() {
        assert!(matches!(
            SetupError::from_capture_failure("Access Denied by user".to_string()),
            SetupError::CameraPermission(_)
        ));
        assert!(matches!(
            SetupError::from_capture_failure("Failed to open camera 3: no device".to_string()),
            SetupError::CameraUnavailable(_)
        ));
    }

    #[test]
    fn test_detector_failure_leaves_idle() {
        let mut backend = FakeBackend::new();
        backend.fail_detector = true;
        let mut session = CameraSession::new(backend);

        assert!(matches!(session.start(), Err(SetupError::DetectorInit(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.detector_ready());
    }

    #[test]
    fn test_detection_throttled_by_frame_timestamp() {
        let backend = FakeBackend::new();
        let calls = backend.detect_calls.clone();
        let source = backend.source.clone();
        let mut session = CameraSession::new(backend);

        session.start().unwrap();
        let t0 = Instant::now();
        source.push(t0);
        session.poll().unwrap();

        let first = session.next_detection();
        assert_eq!(first.map(|r| r.hand_count()), Some(1));

        // Same frame again: skipped
        assert!(session.next_detection().is_none());
        assert!(session.next_detection().is_none());
        assert_eq!(calls.get(), 1);

        source.push(t0 + Duration::from_millis(33));
        assert!(session.next_detection().is_some());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_start_does_not_wait_for_detector() {
        let mut backend = FakeBackend::new();
        backend.defer_load = true;
        let held = backend.held_load.clone();
        let inits = backend.detector_inits.clone();
        let source = backend.source.clone();
        let mut session = CameraSession::new(backend);

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Starting);
        assert_eq!(session.status(), STATUS_LOADING_DETECTOR);
        assert!(!session.detector_ready());

        // Frames arrive before the models: still Starting
        source.push(Instant::now());
        session.poll().unwrap();
        assert_eq!(session.state(), SessionState::Starting);
        assert!(session.next_detection().is_none());

        // Restarting mid-load reuses the in-flight load
        session.stop();
        session.start().unwrap();
        source.push(Instant::now());
        assert_eq!(inits.get(), 1);

        finish_load(&held);
        session.poll().unwrap();
        assert!(session.detector_ready());
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.status(), STATUS_ACTIVE);
    }

    #[test]
    fn test_detector_loaded_before_first_frame() {
        let mut backend = FakeBackend::new();
        backend.defer_load = true;
        let held = backend.held_load.clone();
        let source = backend.source.clone();
        let mut session = CameraSession::new(backend);

        session.start().unwrap();
        finish_load(&held);
        session.poll().unwrap();
        assert_eq!(session.state(), SessionState::Starting);
        assert_eq!(session.status(), STATUS_STARTING);

        source.push(Instant::now());
        session.poll().unwrap();
        assert!(session.is_active());
    }

    #[test]
    fn test_background_load_failure_stops_camera() {
        let mut backend = FakeBackend::new();
        backend.defer_load = true;
        backend.fail_detector = true;
        let held = backend.held_load.clone();
        let source = backend.source.clone();
        let mut session = CameraSession::new(backend);

        session.start().unwrap();
        finish_load(&held);
        assert!(matches!(session.poll(), Err(SetupError::DetectorInit(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.status(), STATUS_FAILED);
        assert!(source.stopped.get());
    }

    #[test]
    fn test_loader_exit_without_result_fails() {
        let mut backend = FakeBackend::new();
        backend.defer_load = true;
        let held = backend.held_load.clone();
        let mut session = CameraSession::new(backend);

        session.start().unwrap();
        // Loader thread died: sender dropped unsent
        held.borrow_mut().take();
        assert!(matches!(session.poll(), Err(SetupError::DetectorInit(_))));
        assert_eq!(session.state(), SessionState::Idle);

        // A retry starts a fresh load
        session.start().unwrap();
        assert!(held.borrow().is_some());
    }

    #[test]
    fn test_feed_gesture_decays_while_inactive() {
        let backend = FakeBackend::new();
        let mut session = CameraSession::new(backend);
        let mut estimator = GestureEstimator::with_state(GestureState {
            hand_openness: 1.0,
            detected_hands: 1,
            ..GestureState::NEUTRAL
        });

        session.feed_gesture(&mut estimator);
        assert!((estimator.state().hand_openness - 0.95).abs() < 1e-6);
        assert_eq!(estimator.state().detected_hands, 0);

        // Starting without a frame still decays
        session.start().unwrap();
        session.feed_gesture(&mut estimator);
        assert!(estimator.state().hand_openness < 0.95);
    }

    #[test]
    fn test_feed_gesture_only_on_new_frames() {
        let backend = FakeBackend::new();
        let calls = backend.detect_calls.clone();
        let source = backend.source.clone();
        let mut session = CameraSession::new(backend);
        let mut estimator = GestureEstimator::new();

        session.start().unwrap();
        let t0 = Instant::now();
        source.push(t0);
        session.poll().unwrap();

        session.feed_gesture(&mut estimator);
        let after_frame = estimator.state();
        assert_eq!(after_frame.detected_hands, 1);

        // Same frame on later ticks: the estimator is left alone
        for _ in 0..5 {
            session.feed_gesture(&mut estimator);
        }
        assert_eq!(estimator.state(), after_frame);
        assert_eq!(calls.get(), 1);

        source.push(t0 + Duration::from_millis(33));
        session.feed_gesture(&mut estimator);
        assert_ne!(estimator.state(), after_frame);
        assert_eq!(calls.get(), 2);
    }
}
