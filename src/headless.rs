// Headless collaborators
//
// In-process stand-ins for the camera, the 3D scene and the remote detector.
// The binary runs a session against them; integration tests use them to
// observe stream ownership and placement.

use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::{DetectedObject, TrackedTransform, Vec3};
use crate::services::camera::{
    CameraError, CaptureConstraints, CaptureError, MediaDevices, MediaStream, VideoSource,
};
use crate::services::detector::{DetectionError, ObjectDetector};
use crate::services::scene::{ArScene, ModelHandle, ModelRequest, ModelSource, SceneError};

const SYNTHETIC_FRAME_LEN: usize = 64;

/// Video handle producing small distinct "frames"
pub struct SyntheticVideo {
    width: u32,
    height: u32,
    ready: AtomicBool,
    live: Arc<AtomicBool>,
    frames: AtomicU64,
    /// Every capture returns identical bytes
    repeat_content: bool,
    capture_delay: Duration,
}

impl SyntheticVideo {
    pub fn frames_captured(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// False once the owning stream's tracks were stopped
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }
}

impl VideoSource for SyntheticVideo {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed) && self.is_live()
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture_jpeg(
        &self,
        width: u32,
        height: u32,
        quality: f32,
    ) -> BoxFuture<'static, Result<Bytes, CaptureError>> {
        if !self.is_live() {
            return Box::pin(async { Err(CaptureError::NotReady) });
        }

        let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        let seed = if self.repeat_content { 0 } else { n };
        let delay = self.capture_delay;

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            // Leading byte varies per frame: the detection cache key samples byte 0
            let mut data = Vec::with_capacity(SYNTHETIC_FRAME_LEN);
            data.push(seed as u8);
            data.extend_from_slice(&seed.to_le_bytes());
            data.extend_from_slice(&width.to_le_bytes());
            data.extend_from_slice(&height.to_le_bytes());
            data.push((quality.clamp(0.0, 1.0) * 100.0) as u8);
            data.resize(SYNTHETIC_FRAME_LEN, 0);
            Ok(Bytes::from(data))
        })
    }
}

struct SyntheticStream {
    video: Arc<SyntheticVideo>,
    live: Arc<AtomicBool>,
    stops: Arc<AtomicU64>,
}

impl MediaStream for SyntheticStream {
    fn video(&self) -> Arc<dyn VideoSource> {
        Arc::clone(&self.video) as Arc<dyn VideoSource>
    }

    fn stop_tracks(&self) {
        if self.live.swap(false, Ordering::Relaxed) {
            self.stops.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Media subsystem that hands out [`SyntheticVideo`] streams.
///
/// Counts stream starts and stops, records the constraints of each request,
/// and can be scripted to fail upcoming requests.
#[derive(Clone)]
pub struct SyntheticMedia {
    width: u32,
    height: u32,
    starts: Arc<AtomicU64>,
    stops: Arc<AtomicU64>,
    requests: Arc<Mutex<Vec<CaptureConstraints>>>,
    failures: Arc<Mutex<VecDeque<CameraError>>>,
    videos: Arc<Mutex<Vec<Arc<SyntheticVideo>>>>,
    repeat_content: bool,
    capture_delay: Duration,
}

impl SyntheticMedia {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            starts: Arc::new(AtomicU64::new(0)),
            stops: Arc::new(AtomicU64::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            videos: Arc::new(Mutex::new(Vec::new())),
            repeat_content: false,
            capture_delay: Duration::ZERO,
        }
    }

    /// Every captured frame has the same bytes
    pub fn with_repeated_content(mut self) -> Self {
        self.repeat_content = true;
        self
    }

    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    /// Fail the next request with `error`; queued failures apply in order
    pub fn fail_next(&self, error: CameraError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(error);
        }
    }

    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }

    pub fn stops(&self) -> u64 {
        self.stops.load(Ordering::Relaxed)
    }

    /// Streams started and not yet stopped
    pub fn live_streams(&self) -> u64 {
        self.starts() - self.stops()
    }

    pub fn requests(&self) -> Vec<CaptureConstraints> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Most recently opened video
    pub fn last_video(&self) -> Option<Arc<SyntheticVideo>> {
        self.videos.lock().ok().and_then(|videos| videos.last().cloned())
    }
}

impl MediaDevices for SyntheticMedia {
    fn open_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> BoxFuture<'static, Result<Box<dyn MediaStream>, CameraError>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(*constraints);
        }

        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.pop_front());
        if let Some(error) = failure {
            return Box::pin(async move { Err(error) });
        }

        let live = Arc::new(AtomicBool::new(true));
        let video = Arc::new(SyntheticVideo {
            width: self.width.min(constraints.width.max),
            height: self.height.min(constraints.height.max),
            ready: AtomicBool::new(true),
            live: Arc::clone(&live),
            frames: AtomicU64::new(0),
            repeat_content: self.repeat_content,
            capture_delay: self.capture_delay,
        });
        if let Ok(mut videos) = self.videos.lock() {
            videos.push(Arc::clone(&video));
        }
        self.starts.fetch_add(1, Ordering::Relaxed);

        let stream = SyntheticStream {
            video,
            live,
            stops: Arc::clone(&self.stops),
        };
        Box::pin(async move { Ok(Box::new(stream) as Box<dyn MediaStream>) })
    }
}

#[derive(Debug, Default)]
struct SceneInner {
    model: Option<ModelHandle>,
    transform: TrackedTransform,
    transform_updates: u64,
    next_id: u64,
    disposed: bool,
}

/// Scene that keeps the transform in memory and records updates
#[derive(Clone, Default)]
pub struct RecordingScene {
    inner: Arc<Mutex<SceneInner>>,
    fail_model_load: Arc<AtomicBool>,
    load_delay: Duration,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every asset load fails; placeholders still load
    pub fn failing_model_loads(self) -> Self {
        self.fail_model_load.store(true, Ordering::Relaxed);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn transform_updates(&self) -> u64 {
        self.inner.lock().map(|inner| inner.transform_updates).unwrap_or(0)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().map(|inner| inner.disposed).unwrap_or(true)
    }

    /// Drop the current model so placement sees an unloaded scene
    pub fn clear_model(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.model = None;
        }
    }

    fn install(&self, source: ModelSource, scale: f32) -> Result<ModelHandle, SceneError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| SceneError::Other("scene lock poisoned".to_string()))?;
        if inner.disposed {
            return Err(SceneError::Disposed);
        }

        inner.next_id += 1;
        let handle = ModelHandle {
            id: inner.next_id,
            source,
            scale,
        };
        inner.model = Some(handle.clone());
        inner.transform = TrackedTransform::default();
        Ok(handle)
    }
}

impl ArScene for RecordingScene {
    fn load_model(&self, request: ModelRequest) -> BoxFuture<'static, Result<ModelHandle, SceneError>> {
        let scene = self.clone();
        Box::pin(async move {
            if !scene.load_delay.is_zero() {
                tokio::time::sleep(scene.load_delay).await;
            }
            if scene.fail_model_load.load(Ordering::Relaxed) {
                return Err(SceneError::LoadFailed {
                    url: request.url,
                    reason: "asset not found".to_string(),
                });
            }
            scene.install(ModelSource::Asset { url: request.url }, request.scale)
        })
    }

    fn load_placeholder(&self, size: Vec3, scale: f32) -> Result<ModelHandle, SceneError> {
        self.install(ModelSource::Placeholder { size }, scale)
    }

    fn current_model(&self) -> Option<ModelHandle> {
        self.inner.lock().ok().and_then(|inner| inner.model.clone())
    }

    fn transform(&self) -> TrackedTransform {
        self.inner
            .lock()
            .map(|inner| inner.transform)
            .unwrap_or_default()
    }

    fn set_transform(&self, position: Vec3, rotation: Vec3) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.disposed {
                return;
            }
            inner.transform = TrackedTransform::new(position, rotation);
            inner.transform_updates += 1;
        }
    }

    fn dispose(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.model = None;
            inner.disposed = true;
        }
    }
}

/// Detector used when no endpoint is configured; every call fails
#[derive(Debug, Clone, Default)]
pub struct OfflineDetector;

impl ObjectDetector for OfflineDetector {
    fn detect_objects(
        &self,
        _image: Bytes,
    ) -> BoxFuture<'static, Result<Vec<DetectedObject>, DetectionError>> {
        Box::pin(async { Err(DetectionError::Transport("detector offline".to_string())) })
    }
}
