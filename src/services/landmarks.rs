use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::detector::{DetectionError, ObjectDetector};
use crate::metrics::TrackingMetrics;
use crate::models::{
    DegradeReason, DetectedObject, DetectorConfig, EncodedFrame, Landmark, Outcome, PoseFrame,
};

/// Rolling content hash over every `stride`-th byte.
///
/// Collisions between different frames are tolerated; a collision only means
/// a cached pose is reused for at most one cache lifetime.
pub fn content_hash(bytes: &[u8], stride: usize) -> u32 {
    let stride = stride.max(1);
    bytes
        .iter()
        .step_by(stride)
        .fold(0u32, |hash, &byte| {
            (hash << 5).wrapping_sub(hash).wrapping_add(byte as u32)
        })
}

#[derive(Debug, Clone)]
struct CacheEntry {
    /// `None` records that the detector saw no person in this frame
    pose: Option<PoseFrame>,
    stored_at: Instant,
}

/// Short-lived detection cache keyed by frame content hash
#[derive(Debug)]
pub struct DetectionCache {
    entries: HashMap<u32, CacheEntry>,
    timeout: Duration,
}

impl DetectionCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
        }
    }

    /// Returns the stored result if it is younger than the timeout.
    /// The outer `Option` is the hit, the inner one the stored pose.
    pub fn get(&self, key: u32) -> Option<Option<PoseFrame>> {
        let entry = self.entries.get(&key)?;
        if entry.stored_at.elapsed() < self.timeout {
            Some(entry.pose)
        } else {
            None
        }
    }

    pub fn insert(&mut self, key: u32, pose: Option<PoseFrame>) {
        self.entries.insert(
            key,
            CacheEntry {
                pose,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop entries older than twice the timeout; returns how many were removed
    pub fn cleanup(&mut self) -> usize {
        let max_age = self.timeout * 2;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() <= max_age);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pick the most confident person above the floor (strictly greater).
/// Earlier objects win ties.
pub fn select_person(objects: &[DetectedObject], floor: f32) -> Option<&DetectedObject> {
    objects
        .iter()
        .filter(|obj| obj.is_person() && obj.confidence > floor)
        .fold(None, |best: Option<&DetectedObject>, obj| match best {
            Some(current) if current.confidence >= obj.confidence => Some(current),
            _ => Some(obj),
        })
}

/// Derive approximate shoulder and hip landmarks from a person box.
///
/// Box coordinates are pixels of a `width`×`height` image. Output is
/// normalised and clamped to 0.0..=1.0.
pub fn landmarks_from_person(person: &DetectedObject, width: u32, height: u32) -> PoseFrame {
    let rect = &person.rect;
    let scale_x = if width > 0 { width as f32 } else { 1.0 };
    let scale_y = if height > 0 { height as f32 } else { 1.0 };
    let center_x = rect.center_x();

    let point = |x: f32, y: f32, confidence: f32| {
        Landmark::new(
            (x / scale_x).clamp(0.0, 1.0),
            (y / scale_y).clamp(0.0, 1.0),
            confidence,
        )
    };

    let shoulder_y = rect.y + rect.h * 0.25;
    let hip_y = rect.y + rect.h * 0.65;
    let shoulder_conf = person.confidence * 0.8;
    let hip_conf = person.confidence * 0.7;

    PoseFrame::new(
        point(center_x - rect.w * 0.3, shoulder_y, shoulder_conf),
        point(center_x + rect.w * 0.3, shoulder_y, shoulder_conf),
        point(center_x - rect.w * 0.25, hip_y, hip_conf),
        point(center_x + rect.w * 0.25, hip_y, hip_conf),
    )
}

/// Full estimation step: person selection followed by landmark derivation
pub fn estimate_pose(
    objects: &[DetectedObject],
    width: u32,
    height: u32,
    floor: f32,
) -> Option<PoseFrame> {
    select_person(objects, floor).map(|person| landmarks_from_person(person, width, height))
}

/// Plausible synthetic pose near the upper centre of the frame
pub struct FallbackPoseGenerator {
    rng: Mutex<StdRng>,
}

impl FallbackPoseGenerator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn generate(&self) -> PoseFrame {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let center_x = 0.5 + rng.gen_range(-0.05f32..=0.05);
        let center_y = 0.4 + rng.gen_range(-0.025f32..=0.025);
        let shoulder_conf = 0.85 + rng.gen_range(0.0f32..=0.1);
        let hip_conf = 0.8 + rng.gen_range(0.0f32..=0.1);

        PoseFrame::new(
            Landmark::new(center_x - 0.1, center_y, shoulder_conf),
            Landmark::new(center_x + 0.1, center_y, shoulder_conf),
            Landmark::new(center_x - 0.08, center_y + 0.3, hip_conf),
            Landmark::new(center_x + 0.08, center_y + 0.3, hip_conf),
        )
    }
}

impl Default for FallbackPoseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunables for the landmark service, taken from [`DetectorConfig`]
#[derive(Debug, Clone)]
pub struct LandmarkSettings {
    pub cache_timeout: Duration,
    pub rate_limit: Duration,
    pub confidence_floor: f32,
    pub hash_stride: usize,
}

impl From<&DetectorConfig> for LandmarkSettings {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            cache_timeout: config.cache_timeout(),
            rate_limit: config.rate_limit(),
            confidence_floor: config.person_confidence_floor,
            hash_stride: config.hash_stride,
        }
    }
}

impl Default for LandmarkSettings {
    fn default() -> Self {
        Self::from(&DetectorConfig::default())
    }
}

/// Turns encoded frames into landmark sets.
///
/// Never fails: detector errors and empty scenes produce a synthetic pose
/// marked as degraded so the tracking loop keeps running.
pub struct LandmarkEstimationService {
    detector: Arc<dyn ObjectDetector>,
    cache: Mutex<DetectionCache>,
    last_call: tokio::sync::Mutex<Option<Instant>>,
    fallback: FallbackPoseGenerator,
    settings: LandmarkSettings,
    metrics: Arc<TrackingMetrics>,
}

impl LandmarkEstimationService {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        settings: LandmarkSettings,
        metrics: Arc<TrackingMetrics>,
    ) -> Self {
        Self::with_fallback(detector, settings, metrics, FallbackPoseGenerator::new())
    }

    pub fn with_fallback(
        detector: Arc<dyn ObjectDetector>,
        settings: LandmarkSettings,
        metrics: Arc<TrackingMetrics>,
        fallback: FallbackPoseGenerator,
    ) -> Self {
        let cache = DetectionCache::new(settings.cache_timeout);
        Self {
            detector,
            cache: Mutex::new(cache),
            last_call: tokio::sync::Mutex::new(None),
            fallback,
            settings,
            metrics,
        }
    }

    pub fn settings(&self) -> &LandmarkSettings {
        &self.settings
    }

    /// Detect using the service's own detector
    pub async fn detect(&self, frame: &EncodedFrame) -> Outcome<PoseFrame> {
        let detector = Arc::clone(&self.detector);
        self.detect_with(frame, move |bytes| detector.detect_objects(bytes))
            .await
    }

    /// Detect using a caller-supplied transport.
    ///
    /// Caching, rate limiting and fallback behave exactly as in [`detect`];
    /// only the call that produces the raw objects is replaced.
    ///
    /// [`detect`]: Self::detect
    pub async fn detect_with<F, Fut>(&self, frame: &EncodedFrame, fetch: F) -> Outcome<PoseFrame>
    where
        F: FnOnce(Bytes) -> Fut,
        Fut: Future<Output = Result<Vec<DetectedObject>, DetectionError>>,
    {
        let fetch = |bytes| {
            let call = fetch(bytes);
            async move { Ok::<_, Infallible>(call.await) }
        };
        match self.try_detect_with(frame, fetch).await {
            Ok(outcome) => outcome,
            Err(never) => match never {},
        }
    }

    /// Detect through a transport that can itself break.
    ///
    /// An outer `Err` means the request never reached the detector: it is
    /// returned untouched, no metrics are recorded and the rate-limit slot
    /// is handed back so a retry on another transport does not wait twice.
    /// Inner detector errors degrade to a synthetic pose as usual.
    pub async fn try_detect_with<F, Fut, E>(
        &self,
        frame: &EncodedFrame,
        fetch: F,
    ) -> Result<Outcome<PoseFrame>, E>
    where
        F: FnOnce(Bytes) -> Fut,
        Fut: Future<Output = Result<Result<Vec<DetectedObject>, DetectionError>, E>>,
    {
        let key = content_hash(&frame.bytes, self.settings.hash_stride);

        if let Some(cached) = self.cached(key) {
            debug!("Detection cache hit for frame {} (key {:08x})", frame.id, key);
            self.metrics.record_cache_hit();
            return Ok(self.resolve(cached));
        }

        let (previous_call, this_call) = self.throttle().await;

        let detected = match fetch(frame.bytes.clone()).await {
            Ok(detected) => detected,
            Err(e) => {
                let mut last_call = self.last_call.lock().await;
                if *last_call == Some(this_call) {
                    *last_call = previous_call;
                }
                return Err(e);
            }
        };
        self.metrics.record_network_call();

        Ok(match detected {
            Ok(objects) => {
                let pose = estimate_pose(
                    &objects,
                    frame.width,
                    frame.height,
                    self.settings.confidence_floor,
                );
                self.store(key, pose);
                self.resolve(pose)
            }
            Err(e) => {
                warn!("Detection failed for frame {}: {}", frame.id, e);
                self.metrics.record_fallback();
                Outcome::degraded(self.fallback.generate(), DegradeReason::DetectionUnavailable)
            }
        })
    }

    /// Remove stale cache entries; returns how many were dropped
    pub fn cleanup_cache(&self) -> usize {
        let removed = match self.cache.lock() {
            Ok(mut cache) => cache.cleanup(),
            Err(poisoned) => poisoned.into_inner().cleanup(),
        };
        if removed > 0 {
            debug!("Removed {} stale detection cache entries", removed);
        }
        removed
    }

    pub fn cache_len(&self) -> usize {
        match self.cache.lock() {
            Ok(cache) => cache.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn cached(&self, key: u32) -> Option<Option<PoseFrame>> {
        match self.cache.lock() {
            Ok(cache) => cache.get(key),
            Err(poisoned) => poisoned.into_inner().get(key),
        }
    }

    fn store(&self, key: u32, pose: Option<PoseFrame>) {
        match self.cache.lock() {
            Ok(mut cache) => cache.insert(key, pose),
            Err(poisoned) => poisoned.into_inner().insert(key, pose),
        }
    }

    fn resolve(&self, pose: Option<PoseFrame>) -> Outcome<PoseFrame> {
        match pose {
            Some(pose) => Outcome::Ok(pose),
            None => {
                self.metrics.record_fallback();
                Outcome::degraded(self.fallback.generate(), DegradeReason::NoPersonDetected)
            }
        }
    }

    /// Wait until at least `rate_limit` has passed since the previous call.
    /// Returns the previous and the newly stamped call times.
    async fn throttle(&self) -> (Option<Instant>, Instant) {
        let mut last_call = self.last_call.lock().await;
        let previous_call = *last_call;
        if let Some(previous) = previous_call {
            let elapsed = previous.elapsed();
            if elapsed < self.settings.rate_limit {
                let wait = self.settings.rate_limit - elapsed;
                debug!("Rate limiting detector call for {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        let this_call = Instant::now();
        *last_call = Some(this_call);
        (previous_call, this_call)
    }
}
