// Background detection context
//
// A separate task that relays encoded frames to the detector and answers by
// message. Requests carry only frame bytes and ids; the detector client (and
// its access key) is handed over once when the context is spawned.

use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::detector::{DetectionError, ObjectDetector};
use super::landmarks::LandmarkEstimationService;
use crate::metrics::TrackingMetrics;
use crate::models::{DetectedObject, EncodedFrame, Outcome, PoseFrame};

const CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
pub enum WorkerRequest {
    Init,
    ProcessFrame { bytes: Bytes, frame_id: u64 },
    Teardown,
}

#[derive(Debug, Clone)]
pub enum WorkerResponse {
    InitAck,
    /// Raw detector answer for one frame
    FrameResult {
        result: Result<Vec<DetectedObject>, DetectionError>,
        frame_id: u64,
    },
    /// The context itself failed and will not answer further requests
    Error { message: String },
    TeardownAck,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Worker did not acknowledge init within {0:?}")]
    InitTimeout(Duration),

    #[error("Worker channel closed")]
    ChannelClosed,

    #[error("Worker reported an error: {0}")]
    Remote(String),

    #[error("Unexpected worker message: {0}")]
    Protocol(String),
}

async fn run_context(
    detector: Arc<dyn ObjectDetector>,
    mut requests: mpsc::Receiver<WorkerRequest>,
    responses: mpsc::Sender<WorkerResponse>,
) {
    while let Some(request) = requests.recv().await {
        let response = match request {
            WorkerRequest::Init => WorkerResponse::InitAck,
            WorkerRequest::ProcessFrame { bytes, frame_id } => {
                let result = detector.detect_objects(bytes).await;
                WorkerResponse::FrameResult { result, frame_id }
            }
            WorkerRequest::Teardown => {
                let _ = responses.send(WorkerResponse::TeardownAck).await;
                break;
            }
        };

        if responses.send(response).await.is_err() {
            break;
        }
    }
    debug!("Worker context exited");
}

/// Owning handle to a running background context
pub struct BackgroundWorker {
    requests: mpsc::Sender<WorkerRequest>,
    responses: tokio::sync::Mutex<mpsc::Receiver<WorkerResponse>>,
    task: Mutex<Option<JoinHandle<()>>>,
    latest_sent: Mutex<Option<u64>>,
    metrics: Arc<TrackingMetrics>,
}

impl BackgroundWorker {
    /// Spawn the context task without waiting for it
    pub fn spawn(detector: Arc<dyn ObjectDetector>, metrics: Arc<TrackingMetrics>) -> Self {
        let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (response_tx, response_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(run_context(detector, request_rx, response_tx));
        Self::from_channels(request_tx, response_rx, Some(task), metrics)
    }

    /// Wrap an existing pair of channels, for contexts not spawned here
    pub fn from_channels(
        requests: mpsc::Sender<WorkerRequest>,
        responses: mpsc::Receiver<WorkerResponse>,
        task: Option<JoinHandle<()>>,
        metrics: Arc<TrackingMetrics>,
    ) -> Self {
        Self {
            requests,
            responses: tokio::sync::Mutex::new(responses),
            task: Mutex::new(task),
            latest_sent: Mutex::new(None),
            metrics,
        }
    }

    /// Send `Init` and wait for `InitAck`
    pub async fn establish(&self, timeout: Duration) -> Result<(), WorkerError> {
        self.requests
            .send(WorkerRequest::Init)
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;

        let mut responses = self.responses.lock().await;
        match tokio::time::timeout(timeout, responses.recv()).await {
            Ok(Some(WorkerResponse::InitAck)) => Ok(()),
            Ok(Some(WorkerResponse::Error { message })) => Err(WorkerError::Remote(message)),
            Ok(Some(other)) => Err(WorkerError::Protocol(format!("{:?}", other))),
            Ok(None) => Err(WorkerError::ChannelClosed),
            Err(_) => Err(WorkerError::InitTimeout(timeout)),
        }
    }

    /// Send one frame and wait for its result.
    ///
    /// Results tagged with any id other than the one just sent are stale
    /// leftovers from an abandoned round trip and are dropped.
    pub async fn round_trip(
        &self,
        bytes: Bytes,
        frame_id: u64,
    ) -> Result<Result<Vec<DetectedObject>, DetectionError>, WorkerError> {
        let mut responses = self.responses.lock().await;

        if let Ok(mut latest) = self.latest_sent.lock() {
            *latest = Some(frame_id);
        }
        self.requests
            .send(WorkerRequest::ProcessFrame { bytes, frame_id })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;

        loop {
            match responses.recv().await {
                Some(WorkerResponse::FrameResult {
                    result,
                    frame_id: id,
                }) if id == frame_id => return Ok(result),
                Some(WorkerResponse::FrameResult { frame_id: id, .. }) => {
                    debug!("Discarding stale worker result for frame {} (latest {})", id, frame_id);
                    self.metrics.record_stale_worker_result();
                }
                Some(WorkerResponse::Error { message }) => return Err(WorkerError::Remote(message)),
                Some(other) => return Err(WorkerError::Protocol(format!("{:?}", other))),
                None => return Err(WorkerError::ChannelClosed),
            }
        }
    }

    pub fn latest_sent(&self) -> Option<u64> {
        self.latest_sent.lock().ok().and_then(|latest| *latest)
    }

    /// Send `Teardown`, wait briefly for the ack, then release the task
    pub async fn teardown(&self, timeout: Duration) {
        if self.requests.send(WorkerRequest::Teardown).await.is_ok() {
            let mut responses = self.responses.lock().await;
            let acked = tokio::time::timeout(timeout, async {
                while let Some(response) = responses.recv().await {
                    if matches!(response, WorkerResponse::TeardownAck) {
                        return true;
                    }
                }
                false
            })
            .await;

            match acked {
                Ok(true) => debug!("Worker acknowledged teardown"),
                _ => warn!("Worker did not acknowledge teardown"),
            }
        }

        let task = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

/// How a tick turns an encoded frame into a pose
pub trait DetectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_offloaded(&self) -> bool;

    /// `Err` means the strategy itself broke, not that detection failed
    fn detect<'a>(
        &'a self,
        frame: &'a EncodedFrame,
    ) -> BoxFuture<'a, Result<Outcome<PoseFrame>, WorkerError>>;

    fn teardown(&self) -> BoxFuture<'_, ()>;
}

/// Calls the landmark service in the tracking task itself
pub struct InlineDetector {
    service: Arc<LandmarkEstimationService>,
}

impl InlineDetector {
    pub fn new(service: Arc<LandmarkEstimationService>) -> Self {
        Self { service }
    }
}

impl DetectionStrategy for InlineDetector {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn is_offloaded(&self) -> bool {
        false
    }

    fn detect<'a>(
        &'a self,
        frame: &'a EncodedFrame,
    ) -> BoxFuture<'a, Result<Outcome<PoseFrame>, WorkerError>> {
        Box::pin(async move { Ok(self.service.detect(frame).await) })
    }

    fn teardown(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Relays the detector call through a [`BackgroundWorker`].
///
/// Cache, rate limit and fallback stay with the landmark service in the
/// calling task; only the network round trip moves.
pub struct OffloadedDetector {
    service: Arc<LandmarkEstimationService>,
    worker: BackgroundWorker,
    teardown_timeout: Duration,
}

impl OffloadedDetector {
    pub fn new(
        service: Arc<LandmarkEstimationService>,
        worker: BackgroundWorker,
        teardown_timeout: Duration,
    ) -> Self {
        Self {
            service,
            worker,
            teardown_timeout,
        }
    }

    pub fn worker(&self) -> &BackgroundWorker {
        &self.worker
    }
}

impl DetectionStrategy for OffloadedDetector {
    fn name(&self) -> &'static str {
        "offloaded"
    }

    fn is_offloaded(&self) -> bool {
        true
    }

    fn detect<'a>(
        &'a self,
        frame: &'a EncodedFrame,
    ) -> BoxFuture<'a, Result<Outcome<PoseFrame>, WorkerError>> {
        let worker = &self.worker;
        let frame_id = frame.id;
        Box::pin(
            self.service
                .try_detect_with(frame, move |bytes| worker.round_trip(bytes, frame_id)),
        )
    }

    fn teardown(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.worker.teardown(self.teardown_timeout))
    }
}

/// Pick the strategy once at session start.
///
/// Falls back to inline when offload is disabled, the host has no
/// background context, or the worker does not acknowledge init in time.
pub async fn select_strategy(
    offload: bool,
    background_supported: bool,
    service: Arc<LandmarkEstimationService>,
    detector: Arc<dyn ObjectDetector>,
    init_timeout: Duration,
    metrics: Arc<TrackingMetrics>,
) -> Box<dyn DetectionStrategy> {
    if !offload || !background_supported {
        info!("Using inline detection");
        return Box::new(InlineDetector::new(service));
    }

    let worker = BackgroundWorker::spawn(detector, metrics);
    match worker.establish(init_timeout).await {
        Ok(()) => {
            info!("Background detection context established");
            Box::new(OffloadedDetector::new(service, worker, init_timeout))
        }
        Err(e) => {
            warn!("Background context unavailable, using inline detection: {}", e);
            worker.teardown(Duration::from_millis(50)).await;
            Box::new(InlineDetector::new(service))
        }
    }
}
