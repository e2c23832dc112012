use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use thiserror::Error;

use crate::models::DetectedObject;

/// Header carrying the detector access key (lowercase, as `HeaderName` stores it)
pub const ACCESS_KEY_HEADER: &str = "ocp-apim-subscription-key";

/// Failures reaching or understanding the remote detector.
///
/// Never surfaced past the landmark service, which substitutes a synthetic pose.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("Detector request failed: {0}")]
    Transport(String),

    #[error("Detector returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse detector response: {0}")]
    Parse(String),

    #[error("Invalid detector configuration: {0}")]
    Config(String),
}

/// Remote object detector: one encoded image in, labelled boxes out.
#[cfg_attr(test, mockall::automock)]
pub trait ObjectDetector: Send + Sync {
    fn detect_objects(
        &self,
        image: Bytes,
    ) -> BoxFuture<'static, Result<Vec<DetectedObject>, DetectionError>>;
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    objects: Vec<DetectedObject>,
}

/// HTTP client for a vision service that accepts raw image bytes.
///
/// The access key is set once as a sensitive default header and is never
/// copied into requests handed to other execution contexts.
#[derive(Debug, Clone)]
pub struct HttpDetector {
    client: reqwest::Client,
    url: String,
}

impl HttpDetector {
    pub fn new(endpoint: &str, request_path: &str, api_key: &str) -> Result<Self, DetectionError> {
        if endpoint.trim().is_empty() {
            return Err(DetectionError::Config("endpoint is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .default_headers(access_headers(api_key)?)
            .build()
            .map_err(|e| DetectionError::Config(e.to_string()))?;

        let url = format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            request_path.trim_start_matches('/')
        );
        tracing::info!("Remote detector configured: {}", url);

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Default headers for an access key; empty when running without one.
fn access_headers(api_key: &str) -> Result<HeaderMap, DetectionError> {
    let mut headers = HeaderMap::new();
    if !api_key.is_empty() {
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| DetectionError::Config(format!("access key: {}", e)))?;
        key.set_sensitive(true);
        headers.insert(HeaderName::from_static(ACCESS_KEY_HEADER), key);
    }
    Ok(headers)
}

impl ObjectDetector for HttpDetector {
    fn detect_objects(
        &self,
        image: Bytes,
    ) -> BoxFuture<'static, Result<Vec<DetectedObject>, DetectionError>> {
        let client = self.client.clone();
        let url = self.url.clone();

        Box::pin(async move {
            let response = client
                .post(&url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(image)
                .send()
                .await
                .map_err(|e| DetectionError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DetectionError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: DetectResponse = response
                .json()
                .await
                .map_err(|e| DetectionError::Parse(e.to_string()))?;

            tracing::debug!("Detector returned {} objects", parsed.objects.len());
            Ok(parsed.objects)
        })
    }
}
