//! HTTP client for the camouflage analysis service.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::acquisition::UploadedImage;
use crate::analysis::{AnalysisResult, ErrorDocument};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5020/analyze-camouflage";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("an analysis is already in progress")]
    AlreadyRunning,
    #[error("request to analysis service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("analysis service returned {status}")]
    Status { status: u16, detail: Option<String> },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub timeout: Duration,
    /// Extra attempts after a network failure. Error statuses are never retried.
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: 0,
        }
    }
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    image: &'a str,
}

pub struct AnalysisClient {
    http: reqwest::Client,
    config: ClientConfig,
    in_flight: Mutex<()>,
}

impl AnalysisClient {
    pub fn new(config: ClientConfig) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            in_flight: Mutex::new(()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Sends `image` for analysis. Only one call may be outstanding at a time.
    ///
    /// A successful response that cannot be parsed resolves to
    /// [`AnalysisResult::fallback`].
    pub async fn analyze(&self, image: &UploadedImage) -> Result<AnalysisResult, AnalysisError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| AnalysisError::AlreadyRunning)?;

        info!(
            "Sending {} ({} bytes) to {}",
            image.name,
            image.size(),
            self.config.endpoint
        );

        let mut attempt = 0;
        let response = loop {
            match self.send(image).await {
                Ok(response) => break response,
                Err(err) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!("Analysis request failed ({}), retry {}", err, attempt);
                }
                Err(err) => return Err(err.into()),
            }
        };

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorDocument>(&body)
                .ok()
                .map(|doc| doc.error);
            warn!(
                "Analysis service returned {}: {}",
                status,
                detail.as_deref().unwrap_or("no error detail")
            );
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(AnalysisResult::parse_or_fallback(&body))
    }

    async fn send(&self, image: &UploadedImage) -> Result<reqwest::Response, reqwest::Error> {
        self.http
            .post(&self.config.endpoint)
            .json(&AnalyzeRequest {
                image: &image.preview,
            })
            .send()
            .await
    }
}
