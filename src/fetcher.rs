use crate::analysis::{AnalysisRequest, CheckResponse, SubmittedCheck};
use crate::{PostPreview, PreviewError, PreviewFetcher, PreviewResponse};
use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};
use url::Url;

pub const API_BASE_URL_ENV: &str = "TRADE_SAFETY_API_BASE_URL";
pub const API_TIMEOUT_ENV: &str = "TRADE_SAFETY_API_TIMEOUT_SECS";

/// Result of a request raced against a cancellation token.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    Ready(T),
    Cancelled,
    Failed(PreviewError),
}

impl<T> FetchOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchOutcome::Cancelled)
    }

    pub fn into_result(self) -> Result<T, PreviewError> {
        match self {
            FetchOutcome::Ready(value) => Ok(value),
            FetchOutcome::Cancelled => Err(PreviewError::Cancelled),
            FetchOutcome::Failed(e) => Err(e),
        }
    }
}

/// Drives `request` until it settles or `cancel` fires, whichever comes first.
pub async fn fetch_cancellable<T, F>(cancel: &CancellationToken, request: F) -> FetchOutcome<T>
where
    F: Future<Output = Result<T, PreviewError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => FetchOutcome::Cancelled,
        result = request => match result {
            Ok(value) => FetchOutcome::Ready(value),
            Err(e) if e.is_cancelled() => FetchOutcome::Cancelled,
            Err(e) => FetchOutcome::Failed(e),
        },
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub api_base_url: String,
    pub resource: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub headers: Option<HeaderMap>,
}

impl FetcherConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            resource: "trade-safety".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: format!("trade-safety-preview/{}", env!("CARGO_PKG_VERSION")),
            headers: None,
        }
    }

    /// Reads the API base URL (required) and request timeout (optional) from the environment.
    pub fn from_env() -> Result<Self, PreviewError> {
        let base = std::env::var(API_BASE_URL_ENV).map_err(|_| {
            PreviewError::InvalidConfiguration(format!("{API_BASE_URL_ENV} is not set"))
        })?;
        let mut config = Self::new(base);

        if let Ok(secs) = std::env::var(API_TIMEOUT_ENV) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                PreviewError::InvalidConfiguration(format!(
                    "{API_TIMEOUT_ENV} must be a whole number of seconds, got {secs:?}"
                ))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        debug!(api_base_url = %config.api_base_url, "Loaded fetcher configuration from environment");
        Ok(config)
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    fn resource_base(&self) -> Result<String, PreviewError> {
        let base = Url::parse(&self.api_base_url).map_err(|e| {
            PreviewError::InvalidConfiguration(format!(
                "invalid API base URL {:?}: {e}",
                self.api_base_url
            ))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(PreviewError::InvalidConfiguration(format!(
                "API base URL must be http(s), got {}",
                base.scheme()
            )));
        }

        Ok(format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.resource.trim_matches('/')
        ))
    }
}

#[derive(Serialize)]
struct PreviewRequest<'a> {
    url: &'a str,
}

/// HTTP client for the trade safety backend.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    resource_base: String,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, PreviewError> {
        let mut client_builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout);

        if let Some(headers) = config.headers.clone() {
            client_builder = client_builder.default_headers(headers);
        }

        let client = client_builder.build().map_err(|e| {
            error!(error = %e, "Failed to create HTTP client");
            PreviewError::InvalidConfiguration(format!("failed to build HTTP client: {e}"))
        })?;

        Self::with_client(client, &config)
    }

    pub fn with_client(client: Client, config: &FetcherConfig) -> Result<Self, PreviewError> {
        let resource_base = config.resource_base()?;
        debug!(resource_base = %resource_base, "Fetcher initialized");
        Ok(Self {
            client,
            resource_base,
        })
    }

    pub fn preview_endpoint(&self) -> String {
        format!("{}/preview", self.resource_base)
    }

    pub fn resource_endpoint(&self) -> &str {
        &self.resource_base
    }

    #[instrument(level = "debug", skip(self), err)]
    pub async fn request_preview(&self, url: &str) -> Result<PostPreview, PreviewError> {
        debug!(url = %url, "Requesting post preview");
        let response: PreviewResponse = self
            .post_json(&self.preview_endpoint(), &PreviewRequest { url })
            .await?;

        debug!(
            url = %url,
            platform = ?response.data.platform,
            images = response.data.images.len(),
            "Received post preview"
        );
        Ok(response.data)
    }

    #[instrument(level = "debug", skip(self, request), err)]
    pub async fn submit_analysis(
        &self,
        request: &AnalysisRequest,
    ) -> Result<SubmittedCheck, PreviewError> {
        debug!(
            input_len = request.input_text.len(),
            images = request.image_urls.as_ref().map_or(0, Vec::len),
            "Submitting trade safety check"
        );
        let response: CheckResponse = self.post_json(&self.resource_base, request).await?;
        Ok(response.data)
    }

    async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R, PreviewError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, endpoint = %endpoint, "Failed to send request");
                PreviewError::from_reqwest(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PreviewError::from_status(
                status.as_u16(),
                api_error_message(status.as_u16(), &text),
            ));
        }

        let bytes = response.bytes().await.map_err(|e| {
            error!(error = %e, endpoint = %endpoint, "Failed to read response body");
            PreviewError::from_reqwest(e)
        })?;

        serde_json::from_slice(&bytes).map_err(|e| PreviewError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PreviewFetcher for Fetcher {
    async fn fetch_preview(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<PostPreview, PreviewError> {
        fetch_cancellable(cancel, self.request_preview(url))
            .await
            .into_result()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Prefers the backend's `detail` string, then the raw body, then a status line.
fn api_error_message(status: u16, body: &str) -> String {
    let fallback = format!("API Error: {status}");
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Some(serde_json::Value::String(detail)),
        }) if !detail.is_empty() => detail,
        Ok(_) => fallback,
        Err(_) if !body.trim().is_empty() => body.to_string(),
        Err(_) => fallback,
    }
}
