use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

mod analysis;
#[cfg(feature = "cache")]
mod cache;
mod detector;
mod error;
mod fetcher;
#[cfg(feature = "logging")]
mod logging;
mod mapper;
mod orchestrator;
mod preview_generator;
mod utils;

pub use analysis::{AnalysisRequest, SubmittedCheck};
#[cfg(feature = "cache")]
pub use cache::Cache;
pub use detector::{detect_url, SupportedDomains, UrlDetector};
pub use error::PreviewError;
pub use fetcher::{fetch_cancellable, FetchOutcome, Fetcher, FetcherConfig};
#[cfg(feature = "logging")]
pub use logging::{log_error_card, log_preview_card, setup_logging, LogConfig, LogLevelGuard};
pub use mapper::{map_post_preview_to_link_preview, map_post_preview_to_link_preview_at};
pub use orchestrator::{OrchestratorConfig, PreviewOrchestrator, PreviewState};
pub use preview_generator::{fetch_url_metadata, LinkPreviewGenerator};
pub use utils::{extract_domain, truncate_str};

/// Preview cards show at most this many images.
pub const MAX_DISPLAYED_IMAGES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LinkPreviewData {
    pub url: String,
    pub title: String,
    pub author: String,
    pub date: Option<String>,
    pub content: String,
    pub images: Vec<String>,
}

impl LinkPreviewData {
    pub fn displayed_images(&self) -> &[String] {
        &self.images[..self.images.len().min(MAX_DISPLAYED_IMAGES)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Reddit,
}

/// Post metadata as returned by the preview endpoint.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PostPreview {
    pub platform: Platform,
    pub author: String,
    #[serde(default)]
    pub created_at: Option<String>,
    pub text: String,
    pub text_preview: String,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PreviewResponse {
    pub data: PostPreview,
}

/// Source of post previews. Implementations must stop work and return
/// [`PreviewError::Cancelled`] once `cancel` fires.
#[async_trait]
pub trait PreviewFetcher: Send + Sync {
    async fn fetch_preview(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<PostPreview, PreviewError>;
}
