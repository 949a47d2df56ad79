#[cfg(feature = "cache")]
use crate::Cache;
use crate::{
    extract_domain, map_post_preview_to_link_preview, LinkPreviewData, PreviewError,
    PreviewFetcher, SupportedDomains,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Fetches post previews and maps them into [`LinkPreviewData`].
pub struct LinkPreviewGenerator<F> {
    fetcher: Arc<F>,
    domains: SupportedDomains,
    #[cfg(feature = "cache")]
    cache: Option<Cache>,
}

impl<F> Clone for LinkPreviewGenerator<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            domains: self.domains.clone(),
            #[cfg(feature = "cache")]
            cache: self.cache.clone(),
        }
    }
}

impl<F: PreviewFetcher> LinkPreviewGenerator<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self::with_domains(fetcher, SupportedDomains::default())
    }

    pub fn with_domains(fetcher: Arc<F>, domains: SupportedDomains) -> Self {
        Self {
            fetcher,
            domains,
            #[cfg(feature = "cache")]
            cache: None,
        }
    }

    #[cfg(feature = "cache")]
    pub fn with_cache(mut self, capacity: usize) -> Self {
        self.cache = Some(Cache::new(capacity));
        self
    }

    pub fn domains(&self) -> &SupportedDomains {
        &self.domains
    }

    /// Fetches and maps the preview for a URL already known to be supported.
    pub async fn generate_preview(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<LinkPreviewData, PreviewError> {
        #[cfg(feature = "cache")]
        if let Some(cached) = self.cached(url).await {
            debug!(url = %url, "Serving preview from cache");
            return Ok(cached);
        }

        let _ = Url::parse(url)?;
        let post = self.fetcher.fetch_preview(url, cancel).await?;
        if cancel.is_cancelled() {
            return Err(PreviewError::Cancelled);
        }

        let preview = map_post_preview_to_link_preview(post, url);
        debug!(url = %url, author = %preview.author, images = preview.images.len(), "Preview ready");

        #[cfg(feature = "cache")]
        if let Some(cache) = &self.cache {
            cache.set(url.to_string(), preview.clone()).await;
        }

        Ok(preview)
    }

    /// Like [`generate_preview`](Self::generate_preview), but yields `Ok(None)` for input that is
    /// not a URL or whose host is not supported, without touching the network.
    pub async fn fetch_url_metadata(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<LinkPreviewData>, PreviewError> {
        let Some(domain) = extract_domain(url) else {
            return Ok(None);
        };
        if !self.domains.is_supported(&domain) {
            debug!(domain = %domain, "Domain not supported for preview");
            return Ok(None);
        }

        self.generate_preview(url, cancel).await.map(Some)
    }

    #[cfg(feature = "cache")]
    async fn cached(&self, url: &str) -> Option<LinkPreviewData> {
        match &self.cache {
            Some(cache) => cache.get(url).await,
            None => None,
        }
    }
}

/// One-shot metadata lookup against the default allowlist.
pub async fn fetch_url_metadata<F: PreviewFetcher>(
    fetcher: Arc<F>,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Option<LinkPreviewData>, PreviewError> {
    LinkPreviewGenerator::new(fetcher)
        .fetch_url_metadata(url, cancel)
        .await
}
