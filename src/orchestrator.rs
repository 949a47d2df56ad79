//! Watches free text for a supported link and keeps a single preview request in flight for it.
//!
//! Each newly detected URL starts an observation cycle owning one [`CancellationToken`]. Starting
//! a cycle, clearing the text, or dropping the orchestrator cancels the previous token, and a
//! cycle only writes state while its token is live. The liveness check runs inside the watch
//! channel's write lock, and callers always cancel before they write, so a superseded cycle can
//! never overwrite newer state.

use crate::fetcher::{fetch_cancellable, FetchOutcome};
use crate::{extract_domain, LinkPreviewData, LinkPreviewGenerator, PreviewFetcher, UrlDetector};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_ERROR_MESSAGE: &str = "Unable to load the link preview.";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Delay between detecting a URL and requesting its preview. Zero disables it.
    pub debounce: Duration,
    /// Already-localized message published when a preview request fails.
    pub error_message: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }
}

/// What the view renders for the preview slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewState {
    pub preview_data: Option<LinkPreviewData>,
    pub is_loading_preview: bool,
    pub preview_error: Option<String>,
}

impl PreviewState {
    pub fn is_idle(&self) -> bool {
        *self == PreviewState::default()
    }
}

struct Cycle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

pub struct PreviewOrchestrator<F> {
    generator: LinkPreviewGenerator<F>,
    detector: UrlDetector,
    config: OrchestratorConfig,
    state: Arc<watch::Sender<PreviewState>>,
    last_detected_url: Option<String>,
    cycle: Option<Cycle>,
}

impl<F: PreviewFetcher + 'static> PreviewOrchestrator<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self::with_config(fetcher, UrlDetector::default(), OrchestratorConfig::default())
    }

    pub fn with_config(fetcher: Arc<F>, detector: UrlDetector, config: OrchestratorConfig) -> Self {
        let generator = LinkPreviewGenerator::with_domains(fetcher, detector.domains().clone());
        Self::with_generator(generator, detector, config)
    }

    pub fn with_generator(
        generator: LinkPreviewGenerator<F>,
        detector: UrlDetector,
        config: OrchestratorConfig,
    ) -> Self {
        let (state, _) = watch::channel(PreviewState::default());
        Self {
            generator,
            detector,
            config,
            state: Arc::new(state),
            last_detected_url: None,
            cycle: None,
        }
    }

    pub fn state(&self) -> PreviewState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.state.subscribe()
    }

    pub fn last_detected_url(&self) -> Option<&str> {
        self.last_detected_url.as_deref()
    }

    /// Re-evaluates the preview for the current text and returns the state after the change.
    ///
    /// Must be called from within a tokio runtime when the text holds a new supported URL,
    /// since the preview request runs as a spawned task.
    #[instrument(level = "trace", skip_all)]
    pub fn observe(&mut self, text: &str) -> PreviewState {
        let Some(url) = self.detector.detect(text) else {
            self.cancel_cycle();
            self.last_detected_url = None;
            self.state.send_if_modified(|state| {
                if state.is_idle() {
                    false
                } else {
                    *state = PreviewState::default();
                    true
                }
            });
            return self.state();
        };

        if self.last_detected_url.as_deref() == Some(url.as_str()) {
            return self.state();
        }

        self.cancel_cycle();
        let platform =
            extract_domain(&url).and_then(|host| self.detector.domains().platform_for(&host));
        debug!(url = %url, platform = ?platform, "Detected new preview URL");

        self.last_detected_url = Some(url.clone());
        self.state.send_modify(|state| {
            state.is_loading_preview = true;
            state.preview_error = None;
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_cycle(
            self.generator.clone(),
            Arc::clone(&self.state),
            cancel.clone(),
            url,
            self.config.debounce,
            self.config.error_message.clone(),
        ));
        self.cycle = Some(Cycle {
            cancel,
            task: Some(task),
        });

        self.state()
    }

    /// Waits for the current cycle, if any, to finish and returns the resulting state.
    pub async fn settled(&mut self) -> PreviewState {
        if let Some(task) = self.cycle.as_mut().and_then(|cycle| cycle.task.take()) {
            let _ = task.await;
        }
        self.state()
    }

    /// Cancels any pending request. Later results are discarded.
    pub fn shutdown(&mut self) {
        self.cancel_cycle();
    }

    fn cancel_cycle(&mut self) {
        if let Some(cycle) = self.cycle.take() {
            if cycle.task.as_ref().is_some_and(|task| !task.is_finished()) {
                debug!("Cancelling superseded preview request");
            }
            cycle.cancel.cancel();
        }
    }
}

impl<F> Drop for PreviewOrchestrator<F> {
    fn drop(&mut self) {
        if let Some(cycle) = self.cycle.take() {
            cycle.cancel.cancel();
        }
    }
}

async fn run_cycle<F: PreviewFetcher>(
    generator: LinkPreviewGenerator<F>,
    state: Arc<watch::Sender<PreviewState>>,
    cancel: CancellationToken,
    url: String,
    debounce: Duration,
    error_message: String,
) {
    if !debounce.is_zero() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(debounce) => {}
        }
    }

    let settled = match fetch_cancellable(&cancel, generator.generate_preview(&url, &cancel)).await
    {
        FetchOutcome::Ready(preview) => PreviewState {
            preview_data: Some(preview),
            is_loading_preview: false,
            preview_error: None,
        },
        FetchOutcome::Cancelled => {
            debug!(url = %url, "Preview request cancelled");
            return;
        }
        FetchOutcome::Failed(e) => {
            if !cancel.is_cancelled() {
                e.log();
            }
            PreviewState {
                preview_data: None,
                is_loading_preview: false,
                preview_error: Some(error_message),
            }
        }
    };

    let published = state.send_if_modified(|current| {
        if cancel.is_cancelled() {
            return false;
        }
        *current = settled;
        true
    });

    if !published {
        debug!(url = %url, "Discarded result of superseded preview request");
    }
}
