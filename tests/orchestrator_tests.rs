use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trade_safety_preview::{
    OrchestratorConfig, Platform, PostPreview, PreviewError, PreviewFetcher, PreviewOrchestrator,
    PreviewState, SupportedDomains, UrlDetector,
};

const ERROR_MESSAGE: &str = "링크 미리보기를 불러올 수 없습니다.";

#[derive(Clone)]
struct Script {
    delay: Duration,
    result: Result<PostPreview, String>,
}

/// Answers each URL from a script, ignoring cancellation like a slow server would.
#[derive(Default)]
struct ScriptedFetcher {
    calls: Mutex<Vec<String>>,
    scripts: Mutex<HashMap<String, Vec<Script>>>,
}

impl ScriptedFetcher {
    fn respond(&self, url: &str, delay: Duration, result: Result<PostPreview, &str>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(Script {
                delay,
                result: result.map_err(str::to_string),
            });
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_script(&self, url: &str) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Script {
                delay: Duration::ZERO,
                result: Ok(post("@someone", "default body")),
            },
        }
    }
}

#[async_trait]
impl PreviewFetcher for ScriptedFetcher {
    async fn fetch_preview(
        &self,
        url: &str,
        _cancel: &CancellationToken,
    ) -> Result<PostPreview, PreviewError> {
        self.calls.lock().unwrap().push(url.to_string());
        let script = self.next_script(url);
        tokio::time::sleep(script.delay).await;
        script.result.map_err(PreviewError::FetchError)
    }
}

fn post(author: &str, text: &str) -> PostPreview {
    PostPreview {
        platform: Platform::Twitter,
        author: author.to_string(),
        created_at: Some("2024-03-15T09:30:00Z".to_string()),
        text: text.to_string(),
        text_preview: text.chars().take(10).collect(),
        images: vec![
            "https://pbs.twimg.com/media/2.jpg".to_string(),
            "https://pbs.twimg.com/media/1.jpg".to_string(),
        ],
    }
}

fn orchestrator(
    fetcher: &Arc<ScriptedFetcher>,
    debounce: Duration,
) -> PreviewOrchestrator<ScriptedFetcher> {
    PreviewOrchestrator::with_config(
        Arc::clone(fetcher),
        UrlDetector::default(),
        OrchestratorConfig::default()
            .with_debounce(debounce)
            .with_error_message(ERROR_MESSAGE),
    )
}

const URL_A: &str = "https://x.com/pc_seller/status/1";
const URL_B: &str = "https://www.reddit.com/r/kpopforsale/comments/abc";

#[tokio::test(start_paused = true)]
async fn test_success_publishes_mapped_preview() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let source = post("@pc_seller", "WTS Jungkook Golden photocard, 25k KRW");
    fetcher.respond(URL_A, Duration::from_millis(200), Ok(source.clone()));
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);

    let pending = orchestrator.observe(&format!("is this safe? {URL_A}"));
    assert_eq!(
        pending,
        PreviewState {
            preview_data: None,
            is_loading_preview: true,
            preview_error: None,
        }
    );

    let state = orchestrator.settled().await;
    let data = state.preview_data.expect("preview published");
    assert!(!state.is_loading_preview);
    assert_eq!(state.preview_error, None);
    assert_eq!(data.url, URL_A);
    assert_eq!(data.author, source.author);
    assert_eq!(data.title, source.text_preview);
    assert_eq!(data.content, source.text);
    assert_eq!(data.images, source.images);
    assert_eq!(data.date.as_deref(), Some("2024-03-15"));
}

#[tokio::test(start_paused = true)]
async fn test_failure_publishes_error_message() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.respond(URL_A, Duration::from_millis(50), Err("502 Bad Gateway"));
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);

    orchestrator.observe(URL_A);
    let state = orchestrator.settled().await;

    assert_eq!(
        state,
        PreviewState {
            preview_data: None,
            is_loading_preview: false,
            preview_error: Some(ERROR_MESSAGE.to_string()),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_url_does_not_refetch() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);

    orchestrator.observe(URL_A);
    orchestrator.observe(&format!("{URL_A} seller"));
    orchestrator.observe(&format!("{URL_A} seller wants bank transfer"));
    let settled = orchestrator.settled().await;

    for _ in 0..5 {
        assert_eq!(orchestrator.observe(&format!("{URL_A} seller wants bank transfer")), settled);
    }
    assert_eq!(fetcher.calls(), vec![URL_A.to_string()]);
    assert_eq!(orchestrator.last_detected_url(), Some(URL_A));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_fetch_is_never_published() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.respond(URL_A, Duration::from_secs(1), Ok(post("@stale", "stale body")));
    fetcher.respond(URL_B, Duration::from_millis(10), Ok(post("u/fresh", "fresh body")));
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);

    orchestrator.observe(&format!("first {URL_A}"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fetcher.calls(), vec![URL_A.to_string()]);

    orchestrator.observe(&format!("first {URL_A} still typing"));
    orchestrator.observe(&format!("actually {URL_B}"));
    let state = orchestrator.settled().await;
    assert_eq!(state.preview_data.as_ref().map(|d| d.author.as_str()), Some("u/fresh"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(orchestrator.state(), state);
    assert_eq!(fetcher.calls(), vec![URL_A.to_string(), URL_B.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_failure_is_never_published() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.respond(URL_A, Duration::from_secs(1), Err("timeout"));
    fetcher.respond(URL_B, Duration::from_millis(10), Ok(post("u/fresh", "fresh body")));
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);

    orchestrator.observe(URL_A);
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.observe(URL_B);
    let state = orchestrator.settled().await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(orchestrator.state(), state);
    assert_eq!(orchestrator.state().preview_error, None);
}

#[tokio::test(start_paused = true)]
async fn test_previous_preview_kept_while_next_loads() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.respond(URL_A, Duration::ZERO, Ok(post("@first", "first body")));
    fetcher.respond(URL_B, Duration::from_millis(100), Ok(post("u/second", "second body")));
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);

    orchestrator.observe(URL_A);
    orchestrator.settled().await;

    let loading = orchestrator.observe(URL_B);
    assert!(loading.is_loading_preview);
    assert_eq!(loading.preview_data.map(|d| d.author), Some("@first".to_string()));

    let state = orchestrator.settled().await;
    assert_eq!(state.preview_data.map(|d| d.author), Some("u/second".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_clearing_text_resets_state() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.respond(URL_A, Duration::ZERO, Err("boom"));
    fetcher.respond(URL_B, Duration::from_millis(500), Ok(post("u/late", "late body")));
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);

    orchestrator.observe(URL_A);
    assert!(orchestrator.settled().await.preview_error.is_some());
    assert!(orchestrator.observe("").is_idle());
    assert_eq!(orchestrator.last_detected_url(), None);

    orchestrator.observe(URL_B);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(orchestrator.state().is_loading_preview);
    assert!(orchestrator.observe("never mind, DM me instead").is_idle());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(orchestrator.state().is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_readding_url_retries() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.respond(URL_A, Duration::ZERO, Err("connection reset"));
    fetcher.respond(URL_A, Duration::ZERO, Ok(post("@pc_seller", "second try")));
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);

    orchestrator.observe(URL_A);
    assert!(orchestrator.settled().await.preview_error.is_some());

    orchestrator.observe(URL_A);
    assert_eq!(fetcher.calls().len(), 1);

    orchestrator.observe("");
    orchestrator.observe(URL_A);
    let state = orchestrator.settled().await;

    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(state.preview_error, None);
    assert_eq!(state.preview_data.map(|d| d.content), Some("second try".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_debounce_skips_urls_still_being_typed() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let mut orchestrator = orchestrator(&fetcher, Duration::from_millis(300));

    orchestrator.observe("https://x.com/pc");
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.observe("https://x.com/pc_sel");
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.observe(URL_A);
    assert!(fetcher.calls().is_empty());

    let state = orchestrator.settled().await;
    assert_eq!(fetcher.calls(), vec![URL_A.to_string()]);
    assert!(state.preview_data.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_drop_discards_pending_result() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.respond(URL_A, Duration::from_millis(100), Ok(post("@pc_seller", "body")));
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);
    let receiver = orchestrator.subscribe();

    orchestrator.observe(URL_A);
    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(orchestrator);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let state = receiver.borrow().clone();
    assert!(state.is_loading_preview);
    assert_eq!(state.preview_data, None);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_pending_result() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.respond(URL_A, Duration::from_millis(100), Ok(post("@pc_seller", "body")));
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);

    orchestrator.observe(URL_A);
    orchestrator.shutdown();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(orchestrator.state().preview_data, None);
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_observe_settlement() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.respond(URL_A, Duration::from_millis(100), Ok(post("@pc_seller", "body")));
    let mut orchestrator = orchestrator(&fetcher, Duration::ZERO);
    let mut receiver = orchestrator.subscribe();

    orchestrator.observe(URL_A);
    let state = receiver
        .wait_for(|state| state.preview_data.is_some())
        .await
        .expect("orchestrator alive")
        .clone();

    assert!(!state.is_loading_preview);
}

#[tokio::test(start_paused = true)]
async fn test_injected_allowlist_drives_detection() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let mut orchestrator = PreviewOrchestrator::with_config(
        Arc::clone(&fetcher),
        UrlDetector::new(SupportedDomains::new(["bunjang.co.kr"])),
        OrchestratorConfig::default().with_debounce(Duration::ZERO),
    );

    assert!(orchestrator.observe(URL_A).is_idle());
    orchestrator.observe("https://m.bunjang.co.kr/products/42");
    orchestrator.settled().await;

    assert_eq!(
        fetcher.calls(),
        vec!["https://m.bunjang.co.kr/products/42".to_string()]
    );
}
