//! Shared test fixtures: mock browser substrate, scripted adapters, and a
//! gateway harness driving the real router.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use tower::util::ServiceExt;
use wmg::{
    adapters::{
        Adapter, AdapterSettings, GenerateOutput, GenerateRequest, ImagePolicy, Modality,
        ModelDescriptor, SubContext,
    },
    bootstrap::Gateway,
    config::WorkerConfig,
    core::{
        error::{normalize_error, GatewayError},
        page::{
            Browser, BrowserLauncher, Cookie, LaunchOptions, NavigationEvent,
            NavigationListener, Page, PageResult,
        },
    },
    server::{build_router, AppState},
};

pub const TOKEN: &str = "test-token-0123456789";

// ============================================================================
// Mock browser substrate
// ============================================================================

pub struct MockPage {
    url: Mutex<String>,
    closed: AtomicBool,
    listener: Mutex<Option<NavigationListener>>,
    cookies: Vec<Cookie>,
}

impl MockPage {
    fn new(cookies: Vec<Cookie>) -> Self {
        Self {
            url: Mutex::new("about:blank".to_string()),
            closed: AtomicBool::new(false),
            listener: Mutex::new(None),
            cookies,
        }
    }
}

#[async_trait]
impl Page for MockPage {
    async fn goto(&self, url: &str) -> PageResult<()> {
        *self.url.lock() = url.to_string();
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener(NavigationEvent {
                url: url.to_string(),
            })
            .await;
        }
        Ok(())
    }

    async fn url(&self) -> PageResult<String> {
        Ok(self.url.lock().clone())
    }

    async fn cookies(&self, domain: Option<&str>) -> PageResult<Vec<Cookie>> {
        Ok(self
            .cookies
            .iter()
            .filter(|c| domain.map_or(true, |d| c.domain.contains(d)))
            .cloned()
            .collect())
    }

    async fn set_navigation_listener(&self, listener: NavigationListener) -> PageResult<()> {
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> PageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockBrowser {
    pages: Mutex<Vec<Arc<MockPage>>>,
    cookies: Vec<Cookie>,
}

#[async_trait]
impl Browser for MockBrowser {
    async fn new_page(&self) -> PageResult<Arc<dyn Page>> {
        let page = Arc::new(MockPage::new(self.cookies.clone()));
        self.pages.lock().push(page.clone());
        Ok(page)
    }

    async fn close(&self) -> PageResult<()> {
        for page in self.pages.lock().iter() {
            page.closed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockLauncher {
    launches: AtomicUsize,
    cookies: Mutex<Vec<Cookie>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookies(cookies: Vec<Cookie>) -> Self {
        Self {
            launches: AtomicUsize::new(0),
            cookies: Mutex::new(cookies),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, _options: LaunchOptions) -> PageResult<Arc<dyn Browser>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockBrowser {
            pages: Mutex::new(Vec::new()),
            cookies: self.cookies.lock().clone(),
        }))
    }
}

// ============================================================================
// Scripted adapter
// ============================================================================

type Script = Mutex<VecDeque<Result<GenerateOutput, String>>>;

/// Adapter whose generate results are scripted per test. Calls are recorded
/// into a shared log as `<type>:<model-id>`.
pub struct ScriptedAdapter {
    tag: String,
    display: String,
    models: Vec<ModelDescriptor>,
    script: Script,
    delay: Option<Duration>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAdapter {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            display: format!("{tag} (test)"),
            models: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            delay: None,
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn model(mut self, descriptor: ModelDescriptor) -> Self {
        self.models.push(descriptor);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.call_log = log;
        self
    }

    /// Queue one scripted failure (a contract error string).
    pub fn push_error(&self, raw: &str) {
        self.script.lock().push_back(Err(raw.to_string()));
    }

    pub fn push_output(&self, output: GenerateOutput) {
        self.script.lock().push_back(Ok(output));
    }

    pub fn calls(&self) -> Vec<String> {
        self.call_log.lock().clone()
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn adapter_type(&self) -> &str {
        &self.tag
    }

    fn display_name(&self) -> &str {
        &self.display
    }

    fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    fn target_url(
        &self,
        _settings: &AdapterSettings,
        _worker: &WorkerConfig,
    ) -> Result<String, GatewayError> {
        Ok(format!("https://{}.example/chat", self.tag))
    }

    async fn generate(
        &self,
        _ctx: &SubContext<'_>,
        request: GenerateRequest<'_>,
    ) -> Result<GenerateOutput, GatewayError> {
        self.call_log
            .lock()
            .push(format!("{}:{}", self.tag, request.model_key.id));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(raw)) => Err(normalize_error(&raw)),
            None => Ok(GenerateOutput::text(format!("{} answer", self.tag))),
        }
    }
}

/// Text model descriptor helper.
pub fn text_model(id: &str) -> ModelDescriptor {
    ModelDescriptor::new(id, format!("{id}-upstream"), Modality::Text)
}

/// Image model descriptor helper (image policy optional).
pub fn image_model(id: &str) -> ModelDescriptor {
    ModelDescriptor::new(id, format!("{id}-upstream"), Modality::Image)
        .with_image_policy(ImagePolicy::Optional)
}

// ============================================================================
// Gateway harness
// ============================================================================

pub struct TestGateway {
    pub state: Arc<AppState>,
    pub router: Router,
    pub launcher: Arc<MockLauncher>,
    _dispatch: tokio::task::JoinHandle<()>,
    _tmp: tempfile::TempDir,
}

pub async fn start_gateway(
    config_yaml: &str,
    adapters: Vec<Arc<dyn Adapter>>,
) -> TestGateway {
    start_gateway_with_launcher(config_yaml, adapters, Arc::new(MockLauncher::new())).await
}

pub async fn start_gateway_with_launcher(
    config_yaml: &str,
    adapters: Vec<Arc<dyn Adapter>>,
    launcher: Arc<MockLauncher>,
) -> TestGateway {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = wmg::config::from_str(config_yaml).expect("test config");

    let mut builder = Gateway::builder(config)
        .data_dir(tmp.path())
        .launcher(launcher.clone());
    for adapter in adapters {
        builder = builder.adapter(adapter);
    }
    let gateway = builder.build().expect("gateway build");
    gateway.init_workers().await.expect("worker init");

    let state = gateway.state();
    let dispatch = tokio::spawn(wmg::server::dispatch_loop(
        state.pool.clone(),
        state.queue.clone(),
        std::future::pending(),
    ));

    TestGateway {
        router: build_router(state.clone()),
        state,
        launcher,
        _dispatch: dispatch,
        _tmp: tmp,
    }
}

// ============================================================================
// Request helpers
// ============================================================================

pub async fn post_chat(
    router: &Router,
    token: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// POST a streaming request and return (status, raw SSE body).
pub async fn post_chat_sse(
    router: &Router,
    token: &str,
    body: serde_json::Value,
) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub async fn get_json(
    router: &Router,
    token: &str,
    path: &str,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub async fn delete_json(
    router: &Router,
    token: &str,
    path: &str,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("DELETE")
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Split an SSE body into its `data:`/comment frames.
pub fn sse_frames(raw: &str) -> Vec<&str> {
    raw.split("\n\n").filter(|f| !f.is_empty()).collect()
}

/// Parse the JSON payloads of the `data:` frames, excluding `[DONE]`.
pub fn sse_data_frames(raw: &str) -> Vec<serde_json::Value> {
    sse_frames(raw)
        .iter()
        .filter_map(|f| f.strip_prefix("data: "))
        .filter(|p| *p != "[DONE]")
        .map(|p| serde_json::from_str(p).unwrap())
        .collect()
}

/// A one-worker single-adapter config.
pub fn single_worker_config(adapter_type: &str) -> String {
    format!(
        r#"
server:
  port: 0
  auth: "{TOKEN}"
backend:
  pool:
    instances:
      - name: main
        workers:
          - name: w1
            type: {adapter_type}
"#
    )
}

/// Base64 PNG data URI for image upload tests.
pub fn png_data_uri() -> String {
    use base64::Engine;
    let payload = base64::engine::general_purpose::STANDARD.encode(b"not-really-a-png");
    format!("data:image/png;base64,{payload}")
}
