//! Workers.
//!
//! A worker is one browser tab bound to an adapter type, or to an ordered
//! list of types (a merge worker) that can route a task to any supporting
//! member. Workers serialize tasks through the pool's busy accounting: the
//! scheduler never dispatches a second task while one is in flight, and the
//! busy counter is the single source of truth for that.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::RwLock;
use tokio::{sync::OnceCell, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    adapters::{
        navigation::compose_chain, AdapterRegistry, GenerateOutput, GenerateRequest, ImagePolicy,
        Modality, ModelKey, NavigationHandler, SubContext,
    },
    config::{AdapterSettings, FailoverConfig, WorkerConfig},
    core::{
        error::{normalize_error, GatewayError},
        instance::Instance,
        page::Page,
        task::Task,
    },
    pool::failover::run_failover,
};

/// Per-URL budget while probing a merge worker's entry URLs.
const ENTRY_NAVIGATION_BUDGET: Duration = Duration::from_secs(30);

/// Single-type or merge worker, switched on by tag rather than inheritance.
#[derive(Debug, Clone)]
pub enum WorkerKind {
    Single {
        adapter_type: String,
    },
    Merge {
        types: Vec<String>,
        monitor: Option<String>,
    },
}

impl WorkerKind {
    pub fn from_config(config: &WorkerConfig) -> Self {
        match (&config.adapter_type, &config.merge_types) {
            (Some(t), _) => WorkerKind::Single {
                adapter_type: t.clone(),
            },
            (None, Some(types)) => WorkerKind::Merge {
                types: types.clone(),
                monitor: config.merge_monitor.clone(),
            },
            (None, None) => unreachable!("validated at config load"),
        }
    }

    pub fn member_types(&self) -> &[String] {
        match self {
            WorkerKind::Single { adapter_type } => std::slice::from_ref(adapter_type),
            WorkerKind::Merge { types, .. } => types,
        }
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, WorkerKind::Merge { .. })
    }
}

/// Cooperative non-reentrant page mutex. Navigation handlers acquire it
/// before any input that could race the foreground task; it is released on
/// every exit path by guard drop.
#[derive(Debug, Default)]
pub struct PageAuthLock(tokio::sync::Mutex<()>);

impl PageAuthLock {
    pub async fn acquire(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.0.lock().await
    }

    pub fn try_acquire(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.0.try_lock().ok()
    }
}

/// A member candidate inside a merge worker's failover list.
#[derive(Debug, Clone)]
pub struct MemberCandidate {
    pub adapter_type: String,
    pub key: ModelKey,
}

pub struct Worker {
    name: String,
    kind: WorkerKind,
    config: WorkerConfig,
    registry: Arc<AdapterRegistry>,
    adapter_settings: Arc<HashMap<String, AdapterSettings>>,
    default_settings: AdapterSettings,
    failover: FailoverConfig,
    page: RwLock<Option<Arc<dyn Page>>>,
    instance: OnceCell<Arc<Instance>>,
    busy: AtomicUsize,
    initialized: AtomicBool,
    login_mode: AtomicBool,
    page_auth: Arc<PageAuthLock>,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        registry: Arc<AdapterRegistry>,
        adapter_settings: Arc<HashMap<String, AdapterSettings>>,
        failover: FailoverConfig,
    ) -> Self {
        Self {
            name: config.name.clone(),
            kind: WorkerKind::from_config(&config),
            config,
            registry,
            adapter_settings,
            default_settings: AdapterSettings::default(),
            failover,
            page: RwLock::new(None),
            instance: OnceCell::new(),
            busy: AtomicUsize::new(0),
            initialized: AtomicBool::new(false),
            login_mode: AtomicBool::new(false),
            page_auth: Arc::new(PageAuthLock::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &WorkerKind {
        &self.kind
    }

    pub fn page_auth(&self) -> &Arc<PageAuthLock> {
        &self.page_auth
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Busy accounting
    // ------------------------------------------------------------------

    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Reserve this worker for one task. Fails when a task is already in
    /// flight; the scheduler treats a failed reservation as "busy".
    pub fn try_reserve(&self) -> bool {
        self.busy
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        let prev = self.busy.fetch_sub(1, Ordering::SeqCst);
        if prev == 0 {
            warn!(worker = %self.name, "Released a worker that was not busy");
            self.busy.store(0, Ordering::SeqCst);
        }
    }

    // ------------------------------------------------------------------
    // Model resolution
    // ------------------------------------------------------------------

    /// Member types that can serve `key`, in configured order.
    pub fn supporting_members(&self, key: &ModelKey) -> Vec<MemberCandidate> {
        self.kind
            .member_types()
            .iter()
            .filter(|t| self.registry.supports_model(t, key))
            .map(|t| MemberCandidate {
                adapter_type: t.clone(),
                key: key.clone(),
            })
            .collect()
    }

    /// Supporting members eligible for a request, honoring image-aware
    /// dispatch inside the worker: an image-bearing task never lands on a
    /// member that forbids images while a non-forbidding member supports
    /// the model.
    pub(crate) fn eligible_members(&self, key: &ModelKey, has_images: bool) -> Vec<MemberCandidate> {
        let mut members = self.supporting_members(key);
        if has_images {
            let any_accepts = members.iter().any(|m| {
                matches!(
                    self.registry.image_policy(&m.adapter_type, key),
                    Some(ImagePolicy::Optional) | Some(ImagePolicy::Required)
                )
            });
            if any_accepts {
                members.retain(|m| {
                    !matches!(
                        self.registry.image_policy(&m.adapter_type, key),
                        Some(ImagePolicy::Forbidden) | None
                    )
                });
            }
        }
        members
    }

    pub fn supports(&self, key: &ModelKey) -> bool {
        self.kind
            .member_types()
            .iter()
            .any(|t| self.registry.supports_model(t, key))
    }

    /// Image policy across supporting members. Any `optional` member makes
    /// the worker optional (the scheduler may pick the permissive member);
    /// otherwise any `required` makes it required; otherwise forbidden.
    pub fn image_policy(&self, key: &ModelKey) -> Option<ImagePolicy> {
        let policies: Vec<ImagePolicy> = self
            .kind
            .member_types()
            .iter()
            .filter_map(|t| self.registry.image_policy(t, key))
            .collect();
        if policies.is_empty() {
            return None;
        }
        if policies.contains(&ImagePolicy::Optional) {
            Some(ImagePolicy::Optional)
        } else if policies.contains(&ImagePolicy::Required) {
            Some(ImagePolicy::Required)
        } else {
            Some(ImagePolicy::Forbidden)
        }
    }

    /// Modality of the first supporting member.
    pub fn model_type(&self, key: &ModelKey) -> Option<Modality> {
        self.kind
            .member_types()
            .iter()
            .find_map(|t| self.registry.model_type(t, key))
    }

    fn settings_for(&self, adapter_type: &str) -> &AdapterSettings {
        self.adapter_settings
            .get(adapter_type)
            .unwrap_or(&self.default_settings)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Initialize the worker: open a tab in the instance's browser, enter
    /// the first reachable member URL, install the merged navigation chain.
    /// Idempotent; repeat calls are no-ops.
    pub async fn init(&self, instance: Arc<Instance>, login_mode: bool) -> Result<(), GatewayError> {
        if self.is_initialized() {
            return Ok(());
        }
        self.login_mode.store(login_mode, Ordering::Release);
        let _ = self.instance.set(instance.clone());

        let page = instance
            .new_page()
            .await
            .map_err(|e| GatewayError::internal(format!("worker '{}': {e}", self.name)))?;

        self.enter_target(&page).await?;

        if !login_mode {
            self.install_navigation_chain(&page).await?;
        }

        *self.page.write() = Some(page);
        self.initialized.store(true, Ordering::Release);
        info!(worker = %self.name, merge = self.kind.is_merge(), "Worker initialized");
        Ok(())
    }

    /// Try each member's target URL in order within a per-URL budget.
    async fn enter_target(&self, page: &Arc<dyn Page>) -> Result<(), GatewayError> {
        for adapter_type in self.kind.member_types() {
            let url = match self
                .registry
                .target_url(adapter_type, self.settings_for(adapter_type), &self.config)
            {
                Ok(url) => url,
                Err(e) => {
                    warn!(worker = %self.name, adapter = %adapter_type, error = %e,
                        "Target URL resolution failed");
                    continue;
                }
            };
            match timeout(ENTRY_NAVIGATION_BUDGET, page.goto(&url)).await {
                Ok(Ok(())) => {
                    debug!(worker = %self.name, adapter = %adapter_type, url = %url,
                        "Entered target URL");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!(worker = %self.name, adapter = %adapter_type, url = %url,
                        error = %e, "Entry navigation failed");
                }
                Err(_) => {
                    warn!(worker = %self.name, adapter = %adapter_type, url = %url,
                        "Entry navigation timed out");
                }
            }
        }
        Err(GatewayError::internal(format!(
            "worker '{}': no member target URL was reachable",
            self.name
        )))
    }

    /// Compose the members' navigation handlers into one listener that runs
    /// the whole chain under the page-auth lock, so background handlers can
    /// never race a foreground task's input.
    async fn install_navigation_chain(&self, page: &Arc<dyn Page>) -> Result<(), GatewayError> {
        let mut handlers: Vec<NavigationHandler> = Vec::new();
        for adapter_type in self.kind.member_types() {
            handlers.extend(self.registry.navigation_handlers(adapter_type));
        }
        if handlers.is_empty() {
            return Ok(());
        }
        debug!(worker = %self.name, count = handlers.len(), "Installing navigation chain");

        let chain = compose_chain(handlers);
        let page_auth = self.page_auth.clone();
        let listener: crate::core::page::NavigationListener = Arc::new(move |event| {
            let chain = chain.clone();
            let page_auth = page_auth.clone();
            Box::pin(async move {
                let _guard = page_auth.acquire().await;
                chain(event).await;
            })
        });
        page.set_navigation_listener(listener)
            .await
            .map_err(|e| normalize_error(&e.as_contract_str()))
    }

    /// Current page, recreating the tab if it crashed or was closed.
    async fn ensure_page(&self) -> Result<Arc<dyn Page>, GatewayError> {
        if let Some(page) = self.page.read().clone() {
            if !page.is_closed() {
                return Ok(page);
            }
            warn!(worker = %self.name, "Page is gone, recreating tab");
        }
        let instance = self
            .instance
            .get()
            .ok_or_else(|| GatewayError::internal(format!("worker '{}' not initialized", self.name)))?;
        let page = instance
            .new_page()
            .await
            .map_err(|e| normalize_error(&e.as_contract_str()))?;
        self.enter_target(&page).await?;
        if !self.login_mode.load(Ordering::Acquire) {
            self.install_navigation_chain(&page).await?;
        }
        *self.page.write() = Some(page.clone());
        Ok(page)
    }

    // ------------------------------------------------------------------
    // Generate
    // ------------------------------------------------------------------

    /// Run one generation on this worker, failing over across merge members
    /// when enabled. The caller holds the busy reservation.
    pub async fn generate(&self, task: &Task) -> Result<GenerateOutput, GatewayError> {
        let mut candidates = self.eligible_members(&task.model_key, task.has_images());
        if candidates.is_empty() {
            return Err(GatewayError::invalid_model(&task.requested_model));
        }

        let failover_enabled =
            self.kind.is_merge() && self.failover.enabled && candidates.len() > 1;
        if !failover_enabled {
            return self.attempt_member(candidates.remove(0), task).await;
        }

        let worker_name = self.name.clone();
        run_failover(
            &candidates,
            self.failover.max_retries,
            |candidate| self.attempt_member(candidate, task),
            |candidate, error, attempt| {
                warn!(
                    worker = %worker_name,
                    adapter = %candidate.adapter_type,
                    attempt,
                    error = %error,
                    "Member attempt failed, trying next"
                );
            },
        )
        .await
    }

    async fn attempt_member(
        &self,
        candidate: MemberCandidate,
        task: &Task,
    ) -> Result<GenerateOutput, GatewayError> {
        let adapter = self.registry.adapter(&candidate.adapter_type).ok_or_else(|| {
            GatewayError::internal(format!("unknown adapter type '{}'", candidate.adapter_type))
        })?;
        let page = self.ensure_page().await?;
        let instance = self
            .instance
            .get()
            .ok_or_else(|| GatewayError::internal(format!("worker '{}' not initialized", self.name)))?;

        let ctx = SubContext {
            page,
            settings: self.settings_for(&candidate.adapter_type),
            proxy: instance.proxy(),
            user_data_dir: instance.user_data_dir(),
            page_auth: self.page_auth.clone(),
            cancel: task.cancel.clone(),
        };
        let request = GenerateRequest {
            prompt: &task.prompt,
            image_paths: &task.image_paths,
            model_key: &candidate.key,
            meta: &task.meta,
        };

        debug!(
            worker = %self.name,
            adapter = %candidate.adapter_type,
            model = %candidate.key,
            images = task.image_paths.len(),
            "Dispatching generate to adapter"
        );
        adapter.generate(&ctx, request).await
    }

    // ------------------------------------------------------------------
    // Idle parking & cookies
    // ------------------------------------------------------------------

    /// Park the page on the monitor adapter's host while idle. Meaningful
    /// only for merge workers with a configured monitor.
    pub async fn navigate_to_monitor(&self) -> Result<(), GatewayError> {
        let WorkerKind::Merge {
            monitor: Some(monitor),
            ..
        } = &self.kind
        else {
            return Ok(());
        };
        if self.busy() > 0 {
            return Ok(());
        }
        let page = self.ensure_page().await?;
        let target = self
            .registry
            .target_url(monitor, self.settings_for(monitor), &self.config)?;

        let current = page
            .url()
            .await
            .map_err(|e| normalize_error(&e.as_contract_str()))?;
        if same_host(&current, &target) {
            return Ok(());
        }
        debug!(worker = %self.name, monitor = %monitor, url = %target, "Parking on monitor");
        page.goto(&target)
            .await
            .map_err(|e| normalize_error(&e.as_contract_str()))
    }

    /// Cookies of this worker's page context, optionally domain-filtered.
    pub async fn cookies(
        &self,
        domain: Option<&str>,
    ) -> Result<Vec<crate::core::page::Cookie>, GatewayError> {
        let page = self.ensure_page().await?;
        page.cookies(domain)
            .await
            .map_err(|e| normalize_error(&e.as_contract_str()))
    }
}

fn same_host(a: &str, b: &str) -> bool {
    match (url::Url::parse(a), url::Url::parse(b)) {
        (Ok(a), Ok(b)) => a.host_str().is_some() && a.host_str() == b.host_str(),
        _ => false,
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("busy", &self.busy())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::{
        adapters::{Adapter, ModelDescriptor},
        config::InstanceConfig,
        core::page::{
            Browser, BrowserLauncher, Cookie, LaunchOptions, NavigationEvent,
            NavigationListener, PageResult,
        },
        core::task::Task,
    };

    struct MiniPage {
        url: Mutex<String>,
        gotos: AtomicUsize,
        listener: Mutex<Option<NavigationListener>>,
        closed: AtomicBool,
    }

    impl MiniPage {
        fn new() -> Self {
            Self {
                url: Mutex::new("about:blank".to_string()),
                gotos: AtomicUsize::new(0),
                listener: Mutex::new(None),
                closed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Page for MiniPage {
        async fn goto(&self, url: &str) -> PageResult<()> {
            *self.url.lock() = url.to_string();
            self.gotos.fetch_add(1, Ordering::SeqCst);
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

        async fn cookies(&self, _domain: Option<&str>) -> PageResult<Vec<Cookie>> {
            Ok(Vec::new())
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

    struct MiniBrowser {
        pages: Mutex<Vec<Arc<MiniPage>>>,
    }

    #[async_trait]
    impl Browser for MiniBrowser {
        async fn new_page(&self) -> PageResult<Arc<dyn Page>> {
            let page = Arc::new(MiniPage::new());
            self.pages.lock().push(page.clone());
            Ok(page)
        }

        async fn close(&self) -> PageResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MiniLauncher {
        browsers: Mutex<Vec<Arc<MiniBrowser>>>,
    }

    impl MiniLauncher {
        fn first_page(&self) -> Arc<MiniPage> {
            self.browsers.lock()[0].pages.lock()[0].clone()
        }
    }

    #[async_trait]
    impl BrowserLauncher for MiniLauncher {
        async fn launch(&self, _options: LaunchOptions) -> PageResult<Arc<dyn Browser>> {
            let browser = Arc::new(MiniBrowser {
                pages: Mutex::new(Vec::new()),
            });
            self.browsers.lock().push(browser.clone());
            Ok(browser)
        }
    }

    fn test_instance(launcher: Arc<MiniLauncher>, dir: &std::path::Path) -> Arc<Instance> {
        let config = InstanceConfig {
            name: "t".to_string(),
            user_data_mark: None,
            proxy: None,
            workers: Vec::new(),
        };
        Arc::new(Instance::from_config(&config, dir, None, launcher))
    }

    struct StubAdapter {
        tag: &'static str,
        models: Vec<ModelDescriptor>,
    }

    #[async_trait]
    impl Adapter for StubAdapter {
        fn adapter_type(&self) -> &str {
            self.tag
        }
        fn display_name(&self) -> &str {
            self.tag
        }
        fn models(&self) -> &[ModelDescriptor] {
            &self.models
        }
        fn target_url(
            &self,
            _settings: &AdapterSettings,
            _worker: &WorkerConfig,
        ) -> Result<String, GatewayError> {
            Ok(format!("https://{}.test/", self.tag))
        }
        async fn generate(
            &self,
            _ctx: &SubContext<'_>,
            _request: GenerateRequest<'_>,
        ) -> Result<GenerateOutput, GatewayError> {
            Ok(GenerateOutput::text("stub"))
        }
    }

    fn registry() -> Arc<AdapterRegistry> {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(StubAdapter {
            tag: "alpha",
            models: vec![
                ModelDescriptor::new("shared", "a-shared", Modality::Text)
                    .with_image_policy(ImagePolicy::Forbidden),
                ModelDescriptor::new("alpha-only", "a1", Modality::Text),
            ],
        }));
        registry.register(Arc::new(StubAdapter {
            tag: "beta",
            models: vec![
                ModelDescriptor::new("shared", "b-shared", Modality::Image)
                    .with_image_policy(ImagePolicy::Required),
                ModelDescriptor::new("beta-img", "b2", Modality::Image)
                    .with_image_policy(ImagePolicy::Optional),
            ],
        }));
        registry
            .register(Arc::new(StubAdapter {
                tag: "gamma",
                models: vec![ModelDescriptor::new("shared", "c-shared", Modality::Text)
                    .with_image_policy(ImagePolicy::Optional)],
            }));
        registry.into()
    }

    fn merge_worker(types: &[&str]) -> Worker {
        let config = WorkerConfig {
            name: "merge".into(),
            adapter_type: None,
            merge_types: Some(types.iter().map(|s| s.to_string()).collect()),
            merge_monitor: None,
        };
        Worker::new(
            config,
            registry(),
            Arc::new(HashMap::new()),
            FailoverConfig::default(),
        )
    }

    fn single_worker(adapter_type: &str) -> Worker {
        let config = WorkerConfig {
            name: format!("single-{adapter_type}"),
            adapter_type: Some(adapter_type.to_string()),
            merge_types: None,
            merge_monitor: None,
        };
        Worker::new(
            config,
            registry(),
            Arc::new(HashMap::new()),
            FailoverConfig::default(),
        )
    }

    #[test]
    fn single_supports_only_its_type() {
        let worker = single_worker("alpha");
        assert!(worker.supports(&ModelKey::parse("alpha-only")));
        assert!(worker.supports(&ModelKey::parse("alpha/shared")));
        assert!(!worker.supports(&ModelKey::parse("beta-img")));
        assert!(!worker.supports(&ModelKey::parse("beta/shared")));
    }

    #[test]
    fn merge_supports_any_member() {
        let worker = merge_worker(&["alpha", "beta"]);
        assert!(worker.supports(&ModelKey::parse("alpha-only")));
        assert!(worker.supports(&ModelKey::parse("beta-img")));
        assert!(!worker.supports(&ModelKey::parse("gamma/shared")));
    }

    #[test]
    fn qualified_key_routes_to_named_member_only() {
        let worker = merge_worker(&["alpha", "beta"]);
        let members = worker.supporting_members(&ModelKey::parse("beta/shared"));
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].adapter_type, "beta");
    }

    #[test]
    fn merge_image_policy_prefers_optional() {
        // alpha forbids, beta requires, gamma optional.
        let worker = merge_worker(&["alpha", "beta", "gamma"]);
        assert_eq!(
            worker.image_policy(&ModelKey::parse("shared")),
            Some(ImagePolicy::Optional)
        );

        let worker = merge_worker(&["alpha", "beta"]);
        assert_eq!(
            worker.image_policy(&ModelKey::parse("shared")),
            Some(ImagePolicy::Required)
        );

        let worker = merge_worker(&["alpha"]);
        assert_eq!(
            worker.image_policy(&ModelKey::parse("shared")),
            Some(ImagePolicy::Forbidden)
        );
    }

    #[test]
    fn image_bearing_task_skips_forbidding_members() {
        // alpha forbids images for "shared", gamma is optional.
        let worker = merge_worker(&["alpha", "gamma"]);
        let key = ModelKey::parse("shared");

        let text_only = worker.eligible_members(&key, false);
        assert_eq!(text_only.len(), 2);

        let with_images = worker.eligible_members(&key, true);
        assert_eq!(with_images.len(), 1);
        assert_eq!(with_images[0].adapter_type, "gamma");

        // Every member forbids: the set is untouched (admission rejects).
        let worker = merge_worker(&["alpha"]);
        assert_eq!(worker.eligible_members(&key, true).len(), 1);
    }

    #[test]
    fn model_type_is_first_supporting_member() {
        let worker = merge_worker(&["alpha", "beta"]);
        assert_eq!(
            worker.model_type(&ModelKey::parse("shared")),
            Some(Modality::Text)
        );
        let worker = merge_worker(&["beta", "alpha"]);
        assert_eq!(
            worker.model_type(&ModelKey::parse("shared")),
            Some(Modality::Image)
        );
    }

    #[test]
    fn reservation_is_exclusive() {
        let worker = single_worker("alpha");
        assert_eq!(worker.busy(), 0);
        assert!(worker.try_reserve());
        assert_eq!(worker.busy(), 1);
        assert!(!worker.try_reserve());
        worker.release();
        assert_eq!(worker.busy(), 0);
        assert!(worker.try_reserve());
    }

    #[tokio::test]
    async fn page_auth_lock_serializes() {
        let worker = single_worker("alpha");
        let guard = worker.page_auth().acquire().await;
        assert!(worker.page_auth().try_acquire().is_none());
        drop(guard);
        assert!(worker.page_auth().try_acquire().is_some());
    }

    #[tokio::test]
    async fn init_enters_target_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(MiniLauncher::default());
        let instance = test_instance(launcher.clone(), dir.path());
        let worker = single_worker("alpha");

        worker.init(instance.clone(), false).await.unwrap();
        assert!(worker.is_initialized());
        let page = launcher.first_page();
        assert_eq!(*page.url.lock(), "https://alpha.test/");

        // Repeat init neither navigates nor opens another tab.
        worker.init(instance, false).await.unwrap();
        assert_eq!(page.gotos.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.browsers.lock()[0].pages.lock().len(), 1);
    }

    #[tokio::test]
    async fn generate_runs_the_member_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(MiniLauncher::default());
        let instance = test_instance(launcher, dir.path());
        let worker = single_worker("alpha");
        worker.init(instance, false).await.unwrap();

        let task = Task::new(
            "alpha-only".to_string(),
            "hello".to_string(),
            Vec::new(),
            false,
            serde_json::Map::new(),
        );
        let output = worker.generate(&task).await.unwrap();
        assert_eq!(output.text.as_deref(), Some("stub"));
    }

    #[tokio::test]
    async fn monitor_parking_skips_when_already_on_host() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(MiniLauncher::default());
        let instance = test_instance(launcher.clone(), dir.path());

        let config = WorkerConfig {
            name: "merged".into(),
            adapter_type: None,
            merge_types: Some(vec!["alpha".into(), "beta".into()]),
            merge_monitor: Some("beta".into()),
        };
        let worker = Worker::new(
            config,
            registry(),
            Arc::new(HashMap::new()),
            FailoverConfig::default(),
        );
        worker.init(instance, false).await.unwrap();

        let page = launcher.first_page();
        assert_eq!(*page.url.lock(), "https://alpha.test/");

        worker.navigate_to_monitor().await.unwrap();
        assert_eq!(*page.url.lock(), "https://beta.test/");
        assert_eq!(page.gotos.load(Ordering::SeqCst), 2);

        // Already parked: no further navigation.
        worker.navigate_to_monitor().await.unwrap();
        assert_eq!(page.gotos.load(Ordering::SeqCst), 2);
    }
}
