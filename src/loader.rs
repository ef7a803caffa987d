//! Lazy, at-most-once engine initialisation.
//!
//! [`EngineLoader::acquire`] hands out an [`EngineHandle`]. The first call
//! starts initialisation; every call that arrives while it is running joins
//! the same [`Shared`] future, so the module is loaded, the worker probed and
//! the engine bound exactly once no matter how many conversions race to be
//! first.
//!
//! ## Worker resolution
//!
//! ```text
//! configured worker_src? ──yes──▶ use it (no probe)
//!          │ no
//!          ▼
//! probe local worker ──ok──▶ Local
//!          │ missing / error / non-2xx (logged, swallowed)
//!          ▼
//! pinned remote worker ──▶ Remote
//! ```
//!
//! A successful load remembers its worker source; a failed one forgets
//! everything, so the next call starts over with a fresh probe.

use crate::config::{LoaderConfig, ResourceLocation};
use crate::engine::pdfium::PdfiumModule;
use crate::engine::{EngineModule, RenderEngine};
use crate::error::{EngineLoadError, LoadStage, ProbeError};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Worker source ────────────────────────────────────────────────────────

/// How a worker source was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerOrigin {
    /// Set by the host before the first load.
    Configured,
    /// The local candidate passed its existence probe.
    Local,
    /// The pinned remote fallback.
    Remote,
}

/// The resolved location of the engine's worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSource {
    pub location: ResourceLocation,
    pub origin: WorkerOrigin,
}

impl fmt::Display for WorkerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.location, self.origin)
    }
}

// ── Engine handle ────────────────────────────────────────────────────────

/// A ready engine. Cloning is cheap; all clones share one engine.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn RenderEngine>,
    worker_src: WorkerSource,
}

impl EngineHandle {
    pub fn engine(&self) -> Arc<dyn RenderEngine> {
        Arc::clone(&self.engine)
    }

    pub fn worker_src(&self) -> &WorkerSource {
        &self.worker_src
    }

    /// `true` when both handles point at the same engine instance.
    pub fn same_engine(&self, other: &EngineHandle) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine", &self.engine.name())
            .field("worker_src", &self.worker_src)
            .finish()
    }
}

// ── Existence probe ──────────────────────────────────────────────────────

/// Lightweight "does this resource exist?" check.
pub trait ResourceProbe: Send + Sync + 'static {
    fn probe<'a>(&'a self, location: &'a ResourceLocation) -> BoxFuture<'a, Result<(), ProbeError>>;
}

/// `HEAD` for URLs, file metadata for paths.
#[derive(Debug, Clone)]
pub struct ExistenceProbe {
    client: reqwest::Client,
}

impl ExistenceProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for ExistenceProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ResourceProbe for ExistenceProbe {
    fn probe<'a>(&'a self, location: &'a ResourceLocation) -> BoxFuture<'a, Result<(), ProbeError>> {
        async move {
            match location {
                ResourceLocation::Path(path) => match tokio::fs::metadata(path).await {
                    Ok(meta) if meta.is_file() => Ok(()),
                    _ => Err(ProbeError::Missing {
                        path: path.display().to_string(),
                    }),
                },
                ResourceLocation::Url(url) => {
                    let response = self.client.head(url).send().await.map_err(|e| {
                        ProbeError::Request {
                            url: url.clone(),
                            reason: e.to_string(),
                        }
                    })?;

                    if response.status().is_success() {
                        Ok(())
                    } else {
                        Err(ProbeError::Status {
                            url: url.clone(),
                            status: response.status().as_u16(),
                        })
                    }
                }
            }
        }
        .boxed()
    }
}

// ── Loader ───────────────────────────────────────────────────────────────

type InitFuture = Shared<BoxFuture<'static, Result<EngineHandle, EngineLoadError>>>;

static GLOBAL_LOADER: OnceLock<EngineLoader> = OnceLock::new();

/// Owns the engine singleton and the policy for initialising it.
#[derive(Clone)]
pub struct EngineLoader {
    inner: Arc<Inner>,
}

struct Inner {
    module: Arc<dyn EngineModule>,
    probe: Arc<dyn ResourceProbe>,
    config: LoaderConfig,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    engine: Option<EngineHandle>,
    in_flight: Option<InitFuture>,
    /// Worker source remembered from the last successful load.
    worker_src: Option<WorkerSource>,
}

impl EngineLoader {
    /// A loader for `module`, probing with [`ExistenceProbe`].
    pub fn new(module: Arc<dyn EngineModule>, config: LoaderConfig) -> Self {
        let probe = Arc::new(ExistenceProbe::new(Duration::from_secs(
            config.probe_timeout_secs,
        )));
        Self::with_probe(module, probe, config)
    }

    pub fn with_probe(
        module: Arc<dyn EngineModule>,
        probe: Arc<dyn ResourceProbe>,
        config: LoaderConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                module,
                probe,
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// The process-wide loader: PDFium, configured from the environment.
    ///
    /// Call [`EngineLoader::install_global`] before first use to replace it.
    pub fn global() -> &'static EngineLoader {
        GLOBAL_LOADER.get_or_init(|| {
            EngineLoader::new(Arc::new(PdfiumModule::new()), LoaderConfig::from_env())
        })
    }

    /// Make `loader` the process-wide loader. Fails (returning it) if the
    /// global loader already exists.
    pub fn install_global(loader: EngineLoader) -> Result<(), EngineLoader> {
        GLOBAL_LOADER.set(loader)
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// `true` once an engine has been initialised.
    pub fn is_ready(&self) -> bool {
        self.inner.lock_state().engine.is_some()
    }

    /// The worker source the next load would use without probing, if any.
    pub fn worker_src(&self) -> Option<WorkerSource> {
        self.inner.known_worker()
    }

    /// Return the engine, initialising it if this is the first call.
    ///
    /// Concurrent first callers share one initialisation and one outcome.
    pub async fn acquire(&self) -> Result<EngineHandle, EngineLoadError> {
        let init = {
            let mut state = self.inner.lock_state();
            if let Some(engine) = &state.engine {
                return Ok(engine.clone());
            }
            match &state.in_flight {
                Some(init) => {
                    debug!("Joining in-flight engine initialisation");
                    init.clone()
                }
                None => {
                    let init = Arc::clone(&self.inner).initialize().boxed().shared();
                    state.in_flight = Some(init.clone());
                    init
                }
            }
        };

        init.await
    }

    /// Probe the local worker candidate exactly as initialisation does.
    pub(crate) async fn probe_local(&self) -> Option<(ResourceLocation, Result<(), ProbeError>)> {
        let local = self.inner.config.local_worker.clone()?;
        let outcome = self.inner.probe.probe(&local).await;
        Some((local, outcome))
    }
}

impl fmt::Debug for EngineLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLoader")
            .field("module", &self.inner.module.name())
            .field("config", &self.inner.config)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn known_worker(&self) -> Option<WorkerSource> {
        if let Some(src) = &self.lock_state().worker_src {
            return Some(src.clone());
        }
        self.config.worker_src.clone().map(|location| WorkerSource {
            location,
            origin: WorkerOrigin::Configured,
        })
    }

    /// Runs once per attempt inside the shared future; publishes the outcome.
    ///
    /// A panic during the attempt is reported as a [`LoadStage::Task`]
    /// failure, so the next call starts a fresh attempt.
    async fn initialize(self: Arc<Self>) -> Result<EngineHandle, EngineLoadError> {
        let result = AssertUnwindSafe(self.try_initialize())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(EngineLoadError::new(
                    LoadStage::Task,
                    "engine initialisation panicked",
                ))
            });

        let mut state = self.lock_state();
        state.in_flight = None;
        match &result {
            Ok(handle) => {
                info!(
                    "Engine '{}' ready (worker: {})",
                    handle.engine.name(),
                    handle.worker_src
                );
                state.worker_src = Some(handle.worker_src.clone());
                state.engine = Some(handle.clone());
            }
            Err(e) => warn!("Engine initialisation failed: {}", e),
        }

        result
    }

    async fn try_initialize(&self) -> Result<EngineHandle, EngineLoadError> {
        info!(
            "Initialising engine '{}' v{}",
            self.module.name(),
            self.module.version()
        );
        self.module
            .load()
            .map_err(|e| EngineLoadError::new(LoadStage::Module, e.to_string()))?;

        let worker = match self.known_worker() {
            Some(worker) => worker,
            None => self.resolve_worker().await,
        };
        debug!("Binding engine against worker {}", worker);

        let module = Arc::clone(&self.module);
        let bind_worker = worker.clone();
        let engine = tokio::task::spawn_blocking(move || module.bind(&bind_worker))
            .await
            .map_err(|e| EngineLoadError::new(LoadStage::Task, format!("bind task failed: {e}")))?
            .map_err(|e| EngineLoadError::new(LoadStage::Bind, e.to_string()))?;

        Ok(EngineHandle {
            engine,
            worker_src: worker,
        })
    }

    async fn resolve_worker(&self) -> WorkerSource {
        let remote = WorkerSource {
            location: self.config.remote_worker.clone(),
            origin: WorkerOrigin::Remote,
        };

        let Some(local) = &self.config.local_worker else {
            debug!("No local worker candidate; using {}", remote.location);
            return remote;
        };

        match self.probe.probe(local).await {
            Ok(()) => {
                debug!("Local worker found at {}", local);
                WorkerSource {
                    location: local.clone(),
                    origin: WorkerOrigin::Local,
                }
            }
            Err(e) => {
                warn!(
                    "Local worker unavailable ({}); falling back to {} (pinned to v{})",
                    e,
                    remote.location,
                    self.module.version()
                );
                remote
            }
        }
    }
}

/// [`EngineLoader::acquire`] on the process-wide loader.
pub async fn acquire_engine() -> Result<EngineHandle, EngineLoadError> {
    EngineLoader::global().acquire().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{http_response, serve_http, MockModule, MockProbe};
    use std::path::PathBuf;

    fn config() -> LoaderConfig {
        LoaderConfig {
            worker_src: None,
            local_worker: Some(ResourceLocation::Path(PathBuf::from("/srv/app/libpdfium.so"))),
            remote_worker: ResourceLocation::Url("https://cdn.example/pdfium-7690.tgz".into()),
            aux_resources_base: None,
            probe_timeout_secs: 1,
        }
    }

    fn loader(module: &Arc<MockModule>, probe: &Arc<MockProbe>, config: LoaderConfig) -> EngineLoader {
        EngineLoader::with_probe(module.clone(), probe.clone(), config)
    }

    #[tokio::test]
    async fn second_acquire_returns_cached_handle() {
        let module = Arc::new(MockModule::default());
        let probe = Arc::new(MockProbe::found());
        let loader = loader(&module, &probe, config());

        let first = loader.acquire().await.unwrap();
        let second = loader.acquire().await.unwrap();

        assert!(first.same_engine(&second));
        assert_eq!(module.binds(), 1);
        assert_eq!(probe.calls(), 1);
        assert_eq!(first.worker_src().origin, WorkerOrigin::Local);
        assert!(loader.is_ready());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_share_one_initialisation() {
        let module = Arc::new(MockModule::default().with_bind_delay(Duration::from_millis(50)));
        let probe = Arc::new(MockProbe::found());
        let loader = loader(&module, &probe, config());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let loader = loader.clone();
                tokio::spawn(async move { loader.acquire().await })
            })
            .collect();
        let handles: Vec<EngineHandle> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(module.loads(), 1);
        assert_eq!(module.binds(), 1);
        assert_eq!(probe.calls(), 1);
        assert!(handles.iter().all(|h| h.same_engine(&handles[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_failure() {
        let module = Arc::new(
            MockModule::default()
                .failing_binds(1)
                .with_bind_delay(Duration::from_millis(50)),
        );
        let probe = Arc::new(MockProbe::found());
        let loader = loader(&module, &probe, config());

        let results = futures::future::join_all((0..4).map(|_| loader.acquire())).await;

        assert_eq!(module.binds(), 1);
        for r in results {
            let err = r.unwrap_err();
            assert_eq!(err.stage, LoadStage::Bind);
        }
        assert!(!loader.is_ready());
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let module = Arc::new(MockModule::default().failing_binds(1));
        let probe = Arc::new(MockProbe::found());
        let loader = loader(&module, &probe, config());

        let err = loader.acquire().await.unwrap_err();
        assert!(err.to_string().contains("Failed to load PDF engine"));

        loader.acquire().await.expect("retry should start from scratch");
        assert_eq!(module.binds(), 2);
        // nothing was remembered from the failed attempt, so it probed again
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn missing_local_worker_falls_back_to_remote() {
        let module = Arc::new(MockModule::default());
        let probe = Arc::new(MockProbe::missing());
        let cfg = config();
        let remote = cfg.remote_worker.clone();
        let loader = loader(&module, &probe, cfg);

        let handle = loader.acquire().await.expect("probe failure must not abort");
        assert_eq!(handle.worker_src().origin, WorkerOrigin::Remote);
        assert_eq!(handle.worker_src().location, remote);
        assert_eq!(module.bound_to(), Some(remote));
    }

    #[tokio::test]
    async fn configured_worker_skips_probe() {
        let module = Arc::new(MockModule::default());
        let probe = Arc::new(MockProbe::found());
        let configured = ResourceLocation::Path(PathBuf::from("/opt/pdfium/libpdfium.so"));
        let loader = loader(&module, &probe, config().worker_src(configured.clone()));

        let handle = loader.acquire().await.unwrap();
        assert_eq!(probe.calls(), 0);
        assert_eq!(handle.worker_src().origin, WorkerOrigin::Configured);
        assert_eq!(handle.worker_src().location, configured);
    }

    #[tokio::test]
    async fn module_failure_happens_before_probe() {
        let module = Arc::new(MockModule::default().failing_load());
        let probe = Arc::new(MockProbe::found());
        let loader = loader(&module, &probe, config());

        let err = loader.acquire().await.unwrap_err();
        assert_eq!(err.stage, LoadStage::Module);
        assert_eq!(probe.calls(), 0);
        assert_eq!(module.binds(), 0);
    }

    #[tokio::test]
    async fn existence_probe_checks_files() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("libpdfium.so");
        std::fs::write(&lib, b"lib").unwrap();
        let probe = ExistenceProbe::default();

        assert!(probe.probe(&ResourceLocation::Path(lib)).await.is_ok());
        assert!(matches!(
            probe.probe(&ResourceLocation::Path(dir.path().join("nope.so"))).await,
            Err(ProbeError::Missing { .. })
        ));
        // a directory is not a worker
        assert!(probe
            .probe(&ResourceLocation::Path(dir.path().to_path_buf()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn panicking_initialisation_is_reported_and_retried() {
        let module = Arc::new(MockModule::default().panicking_loads(1));
        let probe = Arc::new(MockProbe::found());
        let loader = loader(&module, &probe, config());

        let err = loader.acquire().await.unwrap_err();
        assert_eq!(err.stage, LoadStage::Task);
        assert!(!loader.is_ready());

        loader.acquire().await.expect("a panic must not wedge the loader");
        assert_eq!(module.loads(), 2);
        assert_eq!(module.binds(), 1);
    }

    #[tokio::test]
    async fn existence_probe_heads_urls() {
        let base = serve_http(|request| {
            if request.starts_with("HEAD /libpdfium.so ") {
                http_response("200 OK", &[], b"")
            } else {
                http_response("404 Not Found", &[], b"")
            }
        })
        .await;
        let probe = ExistenceProbe::new(Duration::from_secs(5));

        let found = ResourceLocation::Url(format!("{base}/libpdfium.so"));
        assert!(probe.probe(&found).await.is_ok());

        let missing = ResourceLocation::Url(format!("{base}/missing.so"));
        match probe.probe(&missing).await {
            Err(ProbeError::Status { status, url }) => {
                assert_eq!(status, 404);
                assert!(url.ends_with("/missing.so"));
            }
            other => panic!("expected a 404 status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_url_probe_is_a_request_error() {
        let probe = ExistenceProbe::new(Duration::from_secs(2));
        let location = ResourceLocation::Url("http://127.0.0.1:1/libpdfium.so".into());
        assert!(matches!(
            probe.probe(&location).await,
            Err(ProbeError::Request { .. })
        ));
    }

    #[tokio::test]
    async fn remote_worker_override_is_the_fallback() {
        let module = Arc::new(MockModule::default());
        let probe = Arc::new(MockProbe::missing());
        let mirror = ResourceLocation::Url("https://mirror.example/pdfium.tgz".into());
        let loader = loader(&module, &probe, config().remote_worker(mirror.clone()));

        let handle = loader.acquire().await.unwrap();
        assert_eq!(handle.worker_src().location, mirror);
        assert_eq!(module.bound_to(), Some(mirror));
    }
}
