//! Shared harness: an in-process gateway backed by a scripted fake runtime.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    archiver_config::ArchiverConfig,
    archiver_gateway::{GatewayState, build_gateway_app, build_jobs},
    archiver_sandbox::{Mount, SandboxError, SandboxHandle, SandboxRuntime, SandboxSpec},
    secrecy::Secret,
    tokio::net::TcpListener,
};

/// What the fake worker does once started.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Exit 0 after writing these bytes as the archive.
    Archive(Vec<u8>),
    /// Exit with `code`, leaving no archive.
    Exit { code: i64, logs: String },
    /// Exit 0 without writing anything.
    NoArtifact,
    /// Never exit; `wait` runs into its timeout.
    Hang,
    /// `create` itself fails.
    FailCreate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Create(String),
    Start(String),
    Wait(String),
    Logs(String),
    /// Container id and whether its artifact existed at removal time.
    Remove(String, bool),
}

#[derive(Debug)]
struct Container {
    artifact: Option<PathBuf>,
    holding_slot: bool,
    removed: bool,
}

/// Scripted [`SandboxRuntime`] that plays the worker's part on the host.
pub struct FakeRuntime {
    behavior: Behavior,
    run_time: Duration,
    events: Mutex<Vec<Event>>,
    containers: Mutex<HashMap<String, Container>>,
    specs: Mutex<Vec<SandboxSpec>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeRuntime {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Self::with_run_time(behavior, Duration::ZERO)
    }

    pub fn with_run_time(behavior: Behavior, run_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            run_time,
            events: Mutex::new(Vec::new()),
            containers: Mutex::new(HashMap::new()),
            specs: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn specs(&self) -> Vec<SandboxSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Create(_)))
            .count()
    }

    pub fn removals(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Remove(id, existed) => Some((id, existed)),
                _ => None,
            })
            .collect()
    }

    /// Highest number of containers seen between create and log collection.
    pub fn peak_active(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn release_slot(&self, id: &str) {
        let mut containers = self.containers.lock().unwrap();
        if let Some(c) = containers.get_mut(id)
            && c.holding_slot
        {
            c.holding_slot = false;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn artifact_of(&self, id: &str) -> Option<PathBuf> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .and_then(|c| c.artifact.clone())
    }

    /// Artifact path of a container that has not been removed yet.
    fn live_artifact_of(&self, id: &str) -> Option<PathBuf> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .filter(|c| !c.removed)
            .and_then(|c| c.artifact.clone())
    }
}

/// Host path of the archive the script will write, read back from the
/// mounted script and output directory.
fn artifact_path(spec: &SandboxSpec) -> Option<PathBuf> {
    let mut script = None;
    let mut output = None;
    for mount in &spec.mounts {
        if let Mount::Bind { source, target, .. } = mount {
            match target.as_str() {
                "/run.sh" => script = Some(source.clone()),
                "/output_mnt" => output = Some(source.clone()),
                _ => {},
            }
        }
    }
    let text = std::fs::read_to_string(script?).ok()?;
    let name = text
        .split_whitespace()
        .find_map(|word| word.strip_prefix("/output_mnt/"))?
        .to_string();
    Some(output?.join(name))
}

impl SandboxRuntime for FakeRuntime {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError> {
        let id = spec.name.clone().unwrap_or_else(|| "anonymous".into());
        self.record(Event::Create(id.clone()));
        self.specs.lock().unwrap().push(spec.clone());
        if matches!(self.behavior, Behavior::FailCreate) {
            return Err(SandboxError::InvalidSpec("image not found".into()));
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.containers.lock().unwrap().insert(id.clone(), Container {
            artifact: artifact_path(spec),
            holding_slot: true,
            removed: false,
        });
        Ok(SandboxHandle::new(id))
    }

    fn start(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
        self.record(Event::Start(sandbox.id().to_string()));
        Ok(())
    }

    fn wait(&self, sandbox: &SandboxHandle, timeout: Duration) -> Result<i64, SandboxError> {
        self.record(Event::Wait(sandbox.id().to_string()));
        if matches!(self.behavior, Behavior::Hang) {
            std::thread::sleep(timeout);
            return Err(SandboxError::Timeout {
                id: sandbox.id().to_string(),
                timeout,
            });
        }

        std::thread::sleep(self.run_time);
        match &self.behavior {
            Behavior::Archive(bytes) => {
                if let Some(path) = self.live_artifact_of(sandbox.id()) {
                    std::fs::write(path, bytes).map_err(|e| {
                        SandboxError::InvalidSpec(format!("fake worker write failed: {e}"))
                    })?;
                }
                Ok(0)
            },
            Behavior::Exit { code, .. } => Ok(*code),
            _ => Ok(0),
        }
    }

    fn logs(&self, sandbox: &SandboxHandle) -> Result<String, SandboxError> {
        self.record(Event::Logs(sandbox.id().to_string()));
        self.release_slot(sandbox.id());
        Ok(match &self.behavior {
            Behavior::Exit { logs, .. } => logs.clone(),
            Behavior::Hang => "+ git clone https://slow.example/huge.git /tmpfs_mnt\n".into(),
            _ => "+ git clone\n+ zip -r\n".into(),
        })
    }

    fn remove(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
        let existed = self
            .artifact_of(sandbox.id())
            .is_some_and(|path| path.exists());
        self.record(Event::Remove(sandbox.id().to_string(), existed));
        self.release_slot(sandbox.id());
        if let Some(c) = self.containers.lock().unwrap().get_mut(sandbox.id()) {
            c.removed = true;
        }
        Ok(())
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub runtime: Arc<FakeRuntime>,
    pub state: Arc<GatewayState>,
    pub volume: tempfile::TempDir,
}

impl TestServer {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{path_and_query}", self.addr)
    }

    pub fn volume_path(&self) -> &Path {
        self.volume.path()
    }

    /// Regular files left in the shared volume.
    pub fn leftover_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.volume.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    /// Poll until the volume is empty, for cleanup that finishes in a
    /// background task.
    pub async fn wait_for_empty_volume(&self) {
        for _ in 0..400 {
            if self.leftover_files().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("volume not cleaned up: {:?}", self.leftover_files());
    }
}

pub struct Options {
    pub concurrent_workers: usize,
    pub timeout_secs: u64,
    pub access_key: Option<&'static str>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            concurrent_workers: 8,
            timeout_secs: 60,
            access_key: None,
        }
    }
}

pub async fn start_server(runtime: Arc<FakeRuntime>, options: Options) -> TestServer {
    let volume = tempfile::tempdir().unwrap();

    let mut config = ArchiverConfig::default();
    config.archive.volume_path = volume.path().to_path_buf();
    config.archive.concurrent_workers = options.concurrent_workers;
    config.archive.timeout_secs = options.timeout_secs;
    config.archive.access_key = options.access_key.map(|k| Secret::new(k.to_string()));

    let jobs = build_jobs(&config, runtime.clone());
    let state = GatewayState::new(
        jobs,
        config.archive.access_key().cloned(),
        config.archive.max_disk_quota,
        #[cfg(feature = "metrics")]
        None,
    );
    let app = build_gateway_app(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        runtime,
        state,
        volume,
    }
}
