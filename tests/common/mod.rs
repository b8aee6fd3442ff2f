//! Shared fixtures: in-process stand-ins for the inference worker.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use parking_lot::Mutex;

use img2img_core::jobs::{JobId, JobRecord, JobStatus, JobStore};
use img2img_core::memory::GIB;
use img2img_core::models::{LoadError, PipelineLoader, PipelineSpec};
use img2img_core::pipeline::{
    Captioner, DefaultPrompter, DiffusionBackend, GenerateRequest, PipelineError,
};
use img2img_core::{Runtime, RuntimeConfig, RuntimeServices};

/// Records load and unload calls.
#[derive(Default)]
pub struct MockLoader {
    pub loads: Mutex<Vec<String>>,
    pub unloads: Mutex<Vec<String>>,
    /// Fail this many loads before succeeding.
    pub fail_loads: AtomicUsize,
    /// How long each unload takes to answer.
    pub unload_delay: Mutex<Duration>,
}

#[async_trait]
impl PipelineLoader for MockLoader {
    async fn load(&self, spec: &PipelineSpec) -> Result<(), LoadError> {
        if self
            .fail_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LoadError::Unreachable("connection refused".into()));
        }
        self.loads.lock().push(spec.name.clone());
        Ok(())
    }

    async fn unload(&self, spec: &PipelineSpec) -> Result<(), LoadError> {
        let delay = *self.unload_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.unloads.lock().push(spec.name.clone());
        Ok(())
    }
}

pub struct MockCaptioner;

#[async_trait]
impl Captioner for MockCaptioner {
    async fn caption(&self, _spec: &PipelineSpec, _image_path: &Path) -> String {
        "A cozy room with a grey sofa.".to_string()
    }
}

/// How the mock backend answers `/generate`.
#[derive(Debug, Clone)]
pub enum BackendMode {
    Succeed,
    /// Transient failure on the first `n` calls, success afterwards.
    FailTransient(usize),
    FailPermanent,
    Sleep(Duration),
}

/// Writes a small PNG to the requested output path.
pub struct MockBackend {
    pub mode: Mutex<BackendMode>,
    pub requests: Mutex<Vec<GenerateRequest>>,
    pub calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(mode: BackendMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DiffusionBackend for MockBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<PathBuf, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let mode = self.mode.lock().clone();
        match mode {
            BackendMode::Succeed => {}
            BackendMode::FailTransient(n) if call < n => {
                return Err(PipelineError::WorkerUnreachable("connection reset".into()));
            }
            BackendMode::FailTransient(_) => {}
            BackendMode::FailPermanent => {
                return Err(PipelineError::Generation("CUDA error: invalid prompt".into()));
            }
            BackendMode::Sleep(d) => tokio::time::sleep(d).await,
        }
        tokio::fs::write(&request.output_path, png_bytes(8, 8))
            .await
            .map_err(PipelineError::from)?;
        Ok(request.output_path.clone())
    }
}

pub struct Harness {
    pub runtime: Arc<Runtime>,
    pub loader: Arc<MockLoader>,
    pub backend: Arc<MockBackend>,
    pub dir: tempfile::TempDir,
}

pub fn test_config(dir: &Path) -> RuntimeConfig {
    let mut config = RuntimeConfig {
        data_dir: dir.to_path_buf(),
        ..RuntimeConfig::default()
    };
    config.accelerator.memory_bytes = 40 * GIB;
    config.job.job_timeout = Duration::from_secs(10);
    config.shutdown_timeout = Duration::from_secs(2);
    config
}

pub async fn start_with(mode: BackendMode, tweak: impl FnOnce(&mut RuntimeConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    tweak(&mut config);

    let loader = Arc::new(MockLoader::default());
    let backend = Arc::new(MockBackend::new(mode));
    let services = RuntimeServices {
        loader: loader.clone(),
        captioner: Arc::new(MockCaptioner),
        prompts: Arc::new(DefaultPrompter),
        backend: backend.clone(),
    };
    let runtime = Runtime::start(config, services).await.unwrap();
    Harness {
        runtime: Arc::new(runtime),
        loader,
        backend,
        dir,
    }
}

pub async fn start(mode: BackendMode) -> Harness {
    start_with(mode, |_| {}).await
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        if (x / 32 + y / 32) % 2 == 0 {
            image::Rgb([230, 230, 230])
        } else {
            image::Rgb([40, 40, 40])
        }
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Poll until the job reaches a terminal state.
pub async fn wait_terminal(store: &JobStore, id: &JobId) -> JobRecord {
    for _ in 0..500 {
        if let Some(record) = store.get(id) {
            if record.status.is_terminal() {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {id} did not finish: {:?}", store.get(id));
}

/// Poll until the job reaches `status`.
pub async fn wait_status(store: &JobStore, id: &JobId, status: JobStatus) -> JobRecord {
    for _ in 0..500 {
        if let Some(record) = store.get(id).filter(|r| r.status == status) {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached {status}: {:?}", store.get(id));
}
