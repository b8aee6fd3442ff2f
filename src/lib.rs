//! img2img Core Runtime
//!
//! Interior design image generation service. HTTP handlers validate uploads
//! and enqueue jobs; a fixed pool of workers leases pipelines from the model
//! registry and drives an external inference worker.
//!
//! # Components
//!
//! - **api**: request gateway (multipart forms, validation, task status)
//! - **scheduler**: priority job queue, workers, housekeeping
//! - **models**: pipeline catalog and the registry of resident pipelines
//! - **pipeline**: preprocessing, control images, prompts, worker protocol
//! - **jobs**: job records and the status state machine

pub mod api;
pub mod cli;
pub mod config;
pub mod health;
pub mod jobs;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod shutdown;
pub mod storage;
pub mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use config::EnvConfig;
use health::{HealthChecker, HealthInputs};
use jobs::JobStore;
use memory::{AcceleratorConfig, AcceleratorMemory};
use models::{ModelRegistry, PipelineCatalog, PipelineLoader};
use pipeline::{
    Captioner, DiffusionBackend, GenerationSettings, JobExecutor, OpenAiConfig, OpenAiPrompter,
    PromptGenerator, WorkerClient, WorkerConfig,
};
use scheduler::{Janitor, JanitorSettings, JobQueue, JobQueueConfig, Scheduler, WorkerContext, WorkerSettings};
use shutdown::{ShutdownCoordinator, ShutdownResult};
use storage::ImageStore;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub queue: JobQueueConfig,
    /// Number of workers, i.e. concurrent generations.
    pub max_concurrent: usize,
    pub accelerator: AcceleratorConfig,
    pub catalog: PipelineCatalog,
    pub job: WorkerSettings,
    pub janitor: JanitorSettings,
    pub generation: GenerationSettings,
    pub shutdown_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            queue: JobQueueConfig::default(),
            max_concurrent: 1,
            accelerator: AcceleratorConfig::default(),
            catalog: PipelineCatalog::default(),
            job: WorkerSettings::default(),
            janitor: JanitorSettings::default(),
            generation: GenerationSettings::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&EnvConfig> for RuntimeConfig {
    fn from(env: &EnvConfig) -> Self {
        Self {
            data_dir: env.data_dir.clone(),
            queue: env.queue.clone(),
            max_concurrent: env.max_concurrent,
            accelerator: env.accelerator.clone(),
            catalog: PipelineCatalog::default(),
            job: env.job.clone(),
            janitor: env.janitor.clone(),
            generation: GenerationSettings::default(),
            shutdown_timeout: env.shutdown_timeout,
        }
    }
}

/// External collaborators of the runtime.
#[derive(Clone)]
pub struct RuntimeServices {
    pub loader: Arc<dyn PipelineLoader>,
    pub captioner: Arc<dyn Captioner>,
    pub prompts: Arc<dyn PromptGenerator>,
    pub backend: Arc<dyn DiffusionBackend>,
}

impl RuntimeServices {
    /// Inference worker over HTTP plus the chat-completions prompt generator.
    pub fn remote(worker: WorkerConfig, openai: OpenAiConfig) -> Self {
        let client = Arc::new(WorkerClient::new(worker));
        let prompter = OpenAiPrompter::new(openai);
        if !prompter.is_configured() {
            tracing::warn!("no OpenAI API key configured, using default prompts");
        }
        Self {
            loader: client.clone(),
            captioner: client.clone(),
            prompts: Arc::new(prompter),
            backend: client,
        }
    }
}

/// The running service.
pub struct Runtime {
    pub images: ImageStore,
    pub store: Arc<JobStore>,
    pub queue: Arc<JobQueue>,
    pub registry: Arc<ModelRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub health: HealthChecker,
    shutdown_timeout: Duration,
    stop: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    /// Create the data directories and start workers and the janitor.
    pub async fn start(config: RuntimeConfig, services: RuntimeServices) -> std::io::Result<Self> {
        let images = ImageStore::new(&config.data_dir);
        images.ensure_dirs().await?;

        let store = Arc::new(JobStore::new());
        let queue = Arc::new(JobQueue::new(config.queue.clone()));
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let memory = AcceleratorMemory::new(config.accelerator.clone());
        let registry = Arc::new(ModelRegistry::new(
            config.catalog.clone(),
            memory,
            services.loader,
        ));
        let executor = JobExecutor::new(
            images.clone(),
            config.catalog.clone(),
            services.captioner,
            services.prompts,
            services.backend,
        )
        .with_settings(config.generation);

        let scheduler = Arc::new(Scheduler::new(queue.clone(), store.clone(), shutdown.clone()));
        let stop = CancellationToken::new();

        let ctx = Arc::new(WorkerContext {
            queue: queue.clone(),
            store: store.clone(),
            registry: registry.clone(),
            executor: Arc::new(executor),
            shutdown: shutdown.clone(),
            settings: config.job.clone(),
        });
        let mut tasks = scheduler::spawn_workers(ctx, config.max_concurrent, stop.clone());
        let janitor = Janitor::new(store.clone(), queue.clone(), registry.clone(), config.janitor.clone());
        tasks.push(janitor.spawn(stop.clone()));

        tracing::info!(
            workers = config.max_concurrent,
            queue_capacity = queue.capacity(),
            data_dir = %config.data_dir.display(),
            "runtime started"
        );

        Ok(Self {
            images,
            store,
            queue,
            registry,
            scheduler,
            shutdown,
            health: HealthChecker::default(),
            shutdown_timeout: config.shutdown_timeout,
            stop,
            tasks: Mutex::new(tasks),
        })
    }

    pub async fn health_inputs(&self) -> HealthInputs {
        let memory = self.registry.memory();
        HealthInputs {
            shutdown_state: self.shutdown.state().await,
            queue_depth: self.queue.len().await,
            queue_capacity: self.queue.capacity(),
            pipelines_loaded: self.registry.loaded_count(),
            memory_used_bytes: memory.allocated(),
            memory_capacity_bytes: memory.capacity(),
            jobs: self.store.counts(),
        }
    }

    /// Stop admission, cancel queued jobs, let running jobs finish within
    /// the shutdown timeout, then stop all background tasks.
    pub async fn shutdown(&self) -> ShutdownResult {
        let dropped = self.scheduler.close().await;
        if dropped > 0 {
            tracing::info!(dropped, "cancelled queued jobs");
        }
        let result = self.shutdown.initiate(self.shutdown_timeout).await;
        self.stop.cancel();

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for joined in futures::future::join_all(tasks).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        tracing::info!(result = ?result, "runtime stopped");
        result
    }
}
