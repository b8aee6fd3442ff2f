//! Periodic housekeeping: job TTL expiry, idle pipeline unloading, gauges.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::queue::JobQueue;
use crate::jobs::JobStore;
use crate::models::ModelRegistry;
use crate::telemetry;

#[derive(Debug, Clone)]
pub struct JanitorSettings {
    pub interval: Duration,
    /// How long finished jobs stay queryable.
    pub job_ttl: Duration,
    /// Unload pipelines idle this long. `None` keeps them resident.
    pub pipeline_idle_timeout: Option<Duration>,
}

impl Default for JanitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            job_ttl: Duration::from_secs(3600),
            pipeline_idle_timeout: None,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub purged_jobs: usize,
    pub unloaded_pipelines: Vec<String>,
}

pub struct Janitor {
    store: Arc<JobStore>,
    queue: Arc<JobQueue>,
    registry: Arc<ModelRegistry>,
    settings: JanitorSettings,
}

impl Janitor {
    pub fn new(
        store: Arc<JobStore>,
        queue: Arc<JobQueue>,
        registry: Arc<ModelRegistry>,
        settings: JanitorSettings,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            settings,
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        let purged_jobs = self.store.purge_expired(self.settings.job_ttl);
        let unloaded_pipelines = match self.settings.pipeline_idle_timeout {
            Some(idle) => self.registry.evict_idle(idle).await,
            None => Vec::new(),
        };

        telemetry::record_queue_depth(self.queue.len().await);
        telemetry::record_job_counts(&self.store.counts());
        telemetry::record_accelerator_memory(self.registry.memory().allocated());

        if purged_jobs > 0 || !unloaded_pipelines.is_empty() {
            tracing::info!(
                purged_jobs,
                unloaded = ?unloaded_pipelines,
                "janitor sweep"
            );
        }
        SweepReport {
            purged_jobs,
            unloaded_pipelines,
        }
    }

    /// Sweep every interval until `stop` fires.
    pub fn spawn(self, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.settings.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::jobs::{JobId, JobRecord, OperationKind};
    use crate::memory::{AcceleratorConfig, AcceleratorMemory, GIB};
    use crate::models::{LoadError, PipelineCatalog, PipelineLoader, PipelineSpec, FLUX_FILL};
    use crate::scheduler::JobQueueConfig;

    struct NoopLoader;

    #[async_trait]
    impl PipelineLoader for NoopLoader {
        async fn load(&self, _spec: &PipelineSpec) -> Result<(), LoadError> {
            Ok(())
        }

        async fn unload(&self, _spec: &PipelineSpec) -> Result<(), LoadError> {
            Ok(())
        }
    }

    fn janitor(settings: JanitorSettings) -> (Janitor, Arc<JobStore>, Arc<ModelRegistry>) {
        let store = Arc::new(JobStore::new());
        let queue = Arc::new(JobQueue::new(JobQueueConfig::default()));
        let memory = AcceleratorMemory::new(AcceleratorConfig { memory_bytes: 40 * GIB });
        let registry = Arc::new(ModelRegistry::new(
            PipelineCatalog::default(),
            memory,
            Arc::new(NoopLoader),
        ));
        let janitor = Janitor::new(store.clone(), queue, registry.clone(), settings);
        (janitor, store, registry)
    }

    #[tokio::test]
    async fn sweep_unloads_idle_pipelines_when_enabled() {
        let (janitor, _store, registry) = janitor(JanitorSettings {
            pipeline_idle_timeout: Some(Duration::ZERO),
            ..JanitorSettings::default()
        });
        drop(registry.acquire_for(OperationKind::Inpainting).await.unwrap());

        let report = janitor.sweep().await;
        assert_eq!(report.unloaded_pipelines, vec![FLUX_FILL.to_string()]);
        assert_eq!(registry.loaded_count(), 0);
    }

    #[tokio::test]
    async fn sweep_keeps_pipelines_without_idle_timeout() {
        let (janitor, _store, registry) = janitor(JanitorSettings::default());
        drop(registry.acquire_for(OperationKind::Inpainting).await.unwrap());

        assert_eq!(janitor.sweep().await, SweepReport::default());
        assert!(registry.is_loaded(FLUX_FILL));
    }

    #[tokio::test]
    async fn sweep_purges_expired_jobs() {
        let (janitor, store, _registry) = janitor(JanitorSettings {
            job_ttl: Duration::ZERO,
            ..JanitorSettings::default()
        });
        let finished = JobId::new();
        store.insert(
            JobRecord::new(finished, Uuid::new_v4(), OperationKind::EmptyRedesign),
            CancellationToken::new(),
        );
        store.cancel(&finished).unwrap();
        let queued = JobId::new();
        store.insert(
            JobRecord::new(queued, Uuid::new_v4(), OperationKind::EmptyRedesign),
            CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;

        let report = janitor.sweep().await;
        assert_eq!(report.purged_jobs, 1);
        assert!(!store.contains(&finished));
        assert!(store.contains(&queued));
    }
}
