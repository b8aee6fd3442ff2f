//! Registry of pipelines resident on the accelerator.
//!
//! Jobs pin the pipelines they need through a [`PipelineLease`]. When a new
//! pipeline does not fit the memory budget, unleased pipelines are evicted
//! least recently used first. Loads are serialized; lease bookkeeping is a
//! short synchronous critical section.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;

use super::catalog::{PipelineCatalog, PipelineSpec};
use super::loader::PipelineLoader;
use crate::jobs::OperationKind;
use crate::memory::{AcceleratorMemory, Reservation};
use crate::telemetry;

/// Upper bound on how long a blocked acquire sleeps before re-checking.
const RETRY_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("pipelines need {required} bytes but the accelerator only has {capacity}")]
    PipelineTooLarge { required: usize, capacity: usize },

    #[error("failed to load pipeline {name}: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("pipeline {0} is in use")]
    PipelineBusy(String),
}

impl RegistryError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LoadFailed { .. } | Self::PipelineBusy(_))
    }
}

/// Point-in-time view of one loaded pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub name: String,
    pub model_id: String,
    pub memory_bytes: usize,
    pub leases: usize,
    pub idle_secs: f64,
    pub loaded_secs: f64,
}

struct LoadedPipeline {
    spec: PipelineSpec,
    _reservation: Reservation,
    leases: usize,
    last_used: Instant,
    loaded_at: Instant,
}

struct RegistryShared {
    loaded: Mutex<HashMap<String, LoadedPipeline>>,
    released: Notify,
}

/// Tracks loaded pipelines, their footprint, and eviction order.
pub struct ModelRegistry {
    catalog: PipelineCatalog,
    memory: AcceleratorMemory,
    loader: Arc<dyn PipelineLoader>,
    shared: Arc<RegistryShared>,
    load_lock: tokio::sync::Mutex<()>,
}

impl ModelRegistry {
    pub fn new(
        catalog: PipelineCatalog,
        memory: AcceleratorMemory,
        loader: Arc<dyn PipelineLoader>,
    ) -> Self {
        Self {
            catalog,
            memory,
            loader,
            shared: Arc::new(RegistryShared {
                loaded: Mutex::new(HashMap::new()),
                released: Notify::new(),
            }),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &PipelineCatalog {
        &self.catalog
    }

    pub fn memory(&self) -> &AcceleratorMemory {
        &self.memory
    }

    /// Lease every pipeline an operation needs.
    pub async fn acquire_for(&self, kind: OperationKind) -> Result<PipelineLease, RegistryError> {
        let names = self.catalog.pipelines_for(kind).to_vec();
        self.acquire(&names).await
    }

    /// Lease `names` in order, loading and evicting as needed.
    ///
    /// Waits while the budget is held by other leases. If it has to wait, the
    /// partial lease is released first so two jobs never hold each other up.
    pub async fn acquire(&self, names: &[String]) -> Result<PipelineLease, RegistryError> {
        let specs = names
            .iter()
            .map(|n| {
                self.catalog
                    .get(n)
                    .cloned()
                    .ok_or_else(|| RegistryError::UnknownPipeline(n.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let required: usize = specs.iter().map(|s| s.memory_bytes).sum();
        if required > self.memory.capacity() {
            return Err(RegistryError::PipelineTooLarge {
                required,
                capacity: self.memory.capacity(),
            });
        }

        loop {
            let mut lease = PipelineLease::new(Arc::clone(&self.shared));
            let mut blocked = false;

            for spec in &specs {
                if self.try_pin(&spec.name) || self.load_pinned(spec, names).await? {
                    lease.names.push(spec.name.clone());
                } else {
                    blocked = true;
                    break;
                }
            }

            if !blocked {
                return Ok(lease);
            }

            drop(lease);
            tracing::debug!(pipelines = ?names, "accelerator full, waiting for a lease release");

            let released = self.shared.released.notified();
            tokio::select! {
                () = released => {}
                () = tokio::time::sleep(RETRY_INTERVAL) => {}
            }
        }
    }

    /// Pin `name` if it is already resident.
    fn try_pin(&self, name: &str) -> bool {
        let mut loaded = self.shared.loaded.lock();
        match loaded.get_mut(name) {
            Some(p) => {
                p.leases += 1;
                p.last_used = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Load `spec` with one lease already taken. Returns false when no room
    /// could be made yet.
    async fn load_pinned(&self, spec: &PipelineSpec, keep: &[String]) -> Result<bool, RegistryError> {
        let _guard = self.load_lock.lock().await;

        // Someone else may have loaded it while we waited for the lock.
        if self.try_pin(&spec.name) {
            return Ok(true);
        }

        let Some(victims) = self.pick_victims(spec, keep) else {
            return Ok(false);
        };
        for victim in victims {
            self.retire(victim).await;
        }
        let Ok(reservation) = self.memory.reserve(spec.memory_bytes) else {
            return Ok(false);
        };

        tracing::info!(pipeline = %spec.name, model_id = %spec.model_id, "loading pipeline");
        let started = Instant::now();
        match self.loader.load(spec).await {
            Ok(()) => {
                let now = Instant::now();
                self.shared.loaded.lock().insert(
                    spec.name.clone(),
                    LoadedPipeline {
                        spec: spec.clone(),
                        _reservation: reservation,
                        leases: 1,
                        last_used: now,
                        loaded_at: now,
                    },
                );
                telemetry::record_pipeline_load(&spec.name, started.elapsed());
                telemetry::record_accelerator_memory(self.memory.allocated());
                Ok(true)
            }
            Err(e) => {
                tracing::error!(pipeline = %spec.name, error = %e, "pipeline load failed");
                drop(reservation);
                Err(RegistryError::LoadFailed {
                    name: spec.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Choose idle pipelines outside `keep` to evict so `spec` fits, least
    /// recently used first, and take them out of the table.
    ///
    /// Returns None without touching anything when evicting every candidate
    /// would still not make room.
    fn pick_victims(&self, spec: &PipelineSpec, keep: &[String]) -> Option<Vec<LoadedPipeline>> {
        let mut loaded = self.shared.loaded.lock();
        let available = self.memory.available();
        if available >= spec.memory_bytes {
            return Some(Vec::new());
        }

        let mut candidates: Vec<(&String, Instant, usize)> = loaded
            .iter()
            .filter(|(name, p)| p.leases == 0 && !keep.iter().any(|k| k == *name))
            .map(|(name, p)| (name, p.last_used, p.spec.memory_bytes))
            .collect();
        let reclaimable: usize = candidates.iter().map(|(_, _, bytes)| bytes).sum();
        if available + reclaimable < spec.memory_bytes {
            return None;
        }

        candidates.sort_by_key(|(_, last_used, _)| *last_used);
        let mut freed = available;
        let mut names = Vec::new();
        for (name, _, bytes) in candidates {
            if freed >= spec.memory_bytes {
                break;
            }
            freed += bytes;
            names.push(name.clone());
        }

        let victims = names
            .iter()
            .filter_map(|name| loaded.remove(name))
            .inspect(|p| {
                tracing::info!(pipeline = %p.spec.name, for_pipeline = %spec.name, "evicting idle pipeline");
            })
            .collect();
        Some(victims)
    }

    /// Ask the backend to unload `pipeline`. Its memory is credited back only
    /// after the backend answered. The request runs on its own task so a
    /// cancelled caller cannot abandon it halfway.
    async fn retire(&self, pipeline: LoadedPipeline) {
        let loader = Arc::clone(&self.loader);
        let memory = self.memory.clone();
        let name = pipeline.spec.name.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = loader.unload(&pipeline.spec).await {
                tracing::warn!(pipeline = %pipeline.spec.name, error = %e, "unload request failed");
            }
            drop(pipeline);
            telemetry::record_pipeline_eviction(&name);
            telemetry::record_accelerator_memory(memory.allocated());
        });
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "unload task ended abnormally");
        }
    }

    /// Unload a pipeline now. Returns false if it was not loaded.
    pub async fn unload(&self, name: &str) -> Result<bool, RegistryError> {
        let _guard = self.load_lock.lock().await;
        let removed = {
            let mut loaded = self.shared.loaded.lock();
            match loaded.get(name) {
                None => return Ok(false),
                Some(p) if p.leases > 0 => return Err(RegistryError::PipelineBusy(name.to_string())),
                Some(_) => loaded.remove(name),
            }
        };
        if let Some(pipeline) = removed {
            self.retire(pipeline).await;
        }
        Ok(true)
    }

    /// Unload every unleased pipeline idle for at least `older_than`.
    pub async fn evict_idle(&self, older_than: Duration) -> Vec<String> {
        let _guard = self.load_lock.lock().await;
        let evicted: Vec<LoadedPipeline> = {
            let mut loaded = self.shared.loaded.lock();
            let stale: Vec<String> = loaded
                .iter()
                .filter(|(_, p)| p.leases == 0 && p.last_used.elapsed() >= older_than)
                .map(|(name, _)| name.clone())
                .collect();
            stale.iter().filter_map(|name| loaded.remove(name)).collect()
        };

        let mut names = Vec::with_capacity(evicted.len());
        for pipeline in evicted {
            tracing::info!(pipeline = %pipeline.spec.name, "unloading idle pipeline");
            names.push(pipeline.spec.name.clone());
            self.retire(pipeline).await;
        }
        names
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.shared.loaded.lock().contains_key(name)
    }

    /// Active lease count for a loaded pipeline.
    pub fn leases(&self, name: &str) -> Option<usize> {
        self.shared.loaded.lock().get(name).map(|p| p.leases)
    }

    pub fn loaded_count(&self) -> usize {
        self.shared.loaded.lock().len()
    }

    /// Loaded pipelines sorted by name.
    pub fn snapshot(&self) -> Vec<PipelineStatus> {
        let loaded = self.shared.loaded.lock();
        let mut out: Vec<PipelineStatus> = loaded
            .values()
            .map(|p| PipelineStatus {
                name: p.spec.name.clone(),
                model_id: p.spec.model_id.clone(),
                memory_bytes: p.spec.memory_bytes,
                leases: p.leases,
                idle_secs: p.last_used.elapsed().as_secs_f64(),
                loaded_secs: p.loaded_at.elapsed().as_secs_f64(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

/// Pins a set of loaded pipelines for the duration of a job.
pub struct PipelineLease {
    names: Vec<String>,
    shared: Arc<RegistryShared>,
}

impl PipelineLease {
    fn new(shared: Arc<RegistryShared>) -> Self {
        Self {
            names: Vec::new(),
            shared,
        }
    }

    pub fn pipelines(&self) -> &[String] {
        &self.names
    }

    pub fn holds(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

impl std::fmt::Debug for PipelineLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLease").field("pipelines", &self.names).finish()
    }
}

impl Drop for PipelineLease {
    fn drop(&mut self) {
        if self.names.is_empty() {
            return;
        }
        {
            let mut loaded = self.shared.loaded.lock();
            let now = Instant::now();
            for name in &self.names {
                if let Some(p) = loaded.get_mut(name) {
                    p.leases = p.leases.saturating_sub(1);
                    p.last_used = now;
                }
            }
        }
        self.shared.released.notify_waiters();
    }
}
