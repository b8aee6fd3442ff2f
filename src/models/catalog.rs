//! Pipelines the service knows how to load, and which operations need them.

use std::collections::HashMap;

use serde::Serialize;

use crate::jobs::OperationKind;
use crate::memory::GIB;

pub const FLORENCE_2: &str = "florence-2";
pub const FLUX_CANNY: &str = "flux-canny";
pub const FLUX_FILL: &str = "flux-fill";

/// Static description of a loadable pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSpec {
    pub name: String,
    pub model_id: String,
    /// Estimated accelerator footprint once loaded.
    pub memory_bytes: usize,
}

impl PipelineSpec {
    pub fn new(name: &str, model_id: &str, memory_bytes: usize) -> Self {
        Self {
            name: name.to_string(),
            model_id: model_id.to_string(),
            memory_bytes,
        }
    }
}

/// Pipeline specs plus the per-operation requirements.
#[derive(Debug, Clone)]
pub struct PipelineCatalog {
    specs: HashMap<String, PipelineSpec>,
    requirements: HashMap<OperationKind, Vec<String>>,
}

impl PipelineCatalog {
    pub fn new() -> Self {
        Self {
            specs: HashMap::new(),
            requirements: HashMap::new(),
        }
    }

    pub fn with_pipeline(mut self, spec: PipelineSpec) -> Self {
        self.specs.insert(spec.name.clone(), spec);
        self
    }

    /// Declare the pipelines an operation leases, in acquisition order.
    pub fn with_requirement(mut self, kind: OperationKind, pipelines: &[&str]) -> Self {
        self.requirements
            .insert(kind, pipelines.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn get(&self, name: &str) -> Option<&PipelineSpec> {
        self.specs.get(name)
    }

    pub fn pipelines_for(&self, kind: OperationKind) -> &[String] {
        self.requirements.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All specs, sorted by name.
    pub fn specs(&self) -> Vec<&PipelineSpec> {
        let mut specs: Vec<_> = self.specs.values().collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

impl Default for PipelineCatalog {
    fn default() -> Self {
        Self::new()
            .with_pipeline(PipelineSpec::new(FLORENCE_2, "microsoft/Florence-2-base", GIB))
            .with_pipeline(PipelineSpec::new(
                FLUX_CANNY,
                "black-forest-labs/FLUX.1-Canny-dev",
                16 * GIB,
            ))
            .with_pipeline(PipelineSpec::new(
                FLUX_FILL,
                "black-forest-labs/FLUX.1-Fill-dev",
                16 * GIB,
            ))
            .with_requirement(OperationKind::PopulatedRedesign, &[FLORENCE_2, FLUX_CANNY])
            .with_requirement(OperationKind::EmptyRedesign, &[FLUX_CANNY])
            .with_requirement(OperationKind::Inpainting, &[FLUX_FILL])
    }
}
