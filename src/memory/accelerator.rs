//! Accelerator memory accounting.
//!
//! Pipelines are charged against a fixed byte budget when they are loaded and
//! credited back when their reservation is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub const GIB: usize = 1024 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcceleratorMemoryError {
    #[error("accelerator memory exhausted: requested {requested} bytes, available {available} bytes")]
    OutOfMemory { requested: usize, available: usize },
}

/// Configuration for the accelerator memory budget.
#[derive(Debug, Clone)]
pub struct AcceleratorConfig {
    pub memory_bytes: usize,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            memory_bytes: 24 * GIB,
        }
    }
}

struct MemoryInner {
    allocated: AtomicUsize,
    capacity: usize,
}

/// Tracks bytes reserved on the accelerator.
#[derive(Clone)]
pub struct AcceleratorMemory {
    inner: Arc<MemoryInner>,
}

impl AcceleratorMemory {
    pub fn new(config: AcceleratorConfig) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                allocated: AtomicUsize::new(0),
                capacity: config.memory_bytes,
            }),
        }
    }

    /// Reserve `bytes`. The reservation is released when dropped.
    pub fn reserve(&self, bytes: usize) -> Result<Reservation, AcceleratorMemoryError> {
        let inner = &self.inner;
        let mut current = inner.allocated.load(Ordering::Acquire);
        loop {
            let new_total = current.saturating_add(bytes);
            if new_total > inner.capacity {
                return Err(AcceleratorMemoryError::OutOfMemory {
                    requested: bytes,
                    available: inner.capacity.saturating_sub(current),
                });
            }
            match inner.allocated.compare_exchange_weak(
                current,
                new_total,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        Ok(Reservation {
            bytes,
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.inner.capacity.saturating_sub(self.allocated())
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// Bytes held on the accelerator by one loaded pipeline.
pub struct Reservation {
    bytes: usize,
    inner: Arc<MemoryInner>,
}

impl Reservation {
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation").field("bytes", &self.bytes).finish()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.inner.allocated.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
