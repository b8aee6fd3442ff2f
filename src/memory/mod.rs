//! Accelerator memory management.
//!
//! Provides the byte budget that the model registry loads pipelines against.

mod accelerator;

pub use accelerator::{
    AcceleratorConfig, AcceleratorMemory, AcceleratorMemoryError, Reservation, GIB,
};
