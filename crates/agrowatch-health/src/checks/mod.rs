//! Built-in health checks.

mod resources;

pub use resources::{
    evaluate_usage, DiskSpaceCheck, MemoryCheck, DEFAULT_DISK_THRESHOLD, DEFAULT_MEMORY_THRESHOLD,
};
