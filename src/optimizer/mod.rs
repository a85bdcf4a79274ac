//! Performance optimizer.
//!
//! Cross-cutting helpers used by the coverage engine and the predictor:
//!
//! - `cache`: bounded concurrent cache with LRU/LFU/adaptive eviction, deterministic keys
//! - `resolution`: grid-resolution adaptation and frequency-set reduction
//! - `batching`: Morton-ordered batching of grid points
//! - `memory`: advisory resident-memory monitor

pub mod batching;
pub mod cache;
pub mod memory;
pub mod resolution;

pub use batching::{PointBatch, morton_batches, morton_code};
pub use cache::{AdaptiveCache, CacheKeyBuilder, CacheStats, CacheStrategy, EVICTION_FRACTION};
pub use memory::MemoryMonitor;
pub use resolution::{RequestPlan, adaptive_resolution, plan_request, reduce_frequencies};
