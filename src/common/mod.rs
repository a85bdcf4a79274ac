//! Shared configuration and scene input.
//!
//! ## Module Organization
//!
//! - `config`: engine configuration loaded from TOML
//! - `scene`: scene JSON loading and validation

pub mod config;
pub mod scene;

pub use config::{CacheConfig, ConcurrencyConfig, EngineConfig, EnvironmentConfig, GridConfig, MemoryConfig, MultiFloorConfig, RayTracingConfig};
pub use scene::{Scene, load_scene, validate_scene};
