//! Coverage engine.
//!
//! Turns a room and a transmitter set into a [`CoverageMap`]: builds the lattice, evaluates
//! points concurrently through the ray tracer, aggregates, caches, and analyses the result.
//!
//! ## Module Organization
//!
//! - `grid`: dense lattice and world <-> index lookup
//! - `map`: per-point signal, coverage map, linear-power combination, statistics
//! - `engine`: orchestration, fan-out/fan-in, caching, cancellation
//! - `analysis`: improvement between maps, measured-sample blending

pub mod analysis;
pub mod engine;
pub mod grid;
pub mod map;

pub use analysis::{BlendSettings, CoverageImprovement, IMPROVEMENT_THRESHOLDS_DBM, MeasuredSample, ThresholdImprovement, analyze_improvement, blend_measurements};
pub use engine::{CancellationToken, CoverageEngine, coverage_cache_key, evaluate_point, push_scene};
pub use grid::{CoverageGrid, GridSpec};
pub use map::{CoverageMap, CoverageStatistics, MAX_RSSI_DBM, MIN_RSSI_DBM, SignalQuality, SignalStrength};
