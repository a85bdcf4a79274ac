//! Indoor WiFi coverage planning.
//!
//! Predicts received signal strength across a scanned room from path-loss models and
//! multipath ray tracing, aggregates it into coverage maps, and scores where a new access
//! point or extender would help most.
//!
//! ## Module Organization
//!
//! - `geometry`: room model, walls, furniture, openings, intersection tests
//! - `propagation`: bands, unit conversions, path-loss models, environment profiles
//! - `raytracer`: transmitters, direct/reflected/inter-floor paths, multipath combination
//! - `coverage`: grid, coverage maps, concurrent engine, improvement analysis
//! - `optimizer`: caching, batching, resolution and frequency reduction, memory pressure
//! - `predictor`: point prediction, placement ranking, link quality
//! - `common`: engine configuration and scene loading
//! - `error`: shared error type

pub mod common;
pub mod coverage;
pub mod error;
pub mod geometry;
pub mod optimizer;
pub mod predictor;
pub mod propagation;
pub mod raytracer;

pub use common::{EngineConfig, Scene, load_scene};
pub use coverage::{CancellationToken, CoverageEngine, CoverageMap, SignalQuality, SignalStrength};
pub use error::{CoverageError, Result};
pub use geometry::{Point3D, RoomModel};
pub use predictor::{PlacementObjective, SignalPredictor};
pub use propagation::{EnvironmentType, FrequencyBand};
pub use raytracer::{DeviceKind, RFTransmitter};
