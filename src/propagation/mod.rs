//! Propagation models.
//!
//! Stateless loss functions and the parameter sets they read. Nothing in this module knows
//! about rays or grids; the ray tracer composes these per path segment.
//!
//! ## Module Organization
//!
//! - `band`: WiFi bands and their representative frequencies
//! - `models`: free-space, ITU indoor, floor, wall, multi-floor and reflection losses
//! - `environment`: per-environment parameter tables and optional corrections
//! - `conversions`: dBm/mW conversions, linear-power combination, shadowing samples

pub mod band;
pub mod conversions;
pub mod environment;
pub mod models;

pub use band::FrequencyBand;
pub use conversions::{NO_SIGNAL_DBM, combine_powers_dbm, dbm_to_mw, mw_to_dbm, sample_shadowing_db};
pub use environment::{ClutterLevel, EnvironmentProfile, EnvironmentType, EnvironmentalConditions};
pub use models::{
    MAX_PATH_LOSS_DB, WallTraversal, floor_penetration_loss, free_space_path_loss, itu_indoor_path_loss, multi_floor_path_loss,
    multi_wall_penetration_loss, reflection_loss, wall_penetration_loss,
};
