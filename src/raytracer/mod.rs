//! Ray tracer.
//!
//! Builds discrete propagation paths between a transmitter and a receiver point and
//! combines them into the signal seen at that point.
//!
//! ## Module Organization
//!
//! - `transmitter`: routers/extenders, per-band radio settings, antenna patterns
//! - `path`: segments, paths, obstacle hits, multipath combination
//! - `tracer`: direct, reflected and inter-floor path construction

pub mod path;
pub mod tracer;
pub mod transmitter;

pub use path::{MultipathResult, ObstacleHit, PathKind, RayPath, RaySegment};
pub use tracer::{RayTracer, free_space_estimate};
pub use transmitter::{AntennaPattern, BandConfig, DeviceKind, RFTransmitter, validate_transmitters};
