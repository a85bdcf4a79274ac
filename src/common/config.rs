//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) gives a working engine.
//!
//! ```toml
//! [grid]
//! resolution_m = 0.5
//! vertical_resolution_m = 1.0
//!
//! [concurrency]
//! batch_size = 64
//! worker_threads = 4
//!
//! [cache]
//! strategy = "adaptive"
//!
//! [environment]
//! kind = "office"
//! humidity_percent = 60.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoverageError, Result};
use crate::geometry::{FloorConstruction, FloorDescription};
use crate::optimizer::CacheStrategy;
use crate::propagation::{EnvironmentProfile, EnvironmentType, EnvironmentalConditions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Horizontal spacing between grid points (m).
    pub resolution_m: f64,
    /// Vertical spacing between grid layers (m); coarser than the horizontal spacing.
    pub vertical_resolution_m: f64,
    /// Upper bound on evaluated points when `adaptive` is set.
    pub max_points: usize,
    /// Pick the resolution from the room size instead of using `resolution_m` as is.
    pub adaptive: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            resolution_m: 0.5,
            vertical_resolution_m: 1.0,
            max_points: 20_000,
            adaptive: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RayTracingConfig {
    /// Paths arriving weaker than this are discarded (dBm).
    pub min_signal_dbm: f64,
    pub enable_reflections: bool,
    pub enable_double_reflections: bool,
    /// Only the first N walls take part in double reflections; the pair count grows quadratically.
    pub max_double_reflection_walls: usize,
    pub receiver_gain_dbi: f64,
}

impl Default for RayTracingConfig {
    fn default() -> Self {
        Self {
            min_signal_dbm: -100.0,
            enable_reflections: true,
            enable_double_reflections: true,
            max_double_reflection_walls: 8,
            receiver_gain_dbi: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Grid points per batch.
    pub batch_size: usize,
    /// Worker threads; `None` uses one per core.
    pub worker_threads: Option<usize>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            worker_threads: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub strategy: CacheStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CacheStrategy::Adaptive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// Resident set size above which workers back off (MiB).
    pub threshold_mb: u64,
    pub backoff_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_mb: 2048,
            backoff_ms: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub kind: EnvironmentType,
    #[serde(flatten)]
    pub conditions: EnvironmentalConditions,
}

impl EnvironmentConfig {
    pub fn profile(&self) -> EnvironmentProfile {
        EnvironmentProfile::for_environment(self.kind)
    }
}

/// Enables inter-floor paths. Floors are counted from the bottom of the room bounds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiFloorConfig {
    /// Overrides the room's storey height.
    pub floor_height_m: Option<f64>,
    /// Overrides the room's floor construction.
    pub construction: Option<FloorConstruction>,
}

impl MultiFloorConfig {
    /// Floor-to-floor height used for `floor`.
    pub fn floor_height(&self, floor: &FloorDescription) -> f64 {
        self.floor_height_m.unwrap_or(floor.storey_height)
    }

    /// Configured construction, else the scanned one, else the environment's default.
    pub fn construction(&self, floor: &FloorDescription, profile: &EnvironmentProfile) -> FloorConstruction {
        self.construction.or(floor.construction).unwrap_or(profile.floor_construction)
    }

    /// Floor index of height `z` above `base_z`.
    pub fn floor_index(&self, floor: &FloorDescription, z: f64, base_z: f64) -> i64 {
        ((z - base_z) / self.floor_height(floor)).floor() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub ray_tracing: RayTracingConfig,
    pub concurrency: ConcurrencyConfig,
    pub cache: CacheConfig,
    pub memory: MemoryConfig,
    pub environment: EnvironmentConfig,
    pub multi_floor: Option<MultiFloorConfig>,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Returns
    /// * `Ok(EngineConfig)` if the file was read, parsed and passed validation
    /// * `Err(CoverageError::SceneLoad)` if it could not be read or parsed
    /// * `Err(CoverageError::InvalidConfiguration)` for out-of-range values
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path).map_err(|e| CoverageError::SceneLoad {
            path: config_path.display().to_string(),
            message: format!("Failed to read config file: {}", e),
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| CoverageError::SceneLoad {
            path: config_path.display().to_string(),
            message: format!("Failed to parse config file: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CoverageError::InvalidConfiguration(msg));
        if !(self.grid.resolution_m > 0.0) || !self.grid.resolution_m.is_finite() {
            return invalid(format!("grid.resolution_m must be positive, got {}", self.grid.resolution_m));
        }
        if !(self.grid.vertical_resolution_m > 0.0) || !self.grid.vertical_resolution_m.is_finite() {
            return invalid(format!("grid.vertical_resolution_m must be positive, got {}", self.grid.vertical_resolution_m));
        }
        if self.grid.max_points == 0 {
            return invalid("grid.max_points must be at least 1".into());
        }
        if self.concurrency.batch_size == 0 {
            return invalid("concurrency.batch_size must be at least 1".into());
        }
        if self.concurrency.worker_threads == Some(0) {
            return invalid("concurrency.worker_threads must be at least 1".into());
        }
        if !self.ray_tracing.min_signal_dbm.is_finite() {
            return invalid("ray_tracing.min_signal_dbm must be finite".into());
        }
        if let Some(height) = self.multi_floor.as_ref().and_then(|mf| mf.floor_height_m) {
            if !(height > 0.0) || !height.is_finite() {
                return invalid(format!("multi_floor.floor_height_m must be positive, got {}", height));
            }
        }
        Ok(())
    }
}
