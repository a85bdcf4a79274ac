//! Coverage orchestration.
//!
//! A run validates its inputs, simplifies the request, checks the cache, then fans the grid
//! out to a worker pool in Morton-ordered batches. Each worker returns an immutable list of
//! `(flat index, signal)` pairs; a single fan-in step writes them into the dense grid and
//! rejects any index written twice or never written. No worker touches shared state.
//!
//! Workers sample memory pressure every few batches. Under pressure they pause and drop a
//! share of the least valuable cached maps.

use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use super::grid::CoverageGrid;
use super::map::{CoverageMap, SignalStrength};
use crate::common::config::EngineConfig;
use crate::error::{CoverageError, Result};
use crate::geometry::{BoundingBox, Point3D, RoomModel};
use crate::optimizer::{
    AdaptiveCache, CacheKeyBuilder, CacheStats, EVICTION_FRACTION, MemoryMonitor, RequestPlan, morton_batches, plan_request, reduce_frequencies,
};
use crate::propagation::{EnvironmentProfile, FrequencyBand};
use crate::raytracer::{RFTransmitter, RayTracer, validate_transmitters};

/// Tolerance (m) before a room element counts as outside the room bounds.
const OUT_OF_BOUNDS_TOLERANCE_M: f64 = 0.5;

/// Batches between two memory-pressure samples.
const MEMORY_CHECK_INTERVAL: usize = 8;

/// Shared flag a caller sets to abort a running computation.
///
/// Workers check it before each batch; a cancelled run returns [`CoverageError::Cancelled`]
/// and discards everything computed so far.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct CoverageEngine {
    config: EngineConfig,
    profile: EnvironmentProfile,
    pool: rayon::ThreadPool,
    cache: AdaptiveCache<Arc<CoverageMap>>,
    memory: MemoryMonitor,
    /// Grid points traced since construction; cache hits add nothing.
    points_evaluated: AtomicU64,
}

impl CoverageEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("coverage-worker-{}", i));
        if let Some(threads) = config.concurrency.worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| CoverageError::InvalidConfiguration(format!("Failed to start worker pool: {}", e)))?;
        info!(
            "Coverage engine ready: {} workers, batch size {}, cache {:?}{}",
            pool.current_num_threads(),
            config.concurrency.batch_size,
            config.cache.strategy,
            if config.cache.enabled { "" } else { " (disabled)" }
        );
        Ok(Self {
            profile: config.environment.profile(),
            cache: AdaptiveCache::new(config.cache.strategy),
            memory: MemoryMonitor::new(&config.memory),
            points_evaluated: AtomicU64::new(0),
            pool,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn profile(&self) -> &EnvironmentProfile {
        &self.profile
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn points_evaluated(&self) -> u64 {
        self.points_evaluated.load(Ordering::Relaxed)
    }

    pub fn memory_pressure_events(&self) -> u64 {
        self.memory.pressure_events()
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Tracer configured with this engine's settings.
    pub fn tracer<'a>(&'a self, room: &'a RoomModel) -> RayTracer<'a> {
        RayTracer::new(room, &self.config.ray_tracing, &self.profile)
            .with_multi_floor(self.config.multi_floor.as_ref())
            .with_conditions(Some(&self.config.environment.conditions))
    }

    /// Coverage map of `room` for `transmitters` at `frequencies_mhz`.
    ///
    /// Identical inputs return the cached map unchanged.
    pub fn calculate_coverage(&self, room: &RoomModel, transmitters: &[RFTransmitter], frequencies_mhz: &[f64]) -> Result<Arc<CoverageMap>> {
        self.calculate_coverage_with_cancel(room, transmitters, frequencies_mhz, &CancellationToken::new())
    }

    pub fn calculate_coverage_with_cancel(
        &self,
        room: &RoomModel,
        transmitters: &[RFTransmitter],
        frequencies_mhz: &[f64],
        cancel: &CancellationToken,
    ) -> Result<Arc<CoverageMap>> {
        room.validate()?;
        validate_transmitters(transmitters)?;
        let plan = plan_request(room, frequencies_mhz, &self.config.grid)?;
        self.warn_out_of_bounds(room);

        let key = coverage_cache_key(room, transmitters, &plan);
        if self.config.cache.enabled {
            if let Some(hit) = self.cache.get(&key) {
                debug!("Coverage cache hit for room {} ({} transmitters)", room.id, transmitters.len());
                return Ok(hit);
            }
            debug!("Coverage cache miss for room {}", room.id);
        }

        let grid = CoverageGrid::for_room(room, plan.resolution_m, plan.vertical_resolution_m, self.config.grid.max_points)?;
        let map = Arc::new(self.evaluate_grid(room, transmitters, &plan.frequencies_mhz, &grid, cancel)?);
        if self.config.cache.enabled {
            self.cache.insert(key, Arc::clone(&map));
        }
        Ok(map)
    }

    /// Signal at one location, evaluated as a one-cell grid.
    pub fn calculate_point(&self, room: &RoomModel, transmitters: &[RFTransmitter], frequencies_mhz: &[f64], location: Point3D) -> Result<SignalStrength> {
        room.validate()?;
        validate_transmitters(transmitters)?;
        let frequencies = reduce_frequencies(frequencies_mhz)?;
        let grid = CoverageGrid::single_point(location, self.config.grid.resolution_m, self.config.grid.vertical_resolution_m)?;
        let map = self.evaluate_grid(room, transmitters, &frequencies, &grid, &CancellationToken::new())?;
        map.get(0)
            .cloned()
            .ok_or_else(|| CoverageError::CalculationFailed(format!("No signal computed at {:?}", location)))
    }

    /// Evaluates every active cell of `grid` exactly once.
    pub fn evaluate_grid(
        &self,
        room: &RoomModel,
        transmitters: &[RFTransmitter],
        frequencies_mhz: &[f64],
        grid: &CoverageGrid,
        cancel: &CancellationToken,
    ) -> Result<CoverageMap> {
        let items: Vec<(usize, (usize, usize, usize))> = grid.active_indices().map(|i| (i, grid.spec.coords(i))).collect();
        if items.is_empty() {
            return Err(CoverageError::CalculationFailed(format!("No grid points to evaluate in room {}", room.id)));
        }
        let batches = morton_batches(&items, self.config.concurrency.batch_size);
        let started = Instant::now();
        info!(
            "Evaluating {} points in {} batches ({} transmitters, {} frequencies)",
            items.len(),
            batches.len(),
            transmitters.len(),
            frequencies_mhz.len()
        );

        let tracer = self.tracer(room);
        let batch_results: Result<Vec<Vec<(usize, SignalStrength)>>> = self.pool.install(|| {
            batches
                .par_iter()
                .map(|batch| {
                    if cancel.is_cancelled() {
                        return Err(CoverageError::Cancelled);
                    }
                    if batch.id % MEMORY_CHECK_INTERVAL == 0 && self.memory.backoff_if_needed() {
                        self.relieve_memory_pressure();
                    }
                    Ok(batch
                        .indices
                        .iter()
                        .map(|&i| {
                            self.points_evaluated.fetch_add(1, Ordering::Relaxed);
                            (i, evaluate_point(&tracer, transmitters, frequencies_mhz, grid.point(i)))
                        })
                        .collect())
                })
                .collect()
        });
        let batch_results = batch_results?;
        if cancel.is_cancelled() {
            return Err(CoverageError::Cancelled);
        }

        let cells = assemble_cells(grid, batch_results.into_iter().flatten())?;
        info!("Coverage for room {} done: {} points in {:?}", room.id, items.len(), started.elapsed());
        CoverageMap::from_cells(room.id.clone(), grid.spec.clone(), frequencies_mhz.to_vec(), cells)
    }

    fn relieve_memory_pressure(&self) {
        let dropped = self.cache.shrink(EVICTION_FRACTION);
        if dropped > 0 {
            warn!("Memory pressure: dropped {} cached coverage maps, {} remain", dropped, self.cache.len());
        }
    }

    fn warn_out_of_bounds(&self, room: &RoomModel) {
        let outside = room.out_of_bounds_elements(OUT_OF_BOUNDS_TOLERANCE_M);
        if !outside.is_empty() {
            warn!("Room {}: {} elements lie outside the room bounds: {:?}", room.id, outside.len(), outside);
        }
    }
}

/// Fan-in: the only place cells are written.
///
/// Every active cell of `grid` must arrive exactly once; an inactive or out-of-range index,
/// a repeated index or a missing cell fails the whole run.
fn assemble_cells(grid: &CoverageGrid, results: impl IntoIterator<Item = (usize, SignalStrength)>) -> Result<Vec<Option<SignalStrength>>> {
    let expected = grid.active_count();
    let mut cells: Vec<Option<SignalStrength>> = vec![None; grid.spec.cell_count()];
    let mut written = 0usize;
    for (index, signal) in results {
        if !grid.is_active(index) {
            return Err(CoverageError::CalculationFailed(format!("Batch returned inactive grid index {}", index)));
        }
        if cells[index].replace(signal).is_some() {
            return Err(CoverageError::CalculationFailed(format!("Grid index {} computed twice", index)));
        }
        written += 1;
    }
    if written != expected {
        return Err(CoverageError::CalculationFailed(format!("{} of {} grid points missing after aggregation", expected - written, expected)));
    }
    Ok(cells)
}

/// Per band, the strongest transmitter wins (a client associates with its best AP).
/// Each transmitter's contribution is its multipath-combined power, or the direct-path
/// estimate when no path clears the threshold.
pub fn evaluate_point(tracer: &RayTracer<'_>, transmitters: &[RFTransmitter], frequencies_mhz: &[f64], point: Point3D) -> SignalStrength {
    let mut rssi_by_band: BTreeMap<FrequencyBand, f64> = BTreeMap::new();
    for &frequency in frequencies_mhz {
        let band = FrequencyBand::from_frequency(frequency);
        let best = transmitters
            .iter()
            .filter(|tx| tx.serves(band))
            .filter_map(|tx| {
                let result = tracer.trace(tx, frequency, &point);
                if result.is_empty() { tracer.direct_estimate(tx, frequency, &point) } else { Some(result.combined_power_dbm) }
            })
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p))));
        if let Some(rssi) = best {
            rssi_by_band
                .entry(band)
                .and_modify(|existing| *existing = existing.max(rssi))
                .or_insert(rssi);
        }
    }
    SignalStrength::new(point, rssi_by_band)
}

fn push_point(key: &mut CacheKeyBuilder, p: &Point3D) {
    key.push_f64(p.x).push_f64(p.y).push_f64(p.z);
}

fn push_bounds(key: &mut CacheKeyBuilder, b: &BoundingBox) {
    push_point(key, &b.min);
    push_point(key, &b.max);
}

/// Feeds room geometry and transmitter setup into `key`.
pub fn push_scene(key: &mut CacheKeyBuilder, room: &RoomModel, transmitters: &[RFTransmitter]) {
    key.push_str(&room.id);
    push_bounds(key, &room.bounds);

    key.push_u64(room.walls.len() as u64);
    for wall in &room.walls {
        key.push_str(&wall.id);
        push_point(key, &wall.start);
        push_point(key, &wall.end);
        key.push_f64(wall.height).push_f64(wall.thickness).push_str(&format!("{:?}", wall.material));
    }
    key.push_u64(room.furniture.len() as u64);
    for item in &room.furniture {
        key.push_str(&item.id).push_str(&format!("{:?}", item.kind)).push_f64(item.confidence);
        push_bounds(key, &item.bounds);
    }
    key.push_u64(room.openings.len() as u64);
    for opening in &room.openings {
        key.push_str(&opening.id).push_str(&format!("{:?}", opening.kind)).push_str(opening.wall_id.as_deref().unwrap_or(""));
        push_bounds(key, &opening.bounds);
    }
    key.push_f64(room.floor.storey_height).push_str(&format!("{:?}", room.floor.construction));
    key.push_u64(room.floor.outline.len() as u64);
    for p in &room.floor.outline {
        key.push_f64(p.x).push_f64(p.y);
    }

    key.push_u64(transmitters.len() as u64);
    for tx in transmitters {
        key.push_str(&tx.id).push_str(&format!("{:?}/{:?}", tx.kind, tx.pattern));
        push_point(key, &tx.location);
        key.push_u64(tx.bands.len() as u64);
        for (band, config) in &tx.bands {
            key.push_str(band.label()).push_f64(config.tx_power_dbm).push_f64(config.antenna_gain_dbi);
        }
    }
}

/// Deterministic key over everything that changes a coverage result: room geometry,
/// transmitters, reduced frequencies and grid resolution.
pub fn coverage_cache_key(room: &RoomModel, transmitters: &[RFTransmitter], plan: &RequestPlan) -> String {
    let mut key = CacheKeyBuilder::new("coverage/v1");
    push_scene(&mut key, room, transmitters);
    key.push_u64(plan.frequencies_mhz.len() as u64);
    for f in &plan.frequencies_mhz {
        key.push_f64(*f);
    }
    key.push_f64(plan.resolution_m).push_f64(plan.vertical_resolution_m);
    key.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{FloorConstruction, FloorDescription, Point2D, WallElement, WallMaterial};
    use crate::raytracer::DeviceKind;

    fn room() -> RoomModel {
        RoomModel {
            id: "studio".into(),
            bounds: BoundingBox::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(6.0, 4.0, 3.0)),
            walls: vec![WallElement::new("mid", Point3D::new(3.0, 0.0, 0.0), Point3D::new(3.0, 2.5, 0.0), 3.0, 0.15, WallMaterial::Brick).unwrap()],
            furniture: Vec::new(),
            openings: Vec::new(),
            floor: FloorDescription::default(),
        }
    }

    fn engine(batch_size: usize, threads: usize) -> CoverageEngine {
        let mut config = EngineConfig::default();
        config.concurrency.batch_size = batch_size;
        config.concurrency.worker_threads = Some(threads);
        config.grid.resolution_m = 1.0;
        config.ray_tracing.enable_double_reflections = false;
        config.memory.enabled = false;
        CoverageEngine::new(config).unwrap()
    }

    fn router() -> RFTransmitter {
        RFTransmitter::standard("ap", DeviceKind::Router, Point3D::new(1.0, 1.0, 1.5))
    }

    #[test]
    fn every_active_cell_exactly_once() {
        let engine = engine(5, 3);
        let map = engine.calculate_coverage(&room(), &[router()], &[2412.0, 5180.0]).unwrap();
        let grid = CoverageGrid::for_room(&room(), 1.0, 1.0, usize::MAX).unwrap();
        assert_eq!(map.len(), grid.active_count());
        assert_eq!(map.len(), 6 * 4 * 3);
        for (i, signal) in map.iter() {
            assert_eq!(signal.location, grid.point(i));
            assert_eq!(signal.rssi_by_band.len(), 2);
        }
    }

    #[test]
    fn cache_returns_same_map() {
        let engine = engine(16, 2);
        let a = engine.calculate_coverage(&room(), &[router()], &[5180.0]).unwrap();
        let b = engine.calculate_coverage(&room(), &[router()], &[5500.0]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let stats = engine.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn cancelled_run_returns_no_map() {
        let engine = engine(4, 2);
        let token = CancellationToken::new();
        token.cancel();
        let result = engine.calculate_coverage_with_cancel(&room(), &[router()], &[2412.0], &token);
        assert!(matches!(result, Err(CoverageError::Cancelled)));
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[test]
    fn invalid_inputs_are_recoverable_errors() {
        let engine = engine(4, 1);
        let mut empty = room();
        empty.walls.clear();
        let err = engine.calculate_coverage(&empty, &[router()], &[2412.0]).unwrap_err();
        assert!(matches!(err, CoverageError::InsufficientData(_)) && err.is_recoverable());
        let err = engine.calculate_coverage(&room(), &[], &[2412.0]).unwrap_err();
        assert!(matches!(err, CoverageError::CalculationFailed(_)));
        let err = engine.calculate_coverage(&room(), &[router()], &[-1.0]).unwrap_err();
        assert!(matches!(err, CoverageError::InvalidConfiguration(_)));
    }

    #[test]
    fn point_matches_grid_cell() {
        let engine = engine(8, 2);
        let map = engine.calculate_coverage(&room(), &[router()], &[5180.0]).unwrap();
        let (index, cell) = map.iter().nth(10).unwrap();
        let point = engine.calculate_point(&room(), &[router()], &[5180.0], map.grid.point(index)).unwrap();
        assert_eq!(point.rssi_by_band, cell.rssi_by_band);
    }

    fn half_room_grid() -> CoverageGrid {
        let mut half = room();
        half.floor.outline = vec![Point2D::new(0.0, 0.0), Point2D::new(3.0, 0.0), Point2D::new(3.0, 4.0), Point2D::new(0.0, 4.0)];
        CoverageGrid::for_room(&half, 1.0, 1.0, usize::MAX).unwrap()
    }

    fn blank(grid: &CoverageGrid, index: usize) -> (usize, SignalStrength) {
        (index, SignalStrength::new(grid.point(index), BTreeMap::new()))
    }

    #[test]
    fn fan_in_fills_every_active_cell() {
        let grid = half_room_grid();
        assert_eq!(grid.active_count(), 3 * 4 * 3);
        let cells = assemble_cells(&grid, grid.active_indices().map(|i| blank(&grid, i))).unwrap();
        assert_eq!(cells.len(), grid.spec.cell_count());
        for (i, cell) in cells.iter().enumerate() {
            assert_eq!(cell.is_some(), grid.is_active(i));
        }
    }

    #[test]
    fn fan_in_rejects_duplicate_index() {
        let grid = half_room_grid();
        let first = grid.active_indices().next().unwrap();
        let results = grid.active_indices().map(|i| blank(&grid, i)).chain(std::iter::once(blank(&grid, first)));
        let err = assemble_cells(&grid, results).unwrap_err();
        assert!(matches!(&err, CoverageError::CalculationFailed(m) if m.contains("twice")), "{}", err);
    }

    #[test]
    fn fan_in_rejects_inactive_and_out_of_range_index() {
        let grid = half_room_grid();
        let inactive = (0..grid.spec.cell_count()).find(|&i| !grid.is_active(i)).unwrap();
        for stray in [inactive, grid.spec.cell_count()] {
            let results = grid.active_indices().map(|i| blank(&grid, i)).chain(std::iter::once((stray, SignalStrength::new(Point3D::default(), BTreeMap::new()))));
            let err = assemble_cells(&grid, results).unwrap_err();
            assert!(matches!(&err, CoverageError::CalculationFailed(m) if m.contains("inactive")), "{}", err);
        }
    }

    #[test]
    fn fan_in_rejects_missing_cells() {
        let grid = half_room_grid();
        let err = assemble_cells(&grid, grid.active_indices().skip(1).map(|i| blank(&grid, i))).unwrap_err();
        assert!(matches!(&err, CoverageError::CalculationFailed(m) if m.contains("1 of 36")), "{}", err);
    }

    #[test]
    fn each_point_traced_once_per_run() {
        let engine = engine(7, 3);
        let grid = CoverageGrid::for_room(&room(), 1.0, 1.0, usize::MAX).unwrap();
        engine.calculate_coverage(&room(), &[router()], &[2412.0]).unwrap();
        assert_eq!(engine.points_evaluated(), grid.active_count() as u64);
        // Cache hit traces nothing
        engine.calculate_coverage(&room(), &[router()], &[2412.0]).unwrap();
        assert_eq!(engine.points_evaluated(), grid.active_count() as u64);
    }

    #[test]
    fn memory_pressure_drops_cached_maps() {
        let mut config = EngineConfig::default();
        config.grid.resolution_m = 1.0;
        config.concurrency.worker_threads = Some(1);
        config.memory.enabled = true;
        config.memory.threshold_mb = 0;
        config.memory.backoff_ms = 0;
        let engine = CoverageEngine::new(config).unwrap();

        let first = router();
        let mut second = router();
        second.location.x = 2.0;
        engine.calculate_coverage(&room(), &[first], &[2412.0]).unwrap();
        engine.calculate_coverage(&room(), &[second], &[2412.0]).unwrap();

        // Only platforms that report resident memory can be under pressure
        let pressured = engine.memory_pressure_events() > 0;
        assert_eq!(engine.cache_stats().evictions > 0, pressured);
        assert_eq!(engine.cache_stats().entries, if pressured { 1 } else { 2 });
    }

    #[test]
    fn cache_key_changes_with_inputs() {
        let plan = RequestPlan {
            frequencies_mhz: vec![5000.0],
            resolution_m: 0.5,
            vertical_resolution_m: 1.0,
        };
        let base = coverage_cache_key(&room(), &[router()], &plan);
        assert_eq!(base, coverage_cache_key(&room(), &[router()], &plan));
        let mut moved = router();
        moved.location.x += 0.01;
        assert_ne!(base, coverage_cache_key(&room(), &[moved], &plan));
        let mut thicker = room();
        thicker.walls[0].thickness = 0.2;
        assert_ne!(base, coverage_cache_key(&thicker, &[router()], &plan));
        let finer = RequestPlan { resolution_m: 0.25, ..plan.clone() };
        assert_ne!(base, coverage_cache_key(&room(), &[router()], &finer));
        let mut steel = room();
        steel.floor.construction = Some(FloorConstruction::SteelConcrete);
        assert_ne!(base, coverage_cache_key(&steel, &[router()], &plan));
        let mut taller = room();
        taller.floor.storey_height = 3.5;
        assert_ne!(base, coverage_cache_key(&taller, &[router()], &plan));
    }
}
