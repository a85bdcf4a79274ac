//! Per-point signal values and the coverage map that holds them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::grid::GridSpec;
use crate::error::{CoverageError, Result};
use crate::geometry::Point3D;
use crate::propagation::{FrequencyBand, combine_powers_dbm};

/// Realistic RSSI floor and ceiling; every stored value is clamped into this range.
pub const MIN_RSSI_DBM: f64 = -120.0;
pub const MAX_RSSI_DBM: f64 = -20.0;

/// Qualitative signal tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    NoSignal,
}

impl SignalQuality {
    pub const ALL: [SignalQuality; 5] = [
        SignalQuality::Excellent,
        SignalQuality::Good,
        SignalQuality::Fair,
        SignalQuality::Poor,
        SignalQuality::NoSignal,
    ];

    pub fn from_rssi(rssi_dbm: f64) -> Self {
        if rssi_dbm >= -50.0 {
            SignalQuality::Excellent
        } else if rssi_dbm >= -60.0 {
            SignalQuality::Good
        } else if rssi_dbm >= -70.0 {
            SignalQuality::Fair
        } else if rssi_dbm >= -80.0 {
            SignalQuality::Poor
        } else {
            SignalQuality::NoSignal
        }
    }
}

pub fn clamp_rssi(rssi_dbm: f64) -> f64 {
    if rssi_dbm.is_nan() { MIN_RSSI_DBM } else { rssi_dbm.clamp(MIN_RSSI_DBM, MAX_RSSI_DBM) }
}

/// Signal at one location across the requested bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStrength {
    pub location: Point3D,
    pub rssi_by_band: BTreeMap<FrequencyBand, f64>,
    /// Band with the strongest RSSI; the lower band wins ties.
    pub dominant_band: Option<FrequencyBand>,
    pub quality: SignalQuality,
}

impl SignalStrength {
    /// Clamps every value and derives the dominant band and quality tier.
    pub fn new(location: Point3D, rssi_by_band: BTreeMap<FrequencyBand, f64>) -> Self {
        let rssi_by_band: BTreeMap<FrequencyBand, f64> = rssi_by_band.into_iter().map(|(band, rssi)| (band, clamp_rssi(rssi))).collect();
        let mut dominant: Option<(FrequencyBand, f64)> = None;
        for (&band, &rssi) in &rssi_by_band {
            if dominant.is_none_or(|(_, best)| rssi > best) {
                dominant = Some((band, rssi));
            }
        }
        let quality = SignalQuality::from_rssi(dominant.map(|(_, r)| r).unwrap_or(MIN_RSSI_DBM));
        Self {
            location,
            rssi_by_band,
            dominant_band: dominant.map(|(b, _)| b),
            quality,
        }
    }

    pub fn rssi(&self, band: FrequencyBand) -> Option<f64> {
        self.rssi_by_band.get(&band).copied()
    }

    /// RSSI of the dominant band, or the floor when no band has a value.
    pub fn best_rssi(&self) -> f64 {
        self.dominant_band.and_then(|b| self.rssi(b)).unwrap_or(MIN_RSSI_DBM)
    }

    /// Per-band linear-power sum of two signals at the same location.
    pub fn combine(&self, other: &SignalStrength) -> SignalStrength {
        let mut merged = self.rssi_by_band.clone();
        for (&band, &rssi) in &other.rssi_by_band {
            merged
                .entry(band)
                .and_modify(|existing| *existing = combine_powers_dbm([*existing, rssi]))
                .or_insert(rssi);
        }
        SignalStrength::new(self.location, merged)
    }
}

/// Statistics for one band over a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandStatistics {
    pub point_count: usize,
    pub mean_rssi_dbm: f64,
    pub min_rssi_dbm: f64,
    pub max_rssi_dbm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageStatistics {
    pub point_count: usize,
    pub mean_best_rssi_dbm: f64,
    pub per_band: BTreeMap<FrequencyBand, BandStatistics>,
    /// Share of points in each tier (percent).
    pub quality_percent: BTreeMap<SignalQuality, f64>,
}

/// Signal over a grid. Every evaluated cell holds exactly one value; cells outside the room
/// hold none. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageMap {
    pub room_id: String,
    pub grid: GridSpec,
    pub frequencies_mhz: Vec<f64>,
    pub computed_at: DateTime<Utc>,
    cells: Vec<Option<SignalStrength>>,
}

impl CoverageMap {
    /// `cells` must have one slot per grid cell.
    pub fn from_cells(room_id: impl Into<String>, grid: GridSpec, frequencies_mhz: Vec<f64>, cells: Vec<Option<SignalStrength>>) -> Result<Self> {
        if cells.len() != grid.cell_count() {
            return Err(CoverageError::CalculationFailed(format!(
                "Coverage map has {} cells, grid expects {}",
                cells.len(),
                grid.cell_count()
            )));
        }
        Ok(Self {
            room_id: room_id.into(),
            grid,
            frequencies_mhz,
            computed_at: Utc::now(),
            cells,
        })
    }

    /// Number of evaluated points.
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, flat: usize) -> Option<&SignalStrength> {
        self.cells.get(flat).and_then(Option::as_ref)
    }

    /// Value at the grid cell nearest to `p`.
    pub fn at(&self, p: &Point3D) -> Option<&SignalStrength> {
        self.grid.index_of(p).and_then(|i| self.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &SignalStrength)> {
        self.cells.iter().enumerate().filter_map(|(i, c)| c.as_ref().map(|s| (i, s)))
    }

    /// Merges two maps of the same grid in linear power. A cell present in only one map keeps
    /// that map's value.
    pub fn combine(&self, other: &CoverageMap) -> Result<CoverageMap> {
        if self.grid != other.grid {
            return Err(CoverageError::InvalidConfiguration("Cannot combine coverage maps computed on different grids".into()));
        }
        let cells = self
            .cells
            .iter()
            .zip(&other.cells)
            .map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Some(a.combine(b)),
                (Some(a), None) => Some(a.clone()),
                (None, Some(b)) => Some(b.clone()),
                (None, None) => None,
            })
            .collect();
        let mut frequencies = self.frequencies_mhz.clone();
        for f in &other.frequencies_mhz {
            if !frequencies.contains(f) {
                frequencies.push(*f);
            }
        }
        CoverageMap::from_cells(self.room_id.clone(), self.grid.clone(), frequencies, cells)
    }

    /// Share of points whose best RSSI is at or above `threshold_dbm` (percent).
    pub fn percent_above(&self, threshold_dbm: f64) -> f64 {
        let total = self.len();
        if total == 0 {
            return 0.0;
        }
        let covered = self.iter().filter(|(_, s)| s.best_rssi() >= threshold_dbm).count();
        covered as f64 / total as f64 * 100.0
    }

    /// Same as [`percent_above`](Self::percent_above) but for a single band.
    pub fn percent_above_in_band(&self, band: FrequencyBand, threshold_dbm: f64) -> f64 {
        let values: Vec<f64> = self.iter().filter_map(|(_, s)| s.rssi(band)).collect();
        if values.is_empty() {
            return 0.0;
        }
        values.iter().filter(|r| **r >= threshold_dbm).count() as f64 / values.len() as f64 * 100.0
    }

    /// Floor area above `threshold_dbm`.
    pub fn covered_area_m2(&self, threshold_dbm: f64, floor_area_m2: f64) -> f64 {
        self.percent_above(threshold_dbm) / 100.0 * floor_area_m2
    }

    pub fn statistics(&self) -> CoverageStatistics {
        let point_count = self.len();
        let mut per_band: BTreeMap<FrequencyBand, Vec<f64>> = BTreeMap::new();
        let mut quality_counts: BTreeMap<SignalQuality, usize> = BTreeMap::new();
        let mut best_sum = 0.0;
        for (_, signal) in self.iter() {
            for (&band, &rssi) in &signal.rssi_by_band {
                per_band.entry(band).or_default().push(rssi);
            }
            *quality_counts.entry(signal.quality).or_default() += 1;
            best_sum += signal.best_rssi();
        }

        let per_band = per_band
            .into_iter()
            .map(|(band, values)| {
                let stats = BandStatistics {
                    point_count: values.len(),
                    mean_rssi_dbm: values.iter().sum::<f64>() / values.len() as f64,
                    min_rssi_dbm: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max_rssi_dbm: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                };
                (band, stats)
            })
            .collect();
        let quality_percent = SignalQuality::ALL
            .iter()
            .map(|q| {
                let count = quality_counts.get(q).copied().unwrap_or(0);
                let percent = if point_count == 0 { 0.0 } else { count as f64 / point_count as f64 * 100.0 };
                (*q, percent)
            })
            .collect();

        CoverageStatistics {
            point_count,
            mean_best_rssi_dbm: if point_count == 0 { MIN_RSSI_DBM } else { best_sum / point_count as f64 },
            per_band,
            quality_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use approx::assert_abs_diff_eq;

    fn signal(rssi_24: f64, rssi_5: f64) -> SignalStrength {
        let mut m = BTreeMap::new();
        m.insert(FrequencyBand::Band2_4GHz, rssi_24);
        m.insert(FrequencyBand::Band5GHz, rssi_5);
        SignalStrength::new(Point3D::new(0.0, 0.0, 1.0), m)
    }

    fn map_of(values: &[f64]) -> CoverageMap {
        let spec = GridSpec::new(
            BoundingBox::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(values.len() as f64, 1.0, 1.0)),
            1.0,
            1.0,
        )
        .unwrap();
        let cells = values.iter().map(|v| Some(signal(*v, *v - 5.0))).collect();
        CoverageMap::from_cells("r", spec, vec![2400.0, 5000.0], cells).unwrap()
    }

    #[test]
    fn quality_tiers() {
        assert_eq!(SignalQuality::from_rssi(-45.0), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(-50.0), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(-60.0), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(-69.9), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(-80.0), SignalQuality::Poor);
        assert_eq!(SignalQuality::from_rssi(-80.1), SignalQuality::NoSignal);
    }

    #[test]
    fn signal_strength_clamps_and_picks_dominant() {
        let s = signal(-10.0, -150.0);
        assert_eq!(s.rssi(FrequencyBand::Band2_4GHz), Some(MAX_RSSI_DBM));
        assert_eq!(s.rssi(FrequencyBand::Band5GHz), Some(MIN_RSSI_DBM));
        assert_eq!(s.dominant_band, Some(FrequencyBand::Band2_4GHz));
        assert_eq!(s.quality, SignalQuality::Excellent);

        let tie = signal(-60.0, -60.0);
        assert_eq!(tie.dominant_band, Some(FrequencyBand::Band2_4GHz));

        let empty = SignalStrength::new(Point3D::new(0.0, 0.0, 0.0), BTreeMap::new());
        assert_eq!(empty.dominant_band, None);
        assert_eq!(empty.best_rssi(), MIN_RSSI_DBM);
        assert_eq!(empty.quality, SignalQuality::NoSignal);
    }

    #[test]
    fn combine_is_linear_not_db_average() {
        let a = signal(-70.0, -70.0);
        let b = signal(-70.0, -80.0);
        let c = a.combine(&b);
        assert_abs_diff_eq!(c.rssi(FrequencyBand::Band2_4GHz).unwrap(), -70.0 + 10.0 * 2f64.log10(), epsilon = 1e-9);
        let expected = combine_powers_dbm([-70.0, -80.0]);
        assert_abs_diff_eq!(c.rssi(FrequencyBand::Band5GHz).unwrap(), expected, epsilon = 1e-9);
        assert!(c.rssi(FrequencyBand::Band5GHz).unwrap() > -70.0);
    }

    #[test]
    fn map_combination_requires_same_grid() {
        let a = map_of(&[-60.0, -75.0, -90.0]);
        let b = map_of(&[-80.0, -65.0, -90.0]);
        let c = a.combine(&b).unwrap();
        assert_eq!(c.len(), 3);
        for ((_, sa), (_, sc)) in a.iter().zip(c.iter()) {
            assert!(sc.best_rssi() >= sa.best_rssi());
        }
        let other = map_of(&[-60.0, -60.0]);
        assert!(matches!(a.combine(&other), Err(CoverageError::InvalidConfiguration(_))));
    }

    #[test]
    fn percentages_and_statistics() {
        let map = map_of(&[-55.0, -65.0, -75.0, -85.0]);
        assert_abs_diff_eq!(map.percent_above(-70.0), 50.0);
        assert_abs_diff_eq!(map.percent_above_in_band(FrequencyBand::Band5GHz, -70.0), 50.0);
        assert_abs_diff_eq!(map.covered_area_m2(-70.0, 40.0), 20.0);
        let stats = map.statistics();
        assert_eq!(stats.point_count, 4);
        assert_abs_diff_eq!(stats.mean_best_rssi_dbm, -70.0);
        let band = &stats.per_band[&FrequencyBand::Band5GHz];
        assert_abs_diff_eq!(band.min_rssi_dbm, -90.0);
        assert_abs_diff_eq!(band.max_rssi_dbm, -60.0);
        assert_abs_diff_eq!(stats.quality_percent[&SignalQuality::Good], 25.0);
        assert_abs_diff_eq!(stats.quality_percent.values().sum::<f64>(), 100.0);
    }

    #[test]
    fn rejects_mismatched_cell_count() {
        let spec = GridSpec::new(BoundingBox::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(2.0, 1.0, 1.0)), 1.0, 1.0).unwrap();
        assert!(CoverageMap::from_cells("r", spec, vec![2400.0], vec![None]).is_err());
    }

    #[test]
    fn json_round_trip_preserves_values() {
        let map = map_of(&[-55.123456789, -65.0]);
        let json = serde_json::to_string(&map).unwrap();
        let back: CoverageMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
