//! Improvement analysis between two maps and blending of measured samples into a map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::map::{CoverageMap, SignalStrength};
use crate::error::Result;
use crate::geometry::Point3D;
use crate::propagation::FrequencyBand;

/// RSSI cutoffs reported by [`analyze_improvement`].
pub const IMPROVEMENT_THRESHOLDS_DBM: [f64; 3] = [-70.0, -65.0, -60.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdImprovement {
    pub threshold_dbm: f64,
    pub baseline_percent: f64,
    pub improved_percent: f64,
    /// Percentage points gained.
    pub absolute_improvement: f64,
    /// `improved / baseline`; `None` when the baseline covers nothing.
    pub relative_improvement: Option<f64>,
    /// Floor area newly above the threshold (m²).
    pub newly_served_area_m2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageImprovement {
    pub floor_area_m2: f64,
    pub thresholds: Vec<ThresholdImprovement>,
    pub baseline_mean_rssi_dbm: f64,
    pub improved_mean_rssi_dbm: f64,
}

impl CoverageImprovement {
    /// Entry for the −70 dBm threshold, the usual definition of "covered".
    pub fn primary(&self) -> Option<&ThresholdImprovement> {
        self.thresholds.iter().find(|t| t.threshold_dbm == IMPROVEMENT_THRESHOLDS_DBM[0])
    }
}

pub fn analyze_improvement(baseline: &CoverageMap, improved: &CoverageMap, floor_area_m2: f64) -> CoverageImprovement {
    let thresholds = IMPROVEMENT_THRESHOLDS_DBM
        .iter()
        .map(|&threshold| {
            let before = baseline.percent_above(threshold);
            let after = improved.percent_above(threshold);
            let gained = after - before;
            ThresholdImprovement {
                threshold_dbm: threshold,
                baseline_percent: before,
                improved_percent: after,
                absolute_improvement: gained,
                relative_improvement: if before > 0.0 { Some(after / before) } else { None },
                newly_served_area_m2: (gained / 100.0 * floor_area_m2).max(0.0),
            }
        })
        .collect();
    CoverageImprovement {
        floor_area_m2,
        thresholds,
        baseline_mean_rssi_dbm: baseline.statistics().mean_best_rssi_dbm,
        improved_mean_rssi_dbm: improved.statistics().mean_best_rssi_dbm,
    }
}

/// A measured WiFi sample from the measurement collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredSample {
    pub location: Point3D,
    pub rssi_by_band: BTreeMap<FrequencyBand, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendSettings {
    /// Samples farther than this (horizontal distance) do not affect a point.
    pub influence_radius_m: f64,
    /// Weight of the measured value inside the radius; the prediction gets the rest.
    pub measured_weight: f64,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            influence_radius_m: 3.0,
            measured_weight: 0.7,
        }
    }
}

/// Inverse-distance-squared weights never use a distance below this.
const MIN_BLEND_DISTANCE_M: f64 = 0.1;

/// Inverse-distance-weighted measured RSSI around `location` for `band`, if any sample is in range.
fn measured_rssi(location: &Point3D, band: FrequencyBand, samples: &[MeasuredSample], radius: f64) -> Option<f64> {
    let mut weight_sum = 0.0;
    let mut value_sum = 0.0;
    for sample in samples {
        let Some(&rssi) = sample.rssi_by_band.get(&band) else {
            continue;
        };
        if !rssi.is_finite() {
            continue;
        }
        let d = location.horizontal_distance_to(&sample.location);
        if d > radius {
            continue;
        }
        let w = 1.0 / d.max(MIN_BLEND_DISTANCE_M).powi(2);
        weight_sum += w;
        value_sum += w * rssi;
    }
    if weight_sum > 0.0 { Some(value_sum / weight_sum) } else { None }
}

/// Corrects a predicted map with measured samples. Points with no sample in range keep
/// their predicted value.
pub fn blend_measurements(map: &CoverageMap, samples: &[MeasuredSample], settings: &BlendSettings) -> Result<CoverageMap> {
    let measured_weight = settings.measured_weight.clamp(0.0, 1.0);
    let cells = (0..map.grid.cell_count())
        .map(|i| {
            map.get(i).map(|signal| {
                let blended = signal
                    .rssi_by_band
                    .iter()
                    .map(|(&band, &predicted)| {
                        let value = match measured_rssi(&signal.location, band, samples, settings.influence_radius_m) {
                            Some(measured) => measured_weight * measured + (1.0 - measured_weight) * predicted,
                            None => predicted,
                        };
                        (band, value)
                    })
                    .collect();
                SignalStrength::new(signal.location, blended)
            })
        })
        .collect();
    CoverageMap::from_cells(map.room_id.clone(), map.grid.clone(), map.frequencies_mhz.clone(), cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::grid::GridSpec;
    use crate::geometry::BoundingBox;
    use approx::assert_abs_diff_eq;

    fn line_map(values: &[f64]) -> CoverageMap {
        let spec = GridSpec::new(
            BoundingBox::new(Point3D::new(0.0, 0.0, 0.0), Point3D::new(values.len() as f64, 1.0, 1.0)),
            1.0,
            1.0,
        )
        .unwrap();
        let cells = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut m = BTreeMap::new();
                m.insert(FrequencyBand::Band5GHz, *v);
                Some(SignalStrength::new(spec.point(i), m))
            })
            .collect();
        CoverageMap::from_cells("r", spec, vec![5000.0], cells).unwrap()
    }

    #[test]
    fn improvement_percentages_and_area() {
        let baseline = line_map(&[-55.0, -68.0, -72.0, -90.0]);
        let improved = line_map(&[-54.0, -62.0, -66.0, -75.0]);
        let analysis = analyze_improvement(&baseline, &improved, 40.0);
        let primary = analysis.primary().unwrap();
        assert_abs_diff_eq!(primary.baseline_percent, 50.0);
        assert_abs_diff_eq!(primary.improved_percent, 75.0);
        assert_abs_diff_eq!(primary.absolute_improvement, 25.0);
        assert_abs_diff_eq!(primary.relative_improvement.unwrap(), 1.5);
        assert_abs_diff_eq!(primary.newly_served_area_m2, 10.0);
        assert_eq!(analysis.thresholds.len(), 3);
        assert!(analysis.improved_mean_rssi_dbm > analysis.baseline_mean_rssi_dbm);
    }

    #[test]
    fn zero_baseline_has_no_ratio() {
        let baseline = line_map(&[-90.0, -95.0]);
        let improved = line_map(&[-60.0, -95.0]);
        let analysis = analyze_improvement(&baseline, &improved, 10.0);
        assert_eq!(analysis.primary().unwrap().relative_improvement, None);
    }

    #[test]
    fn blend_pulls_toward_measurement_inside_radius() {
        let map = line_map(&[-60.0, -60.0, -60.0, -60.0, -60.0, -60.0, -60.0, -60.0]);
        let mut rssi = BTreeMap::new();
        rssi.insert(FrequencyBand::Band5GHz, -80.0);
        let samples = vec![MeasuredSample {
            location: map.grid.point(0),
            rssi_by_band: rssi,
        }];
        let blended = blend_measurements(&map, &samples, &BlendSettings::default()).unwrap();
        // At the sample: 0.7 × -80 + 0.3 × -60
        assert_abs_diff_eq!(blended.get(0).unwrap().rssi(FrequencyBand::Band5GHz).unwrap(), -74.0, epsilon = 1e-9);
        // 7 m away: unchanged
        assert_abs_diff_eq!(blended.get(7).unwrap().rssi(FrequencyBand::Band5GHz).unwrap(), -60.0, epsilon = 1e-9);
        assert_eq!(blended.len(), map.len());
    }

    #[test]
    fn nearer_samples_weigh_more() {
        let map = line_map(&[-60.0, -60.0, -60.0, -60.0]);
        let sample = |x: f64, v: f64| {
            let mut rssi = BTreeMap::new();
            rssi.insert(FrequencyBand::Band5GHz, v);
            MeasuredSample {
                location: Point3D::new(x, 0.5, 0.5),
                rssi_by_band: rssi,
            }
        };
        // Cell 1 sits at x = 1.5: one sample 0.5 m away, one 1.5 m away
        let samples = vec![sample(1.0, -50.0), sample(3.0, -90.0)];
        let measured = measured_rssi(&map.grid.point(1), FrequencyBand::Band5GHz, &samples, 3.0).unwrap();
        let expected = (4.0 * -50.0 + (1.0 / 2.25) * -90.0) / (4.0 + 1.0 / 2.25);
        assert_abs_diff_eq!(measured, expected, epsilon = 1e-9);
        assert!(measured > -70.0);
    }
}
