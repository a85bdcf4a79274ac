//! Path-loss models.
//!
//! All functions are pure. Invalid inputs (non-positive distance or frequency) never produce
//! NaN or an error; they saturate to [`MAX_PATH_LOSS_DB`] so the affected path simply drops
//! below any receive threshold.
//!
//! Units: distance in meters, frequency in MHz, loss in dB, angles in radians.

use super::band::FrequencyBand;
use super::environment::EnvironmentProfile;
use crate::geometry::{FloorConstruction, WallMaterial};

/// Loss returned for physically meaningless inputs.
pub const MAX_PATH_LOSS_DB: f64 = 250.0;

/// Reference thickness for the per-material attenuation coefficients (10 cm).
const REFERENCE_THICKNESS_M: f64 = 0.1;

/// Incidence angles are clamped here so `1 / cos θ` stays finite at grazing incidence.
const MAX_INCIDENCE_ANGLE_RAD: f64 = 80.0 * std::f64::consts::PI / 180.0;

/// Reference frequency all frequency-dependent terms are normalized to.
const REFERENCE_FREQUENCY_MHZ: f64 = 2400.0;

/// Free-space path loss (Friis equation).
///
/// # Formula
///
/// ```text
/// FSPL(dB) = 20 × log₁₀(d) + 20 × log₁₀(f) − 27.55      (d in m, f in MHz)
/// ```
///
/// Strictly increasing in both distance and frequency. Returns [`MAX_PATH_LOSS_DB`] for
/// non-positive or non-finite inputs.
pub fn free_space_path_loss(distance_m: f64, frequency_mhz: f64) -> f64 {
    if !(distance_m > 0.0) || !(frequency_mhz > 0.0) || !distance_m.is_finite() || !frequency_mhz.is_finite() {
        return MAX_PATH_LOSS_DB;
    }
    20.0 * distance_m.log10() + 20.0 * frequency_mhz.log10() - 27.55
}

/// ITU-style indoor path loss.
///
/// # Formula
///
/// ```text
/// L = PL(d₀) + 10 × n × log₁₀(d) + 20 × log₁₀(f / 2400) + L_floor(k, f)
/// where d₀ = 1 m and PL(d₀) is the free-space loss at 1 m and 2.4 GHz
/// ```
///
/// - `n`: path loss exponent of the environment profile
/// - `L_floor`: floor penetration loss for `floors` separating floors, see [`floor_penetration_loss`]
///
/// Distances below the 1 m reference return the reference loss (plus frequency and floor terms).
pub fn itu_indoor_path_loss(distance_m: f64, frequency_mhz: f64, floors: u32, profile: &EnvironmentProfile) -> f64 {
    if !(distance_m > 0.0) || !(frequency_mhz > 0.0) {
        return MAX_PATH_LOSS_DB;
    }
    let reference = free_space_path_loss(1.0, REFERENCE_FREQUENCY_MHZ);
    let distance_term = 10.0 * profile.path_loss_exponent * distance_m.max(1.0).log10();
    let frequency_term = 20.0 * (frequency_mhz / REFERENCE_FREQUENCY_MHZ).log10();
    reference + distance_term + frequency_term + floor_penetration_loss(floors, frequency_mhz, profile.floor_construction)
}

/// Loss through `floors` floor slabs.
///
/// The first floor costs the full construction loss; each further floor adds 60 % of it.
/// The total is scaled per band (higher bands lose more).
pub fn floor_penetration_loss(floors: u32, frequency_mhz: f64, construction: FloorConstruction) -> f64 {
    if floors == 0 {
        return 0.0;
    }
    let base = match construction {
        FloorConstruction::WoodFrame => 10.0,
        FloorConstruction::Concrete => 15.0,
        FloorConstruction::SteelConcrete => 20.0,
    };
    let band_factor = match FrequencyBand::from_frequency(frequency_mhz) {
        FrequencyBand::Band2_4GHz => 1.0,
        FrequencyBand::Band5GHz => 1.2,
        FrequencyBand::Band6GHz => 1.35,
    };
    base * (1.0 + 0.6 * (floors - 1) as f64) * band_factor
}

/// Thickness multiplier for the per-10 cm coefficients: linear below 10 cm, logarithmic above.
fn thickness_multiplier(thickness_m: f64) -> f64 {
    let ratio = thickness_m / REFERENCE_THICKNESS_M;
    if ratio <= 1.0 { ratio } else { 1.0 + ratio.ln() }
}

/// Loss through one wall.
///
/// # Formula
///
/// ```text
/// L = max(L_min, a × m(t)) × (f / 2400)^k / cos(θ)
/// ```
///
/// - `a`: material coefficient (dB per 10 cm), `L_min`: material loss floor
/// - `m(t)`: thickness multiplier (linear up to 10 cm, `1 + ln(t / 10 cm)` above)
/// - `k`: material frequency exponent
/// - `θ`: incidence angle from the wall normal, clamped to 80°
///
/// A non-positive thickness means no wall and yields 0.
pub fn wall_penetration_loss(material: WallMaterial, thickness_m: f64, frequency_mhz: f64, incidence_angle_rad: f64) -> f64 {
    if !(thickness_m > 0.0) {
        return 0.0;
    }
    let props = material.properties();
    let base = (props.attenuation_db_per_10cm * thickness_multiplier(thickness_m)).max(props.minimum_loss_db);
    let frequency_factor = crate::geometry::types::material_frequency_factor(frequency_mhz, props.frequency_exponent);
    base * frequency_factor * incidence_factor(incidence_angle_rad)
}

/// `1 / cos θ` with θ folded into `[0, 80°]`.
fn incidence_factor(angle_rad: f64) -> f64 {
    let angle = if angle_rad.is_finite() { angle_rad.abs().min(MAX_INCIDENCE_ANGLE_RAD) } else { 0.0 };
    1.0 / angle.cos()
}

/// Wall description for [`multi_wall_penetration_loss`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallTraversal {
    pub material: WallMaterial,
    pub thickness_m: f64,
    pub incidence_angle_rad: f64,
}

/// Sum of the individual wall losses along a path.
pub fn multi_wall_penetration_loss(walls: &[WallTraversal], frequency_mhz: f64) -> f64 {
    walls
        .iter()
        .map(|w| wall_penetration_loss(w.material, w.thickness_m, frequency_mhz, w.incidence_angle_rad))
        .sum()
}

/// Specular reflection loss off a wall.
///
/// # Formula
///
/// ```text
/// L = −20 × log₁₀(|Γ|) × (1 − 0.4 × sin²θ)
/// ```
///
/// Grazing incidence reflects more energy, so the loss shrinks as θ approaches 90°.
/// Never below 0.1 dB.
pub fn reflection_loss(material: WallMaterial, incidence_angle_rad: f64) -> f64 {
    let gamma = material.properties().reflection_coefficient.clamp(1e-3, 0.999);
    let angle = if incidence_angle_rad.is_finite() { incidence_angle_rad } else { 0.0 };
    let angle_factor = 1.0 - 0.4 * angle.sin().powi(2);
    (-20.0 * gamma.log10() * angle_factor).max(0.1)
}

/// Path loss between floors.
///
/// Combines the ITU loss over the horizontal distance with a vertical term:
///
/// ```text
/// V = 20 × log₁₀(max(v, 1)) + L_floor(k, f) + F_v(f)
/// L = ITU(max(h, 1), f, 0) + V × (0.5 + 0.5 × v / d)
/// ```
///
/// - `F_v`: vertical frequency factor (0 / 2 / 3 dB for 2.4 / 5 / 6 GHz)
/// - `v / d`: geometry blend; steeper paths carry more of the vertical term
pub fn multi_floor_path_loss(
    distance_3d_m: f64,
    horizontal_distance_m: f64,
    vertical_distance_m: f64,
    frequency_mhz: f64,
    floors_separated: u32,
    construction: FloorConstruction,
    profile: &EnvironmentProfile,
) -> f64 {
    if !(distance_3d_m > 0.0) || !(frequency_mhz > 0.0) {
        return MAX_PATH_LOSS_DB;
    }
    let horizontal = itu_indoor_path_loss(horizontal_distance_m.max(1.0), frequency_mhz, 0, profile);
    let vertical_frequency_factor = match FrequencyBand::from_frequency(frequency_mhz) {
        FrequencyBand::Band2_4GHz => 0.0,
        FrequencyBand::Band5GHz => 2.0,
        FrequencyBand::Band6GHz => 3.0,
    };
    let vertical = 20.0 * vertical_distance_m.abs().max(1.0).log10()
        + floor_penetration_loss(floors_separated, frequency_mhz, construction)
        + vertical_frequency_factor;
    let blend = (vertical_distance_m.abs() / distance_3d_m).clamp(0.0, 1.0);
    horizontal + vertical * (0.5 + 0.5 * blend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::environment::EnvironmentType;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn fspl_reference_values() {
        // 1 m at 2.4 GHz ≈ 40.05 dB, 8 m at 5 GHz ≈ 64.5 dB
        assert_abs_diff_eq!(free_space_path_loss(1.0, 2400.0), 40.05, epsilon = 0.01);
        assert_abs_diff_eq!(free_space_path_loss(8.0, 5000.0), 64.49, epsilon = 0.01);
        // Doubling distance adds 6.02 dB
        assert_abs_diff_eq!(free_space_path_loss(10.0, 5000.0) - free_space_path_loss(5.0, 5000.0), 6.0206, epsilon = 1e-3);
    }

    #[test]
    fn fspl_monotonic_in_distance_and_frequency() {
        let distances = [0.1, 0.5, 1.0, 2.0, 7.5, 30.0, 120.0];
        for pair in distances.windows(2) {
            assert!(free_space_path_loss(pair[0], 2400.0) < free_space_path_loss(pair[1], 2400.0));
        }
        let freqs = [2400.0, 2462.0, 5000.0, 5500.0, 6000.0];
        for pair in freqs.windows(2) {
            assert!(free_space_path_loss(5.0, pair[0]) < free_space_path_loss(5.0, pair[1]));
        }
    }

    #[test]
    fn fspl_invalid_inputs_saturate() {
        assert_eq!(free_space_path_loss(0.0, 2400.0), MAX_PATH_LOSS_DB);
        assert_eq!(free_space_path_loss(-3.0, 2400.0), MAX_PATH_LOSS_DB);
        assert_eq!(free_space_path_loss(3.0, 0.0), MAX_PATH_LOSS_DB);
        assert_eq!(free_space_path_loss(f64::NAN, 2400.0), MAX_PATH_LOSS_DB);
    }

    #[test]
    fn itu_matches_reference_at_one_meter() {
        let profile = EnvironmentProfile::for_environment(EnvironmentType::Office);
        assert_relative_eq!(itu_indoor_path_loss(1.0, 2400.0, 0, &profile), free_space_path_loss(1.0, 2400.0), epsilon = 1e-9);
        // 10 m in an office (n = 3.0) adds 30 dB
        assert_relative_eq!(itu_indoor_path_loss(10.0, 2400.0, 0, &profile), free_space_path_loss(1.0, 2400.0) + 30.0, epsilon = 1e-9);
    }

    #[test]
    fn itu_floor_term_depends_on_construction_and_band() {
        assert!(floor_penetration_loss(1, 6000.0, FloorConstruction::Concrete) > floor_penetration_loss(1, 2400.0, FloorConstruction::Concrete));
        assert!(floor_penetration_loss(1, 2400.0, FloorConstruction::SteelConcrete) > floor_penetration_loss(1, 2400.0, FloorConstruction::WoodFrame));
        assert_relative_eq!(floor_penetration_loss(2, 2400.0, FloorConstruction::Concrete), 24.0);
        assert_eq!(floor_penetration_loss(0, 2400.0, FloorConstruction::Concrete), 0.0);

        let profile = EnvironmentProfile::default();
        let one = itu_indoor_path_loss(8.0, 5000.0, 1, &profile);
        let zero = itu_indoor_path_loss(8.0, 5000.0, 0, &profile);
        assert!(one > zero);
    }

    #[test]
    fn thick_concrete_wall_at_5ghz() {
        let loss = wall_penetration_loss(WallMaterial::Concrete, 1.0, 5000.0, 0.0);
        assert!((15.0..=25.0).contains(&loss), "loss {loss}");
    }

    #[test]
    fn wall_loss_grows_with_angle_thickness_frequency() {
        let base = wall_penetration_loss(WallMaterial::Brick, 0.2, 2400.0, 0.0);
        assert!(wall_penetration_loss(WallMaterial::Brick, 0.2, 2400.0, 0.6) > base);
        assert!(wall_penetration_loss(WallMaterial::Brick, 0.4, 2400.0, 0.0) > base);
        assert!(wall_penetration_loss(WallMaterial::Brick, 0.2, 5000.0, 0.0) > base);
        // Grazing incidence stays finite
        assert!(wall_penetration_loss(WallMaterial::Brick, 0.2, 2400.0, std::f64::consts::FRAC_PI_2).is_finite());
        assert_eq!(wall_penetration_loss(WallMaterial::Brick, 0.0, 2400.0, 0.0), 0.0);
    }

    #[test]
    fn multi_wall_loss_is_additive() {
        let a = WallTraversal {
            material: WallMaterial::Drywall,
            thickness_m: 0.12,
            incidence_angle_rad: 0.3,
        };
        let b = WallTraversal {
            material: WallMaterial::Concrete,
            thickness_m: 0.25,
            incidence_angle_rad: 0.0,
        };
        let both = multi_wall_penetration_loss(&[a, b], 5000.0);
        let separate = multi_wall_penetration_loss(&[a], 5000.0) + multi_wall_penetration_loss(&[b], 5000.0);
        assert_abs_diff_eq!(both, separate, epsilon = 1e-9);
    }

    #[test]
    fn reflection_loss_by_material_and_angle() {
        assert!(reflection_loss(WallMaterial::Metal, 0.0) < reflection_loss(WallMaterial::Drywall, 0.0));
        assert!(reflection_loss(WallMaterial::Concrete, 1.2) < reflection_loss(WallMaterial::Concrete, 0.0));
        assert!(reflection_loss(WallMaterial::Metal, 0.0) >= 0.1);
    }

    #[test]
    fn multi_floor_loss_exceeds_same_floor() {
        let profile = EnvironmentProfile::for_environment(EnvironmentType::Office);
        let same_floor = itu_indoor_path_loss(5.0, 5000.0, 0, &profile);
        let d3 = (25.0f64 + 9.0).sqrt();
        let across = multi_floor_path_loss(d3, 5.0, 3.0, 5000.0, 1, FloorConstruction::Concrete, &profile);
        assert!(across > same_floor);
        // Steeper geometry weights the vertical term more
        let steep = multi_floor_path_loss((1.0f64 + 9.0).sqrt(), 1.0, 3.0, 5000.0, 1, FloorConstruction::Concrete, &profile);
        let shallow_vertical_weight = across - itu_indoor_path_loss(5.0, 5000.0, 0, &profile);
        let steep_vertical_weight = steep - itu_indoor_path_loss(1.0, 5000.0, 0, &profile);
        assert!(steep_vertical_weight > shallow_vertical_weight);
        assert_eq!(multi_floor_path_loss(0.0, 0.0, 0.0, 5000.0, 1, FloorConstruction::Concrete, &profile), MAX_PATH_LOSS_DB);
    }
}
