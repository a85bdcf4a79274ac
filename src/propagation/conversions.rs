//! Power-unit conversions and the log-normal shadowing term.
//!
//! Units:
//! - Power: dBm and mW
//! - Loss: dB (positive numbers mean attenuation)

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Anything weaker than this is treated as no signal at all when converting to dBm.
pub const NO_SIGNAL_DBM: f64 = -200.0;

/// Convert power from dBm (decibels relative to 1 milliwatt) to milliwatts.
///
/// # Formula
///
/// ```text
/// P(mW) = 10^(P(dBm) / 10)
/// ```
///
/// # Examples
///
/// ```text
/// 0 dBm   → 1 mW
/// 20 dBm  → 100 mW
/// -10 dBm → 0.1 mW
/// ```
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

/// Convert power from milliwatts to dBm.
///
/// # Formula
///
/// ```text
/// P(dBm) = 10 × log₁₀(P(mW))
/// ```
///
/// Non-positive (or NaN) power maps to [`NO_SIGNAL_DBM`] instead of -∞.
pub fn mw_to_dbm(mw: f64) -> f64 {
    if !(mw > 0.0) {
        return NO_SIGNAL_DBM;
    }
    (10.0 * mw.log10()).max(NO_SIGNAL_DBM)
}

/// Sum powers given in dBm in the linear domain and convert back.
///
/// An empty input yields [`NO_SIGNAL_DBM`].
pub fn combine_powers_dbm<I>(powers: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    mw_to_dbm(powers.into_iter().map(dbm_to_mw).sum())
}

/// Sample the log-normal shadowing term X_σ ~ Normal(0, σ) in dB.
///
/// A non-positive or non-finite σ disables shadowing and returns 0.
pub fn sample_shadowing_db<R: Rng + ?Sized>(sigma_db: f64, rng: &mut R) -> f64 {
    if !(sigma_db > 0.0) || !sigma_db.is_finite() {
        return 0.0;
    }
    match Normal::new(0.0, sigma_db) {
        Ok(normal) => normal.sample(rng),
        Err(_) => 0.0,
    }
}
