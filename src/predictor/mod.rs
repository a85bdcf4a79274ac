//! Prediction API.
//!
//! User-facing questions answered on top of the coverage engine: how strong is the signal
//! here and how sure are we, what would another device add, where should it go, and what
//! link quality follows from a predicted signal.
//!
//! ## Module Organization
//!
//! - `prediction`: [`SignalPredictor`], point prediction with confidence, outage probability
//! - `placement`: improvement what-if and candidate ranking
//! - `quality`: SNR, throughput, reliability and interference risk

pub mod placement;
pub mod prediction;
pub mod quality;

pub use placement::{ImprovementPrediction, PlacementObjective, PlacementRecommendation, ReasoningCode, generate_candidate_locations};
pub use prediction::{SignalPrediction, SignalPredictor, prediction_confidence, simplified_signal};
pub use quality::{BandQuality, InterferenceRisk, SignalQualityEstimate, predict_signal_quality};
