use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Builder;
use log::{LevelFilter, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use wifi_coverage_planner::common::{EngineConfig, load_scene};
use wifi_coverage_planner::coverage::{BlendSettings, CoverageStatistics, CoverageEngine, blend_measurements};
use wifi_coverage_planner::predictor::{
    ImprovementPrediction, PlacementObjective, PlacementRecommendation, SignalPrediction, SignalPredictor, SignalQualityEstimate, predict_signal_quality,
};
use wifi_coverage_planner::raytracer::{DeviceKind, RFTransmitter};

#[derive(Parser)]
#[command(name = "wifi-coverage-planner")]
#[command(version)]
#[command(about = "Indoor WiFi coverage prediction and access point placement", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to engine configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the coverage map of a scene
    Coverage {
        /// Scene JSON file
        scene: PathBuf,
        /// Write the full map here instead of printing statistics
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Ignore measured samples in the scene
        #[arg(long)]
        no_blend: bool,
    },

    /// Predict signal, link quality and outage probability at the scene's prediction points
    Predict {
        scene: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Outage threshold (dBm)
        #[arg(long, default_value_t = -70.0, allow_negative_numbers = true)]
        threshold: f64,
        /// Monte Carlo trials for the outage estimate
        #[arg(long, default_value_t = 1000)]
        trials: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Rank locations for an additional device
    Placement {
        scene: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Objective::Balanced)]
        objective: Objective,
        /// Number of recommendations to report
        #[arg(long, default_value_t = 5)]
        top: usize,
        #[arg(long, value_enum, default_value_t = Device::MeshNode)]
        device: Device,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Objective {
    MaxCoverage,
    MinInterference,
    Balanced,
}

impl From<Objective> for PlacementObjective {
    fn from(o: Objective) -> Self {
        match o {
            Objective::MaxCoverage => PlacementObjective::MaxCoverage,
            Objective::MinInterference => PlacementObjective::MinInterference,
            Objective::Balanced => PlacementObjective::Balanced,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Device {
    Router,
    Extender,
    MeshNode,
}

impl From<Device> for DeviceKind {
    fn from(d: Device) -> Self {
        match d {
            Device::Router => DeviceKind::Router,
            Device::Extender => DeviceKind::Extender,
            Device::MeshNode => DeviceKind::MeshNode,
        }
    }
}

#[derive(Serialize)]
struct PointReport {
    prediction: SignalPrediction,
    quality: SignalQualityEstimate,
    outage_probability: f64,
}

#[derive(Serialize)]
struct PlacementReport {
    recommendations: Vec<PlacementRecommendation>,
    best_improvement: Option<ImprovementPrediction>,
}

/// Writes `value` as pretty JSON to `output`, or to stdout when no path is given.
fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create output file: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value).context("Failed to serialize result")?;
            writer.flush()?;
            info!("Wrote {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer_pretty(&mut lock, value).context("Failed to serialize result")?;
            writeln!(lock)?;
        }
    }
    Ok(())
}

fn log_statistics(stats: &CoverageStatistics) {
    info!("{} points, mean best RSSI {:.1} dBm", stats.point_count, stats.mean_best_rssi_dbm);
    for (quality, percent) in &stats.quality_percent {
        info!("  {:?}: {:.1}%", quality, percent);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging setup
    let level = LevelFilter::from_str(&cli.log_level).unwrap_or(LevelFilter::Info);
    Builder::new().filter_level(LevelFilter::Warn).filter(Some("wifi_coverage_planner"), level).init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let engine = Arc::new(CoverageEngine::new(config).context("Failed to start coverage engine")?);

    match cli.command {
        Commands::Coverage { scene, output, no_blend } => {
            let scene = load_scene(&scene)?;
            let started = Instant::now();
            let map = engine.calculate_coverage(&scene.room, &scene.transmitters, &scene.frequencies_mhz)?;
            info!("Coverage for room {} computed in {:?}", scene.room.id, started.elapsed());

            let map = if !no_blend && !scene.measurements.is_empty() {
                info!("Blending {} measured samples", scene.measurements.len());
                Arc::new(blend_measurements(&map, &scene.measurements, &BlendSettings::default())?)
            } else {
                map
            };
            let stats = map.statistics();
            log_statistics(&stats);
            match output {
                Some(path) => emit(map.as_ref(), Some(path.as_path()))?,
                None => emit(&stats, None)?,
            }
        }

        Commands::Predict { scene, output, threshold, trials, seed } => {
            let scene = load_scene(&scene)?;
            if scene.prediction_points.is_empty() {
                bail!("Scene has no prediction_points");
            }
            let predictor = SignalPredictor::new(Arc::clone(&engine));
            let mut reports = Vec::with_capacity(scene.prediction_points.len());
            for &point in &scene.prediction_points {
                let prediction = predictor.predict_signal_strength(point, &scene.transmitters, &scene.room, &scene.frequencies_mhz)?;
                if prediction.simplified {
                    warn!("Prediction at {:?} used the free-space estimate", point);
                }
                let quality = predict_signal_quality(&prediction.signal, prediction.environment);
                let outage_probability =
                    predictor.predict_outage_probability(point, &scene.transmitters, &scene.room, &scene.frequencies_mhz, threshold, trials, seed)?;
                info!(
                    "{:?}: {:.1} dBm ({:?}), confidence {:.2}, outage {:.1}%",
                    point,
                    prediction.signal.best_rssi(),
                    prediction.signal.quality,
                    prediction.confidence,
                    outage_probability * 100.0
                );
                reports.push(PointReport {
                    prediction,
                    quality,
                    outage_probability,
                });
            }
            emit(&reports, output.as_deref())?;
        }

        Commands::Placement { scene, output, objective, top, device } => {
            let scene = load_scene(&scene)?;
            let predictor = SignalPredictor::new(Arc::clone(&engine));
            let started = Instant::now();
            let mut recommendations =
                predictor.find_optimal_placement(&scene.room, &scene.transmitters, &scene.candidate_locations, objective.into(), &scene.frequencies_mhz)?;
            info!("Scored {} candidates in {:?}", recommendations.len(), started.elapsed());
            recommendations.truncate(top.max(1));

            let best_improvement = match recommendations.first() {
                Some(best) => {
                    let candidate = RFTransmitter::standard("recommended", device.into(), best.location);
                    Some(predictor.predict_coverage_improvement(&scene.transmitters, &candidate, &scene.room, &scene.frequencies_mhz)?)
                }
                None => None,
            };
            emit(
                &PlacementReport {
                    recommendations,
                    best_improvement,
                },
                output.as_deref(),
            )?;
        }
    }

    let stats = engine.cache_stats();
    info!(
        "Traced {} grid points; cache: {} entries, hit rate {:.0}%",
        engine.points_evaluated(),
        stats.entries,
        stats.hit_rate() * 100.0
    );
    if engine.memory_pressure_events() > 0 {
        warn!("Memory pressure was reported {} times during this run", engine.memory_pressure_events());
    }
    Ok(())
}
