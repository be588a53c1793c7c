use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use greenhouse_vision::core_modules::diagnostics::DiagnosticsConfig;
use greenhouse_vision::parallel_pipeline::{MeasurementOutcome, MeasurementPool, default_worker_count};
use greenhouse_vision::{HeightOrZero, HeightPipeline, MeasurementConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Measures plant height in one or more image files.
#[derive(Debug, Parser)]
#[command(name = "height_tester", version, about)]
struct Cli {
    /// Image files to measure.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Calibration in pixels per centimeter.
    #[arg(long, env = "HEIGHT_CALIBRATION")]
    calibration: Option<f64>,

    /// Fraction of each dimension kept by the centered region of interest.
    #[arg(long)]
    roi_ratio: Option<f64>,

    /// Minimum plant area as a fraction of the region of interest.
    #[arg(long)]
    min_area_ratio: Option<f64>,

    /// Side of the square morphology kernel.
    #[arg(long)]
    kernel_size: Option<u32>,

    /// JSON file with a full measurement configuration. Flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write diagnostic images into this directory.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Tag used in diagnostic file names.
    #[arg(long)]
    tag: Option<String>,

    /// Number of measurement workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Print results as JSON lines instead of text.
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Serialize)]
struct FileReport<'a> {
    path: &'a Path,
    height_cm: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pixel_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}

fn load_config(cli: &Cli) -> Result<MeasurementConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<MeasurementConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => MeasurementConfig::default(),
    };

    if let Some(calibration) = cli.calibration {
        config = config.with_calibration(calibration);
    }
    if let Some(roi_ratio) = cli.roi_ratio {
        config = config.with_roi_ratio(roi_ratio);
    }
    if let Some(min_area_ratio) = cli.min_area_ratio {
        config = config.with_min_area_ratio(min_area_ratio);
    }
    if let Some(kernel_size) = cli.kernel_size {
        config.kernel_size = kernel_size;
    }
    if let Some(directory) = &cli.debug_dir {
        let mut diagnostics = config.diagnostics.take().unwrap_or_default();
        diagnostics.directory = directory.clone();
        config = config.with_diagnostics(diagnostics);
    }
    if let (Some(tag), Some(diagnostics)) = (&cli.tag, config.diagnostics.as_mut()) {
        diagnostics.tag = tag.clone();
    }

    Ok(config)
}

fn report<'a>(path: &'a Path, outcome: &MeasurementOutcome) -> FileReport<'a> {
    FileReport {
        path,
        height_cm: outcome.height_or_zero(),
        pixel_height: outcome.as_ref().ok().map(|m| m.pixel_height),
        error: outcome.as_ref().err().map(ToString::to_string),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    init_tracing(cli.log_json, level);

    let config = load_config(&cli)?;
    let tag = config
        .diagnostics
        .as_ref()
        .map(|d| d.tag.clone())
        .unwrap_or_else(|| DiagnosticsConfig::default().tag);
    let workers = cli.workers.unwrap_or_else(default_worker_count);

    info!(
        inputs = cli.inputs.len(),
        workers,
        pixels_per_cm = config.pixels_per_cm,
        roi_ratio = config.roi_ratio,
        "measuring"
    );

    let mut images = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let bytes = std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
        images.push(bytes);
    }

    let pool = MeasurementPool::with_pipeline(HeightPipeline::new(config).with_tag(tag), workers);
    let results = pool.measure_batch(images).await;
    pool.shutdown().await;

    let mut failures = 0usize;
    for (path, result) in cli.inputs.iter().zip(results) {
        let outcome = result.with_context(|| format!("measuring {}", path.display()))?;
        if let Err(error) = &outcome {
            warn!(path = %path.display(), %error, "no height");
            failures += 1;
        }

        let file_report = report(path, &outcome);
        if cli.json {
            println!("{}", serde_json::to_string(&file_report)?);
        } else {
            match &file_report.error {
                None => println!("{}: {:.1} cm", path.display(), file_report.height_cm),
                Some(reason) => println!("{}: {:.1} cm ({reason})", path.display(), file_report.height_cm),
            }
        }
    }

    info!(measured = cli.inputs.len() - failures, failures, "done");
    Ok(())
}
