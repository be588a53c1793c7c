// THEORY:
// This file is the main entry point for the `greenhouse_vision` library crate.
// It exports the high-level interfaces of the plant-monitoring backend:
//
// - `pipeline`: image bytes in, plant height out (`HeightPipeline`, `Measurement`).
// - `parallel_pipeline`: the same measurement fanned out over a worker pool.
// - `sensor_aggregator`: per-plant windowed averaging of sensor readings.
// - `alerts`: threshold events and notification templates.
// - `statistics`: care statistics over hourly series and watering events.
//
// The stage-by-stage vision code lives in `core_modules` and is public for callers
// that want a single stage, but the pipeline is the intended entry point.

pub mod alerts;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod sensor_aggregator;
pub mod statistics;

pub use error::MeasurementError;
pub use pipeline::{analyze_plant_height, HeightOrZero, HeightPipeline, Measurement, MeasurementConfig};
