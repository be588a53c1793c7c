// THEORY:
// Every way a measurement can fail is a value, not a panic. The pipeline returns
// `Result<Measurement, MeasurementError>` so callers can tell "no plant in frame"
// apart from "bad calibration", while legacy callers collapse every variant into
// the 0.0 sentinel through `HeightOrZero`.

use std::path::PathBuf;
use thiserror::Error;

/// Why a height could not be determined for an image.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasurementError {
    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("decoded image has zero width or height")]
    EmptyImage,

    #[error("no vegetation-colored region found in the region of interest")]
    NoVegetationDetected,

    #[error("largest region ({largest_area:.1} px) is below the minimum area ({min_area:.1} px)")]
    RegionTooSmall { largest_area: f64, min_area: f64 },

    #[error("calibration must be a positive number of pixels per centimeter, got {0}")]
    InvalidCalibration(f64),
}

/// Failure to persist diagnostic artifacts. Never affects a measurement.
#[derive(Debug, Error)]
pub enum DiagnosticError {
    #[error("could not prepare diagnostics directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write diagnostic image {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("could not start diagnostics writer: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("diagnostics writer has stopped")]
    WriterStopped,
}

/// Failure of the concurrent measurement pool itself (not of a measurement).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("measurement pool is shut down")]
    Closed,

    #[error("worker dropped the task before replying")]
    WorkerDropped,
}

/// Failure to hand a window summary to its downstream consumer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("summary receiver is gone")]
    Disconnected,

    #[error("summary delivery rejected: {0}")]
    Rejected(String),
}

/// Failure talking to the sensor aggregator task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregatorError {
    #[error("sensor aggregator has stopped")]
    Stopped,
}
