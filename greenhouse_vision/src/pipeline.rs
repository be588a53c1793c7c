// THEORY:
// The `pipeline` module is the top-level API of the measurement engine. It chains
// the core modules into one call: bytes in, a height (or a reason why not) out.
//
//   DECODE -> ROI -> SEGMENT -> REFINE -> EXTRACT -> {NoVegetation | TooSmall}
//          -> ESTIMATE -> {InvalidCalibration | Ok}
//
// Key architectural principles:
// 1.  **Tagged outcome**: `measure` returns `Result<Measurement, MeasurementError>`.
//     Callers that only want a number use `HeightOrZero`, which maps every failure
//     to the 0.0 sentinel.
// 2.  **Pure per call**: nothing is cached between calls, so one pipeline can be
//     shared across threads and identical input always yields identical output.
// 3.  **Diagnostics on the side**: artifacts go to an injected `DiagnosticSink`.
//     A failing sink is logged and ignored; it cannot change the measurement.

use crate::core_modules::diagnostics::{
    render_artifacts, DeferredSink, DiagnosticSink, DiagnosticsConfig, FileSystemSink, DEFAULT_TAG,
};
use crate::core_modules::height_estimator::{self, DEFAULT_PIXELS_PER_CM};
use crate::core_modules::mask_refiner::{refine_mask, DEFAULT_KERNEL_SIZE};
use crate::core_modules::region_extractor::region_extractor::{
    extract_regions, select_plant_region, DEFAULT_MIN_AREA_RATIO,
};
use crate::core_modules::roi::Roi;
use crate::core_modules::segmenter::{segment_vegetation, HsvBand};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::region::Region;
pub use crate::error::MeasurementError;

/// Default fraction of the image kept by the centered ROI crop.
pub const DEFAULT_ROI_RATIO: f64 = 0.7;

/// Tunable parameters for one measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Pixels per centimeter at the plant's distance. Must be > 0.
    pub pixels_per_cm: f64,
    /// Side ratio of the centered crop. Values outside (0, 1) use the full image.
    pub roi_ratio: f64,
    /// Minimum region area as a fraction of the ROI area.
    pub min_area_ratio: f64,
    /// Side of the square structuring element used by the mask refiner.
    pub kernel_size: u32,
    /// HSV range that counts as vegetation.
    pub band: HsvBand,
    /// When set, diagnostic images are produced for every measurement.
    pub diagnostics: Option<DiagnosticsConfig>,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            pixels_per_cm: DEFAULT_PIXELS_PER_CM,
            roi_ratio: DEFAULT_ROI_RATIO,
            min_area_ratio: DEFAULT_MIN_AREA_RATIO,
            kernel_size: DEFAULT_KERNEL_SIZE,
            band: HsvBand::default(),
            diagnostics: None,
        }
    }
}

impl MeasurementConfig {
    pub fn with_calibration(mut self, pixels_per_cm: f64) -> Self {
        self.pixels_per_cm = pixels_per_cm;
        self
    }

    pub fn with_roi_ratio(mut self, roi_ratio: f64) -> Self {
        self.roi_ratio = roi_ratio;
        self
    }

    pub fn with_min_area_ratio(mut self, min_area_ratio: f64) -> Self {
        self.min_area_ratio = min_area_ratio;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }
}

/// A successful measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Plant height in centimeters, rounded to one decimal.
    pub height_cm: f64,
    /// Vertical extent of the selected region in pixels.
    pub pixel_height: u32,
    /// Enclosed area of the selected region in square pixels.
    pub region_area: f64,
    /// The crop the measurement was taken in.
    pub roi: Roi,
}

/// Legacy accessor: the height, or 0.0 when no height could be determined.
pub trait HeightOrZero {
    fn height_or_zero(&self) -> f64;
}

impl HeightOrZero for Result<Measurement, MeasurementError> {
    fn height_or_zero(&self) -> f64 {
        self.as_ref().map(|m| m.height_cm).unwrap_or(0.0)
    }
}

/// The measurement engine: a configuration plus an optional diagnostics sink.
#[derive(Clone)]
pub struct HeightPipeline {
    config: MeasurementConfig,
    sink: Option<Arc<dyn DiagnosticSink>>,
    tag: String,
}

impl HeightPipeline {
    /// Builds a pipeline. If `config.diagnostics` is set, images are written to its
    /// directory by a `FileSystemSink` on a background thread, so `measure`
    /// returns without waiting for the files. The last clone of the pipeline to be
    /// dropped waits for pending writes.
    pub fn new(config: MeasurementConfig) -> Self {
        let (sink, tag) = match &config.diagnostics {
            Some(diagnostics) => {
                let files: Arc<dyn DiagnosticSink> = Arc::new(FileSystemSink::new(&diagnostics.directory));
                let sink = match DeferredSink::new(Arc::clone(&files)) {
                    Ok(deferred) => Arc::new(deferred) as Arc<dyn DiagnosticSink>,
                    Err(error) => {
                        warn!(%error, "writing diagnostics synchronously");
                        files
                    }
                };
                (Some(sink), diagnostics.tag.clone())
            }
            None => (None, DEFAULT_TAG.to_string()),
        };
        Self { config, sink, tag }
    }

    /// Replaces the diagnostics destination, enabling diagnostics.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    /// Decodes `encoded` and measures the plant in it.
    pub fn measure(&self, encoded: &[u8]) -> Result<Measurement, MeasurementError> {
        let image = decode(encoded)?;
        self.measure_image(&image)
    }

    /// Measures an already decoded image.
    pub fn measure_image(&self, image: &RgbImage) -> Result<Measurement, MeasurementError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(MeasurementError::EmptyImage);
        }

        // --- 1. ROI ---
        let roi = Roi::centered(width, height, self.config.roi_ratio);
        let roi_image = roi.crop(image);

        // --- 2. Segment ---
        let raw_mask = segment_vegetation(&roi_image, &self.config.band);

        // --- 3. Refine ---
        let mask = refine_mask(&raw_mask, self.config.kernel_size);

        // --- 4. Extract & select ---
        let regions = extract_regions(&mask);
        debug!(regions = regions.len(), roi_width = roi.width, roi_height = roi.height, "regions extracted");
        let selected = select_plant_region(regions, roi.area(), self.config.min_area_ratio);

        if let Some(sink) = &self.sink {
            let artifacts = render_artifacts(image, &roi, &roi_image, &mask, selected.as_ref().ok());
            if let Err(error) = sink.record(&self.tag, &artifacts) {
                warn!(tag = %self.tag, %error, "failed to record diagnostics");
            }
        }

        let region = selected.inspect_err(|reason| info!(%reason, "no plant region selected"))?;

        // --- 5. Estimate ---
        let pixel_height = height_estimator::pixel_height(&region);
        let height_cm = height_estimator::height_cm(pixel_height, self.config.pixels_per_cm)?;

        info!(pixel_height, height_cm, area = region.area, "plant height measured");

        Ok(Measurement {
            height_cm,
            pixel_height,
            region_area: region.area,
            roi,
        })
    }
}

/// Decodes an encoded image into RGB.
pub fn decode(encoded: &[u8]) -> Result<RgbImage, MeasurementError> {
    let image = image::load_from_memory(encoded)
        .map_err(|e| MeasurementError::Decode(e.to_string()))?
        .to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(MeasurementError::EmptyImage);
    }
    Ok(image)
}

/// Legacy entry point: default parameters, given calibration, 0.0 on any failure.
pub fn analyze_plant_height(encoded: &[u8], pixels_per_cm: f64) -> f64 {
    let config = MeasurementConfig::default().with_calibration(pixels_per_cm);
    HeightPipeline::new(config).measure(encoded).height_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::diagnostics::DiagnosticArtifacts;
    use crate::error::DiagnosticError;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;
    use std::sync::Mutex;

    const GREEN: Rgb<u8> = Rgb([30, 170, 40]);
    const RED: Rgb<u8> = Rgb([200, 30, 30]);

    fn encode(image: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn fill(image: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                image.put_pixel(x, y, color);
            }
        }
    }

    /// 400x300 red frame with a full-width green band on rows 100..=200.
    fn banded_image() -> RgbImage {
        let mut image = RgbImage::from_pixel(400, 300, RED);
        fill(&mut image, 0, 100, 399, 200, GREEN);
        image
    }

    fn full_frame_config() -> MeasurementConfig {
        MeasurementConfig::default().with_roi_ratio(1.0)
    }

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<(String, DiagnosticArtifacts)>>,
    }

    impl DiagnosticSink for RecordingSink {
        fn record(&self, tag: &str, artifacts: &DiagnosticArtifacts) -> Result<(), DiagnosticError> {
            self.records
                .lock()
                .unwrap()
                .push((tag.to_string(), artifacts.clone()));
            Ok(())
        }
    }

    struct FailingSink;

    impl DiagnosticSink for FailingSink {
        fn record(&self, _tag: &str, _artifacts: &DiagnosticArtifacts) -> Result<(), DiagnosticError> {
            Err(DiagnosticError::Directory {
                path: "/nowhere".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        }
    }

    #[test]
    fn green_band_measures_one_point_eight_cm() {
        let pipeline = HeightPipeline::new(full_frame_config());
        let measurement = pipeline.measure(&encode(&banded_image())).unwrap();
        assert_eq!(measurement.pixel_height, 100);
        assert_eq!(measurement.height_cm, 1.8);
        assert_eq!(measurement.roi, Roi::full(400, 300));
    }

    #[test]
    fn all_red_image_has_no_vegetation() {
        let image = RgbImage::from_pixel(200, 150, RED);
        let result = HeightPipeline::new(MeasurementConfig::default()).measure(&encode(&image));
        assert_eq!(result, Err(MeasurementError::NoVegetationDetected));
        assert_eq!(result.height_or_zero(), 0.0);
    }

    #[test]
    fn one_percent_speckle_is_too_small() {
        // 35 x 35 = 1225 px, about 1% of the 400 x 300 ROI.
        let mut image = RgbImage::from_pixel(400, 300, RED);
        fill(&mut image, 180, 130, 214, 164, GREEN);
        let result = HeightPipeline::new(full_frame_config()).measure(&encode(&image));
        assert!(matches!(result, Err(MeasurementError::RegionTooSmall { .. })));
        assert_eq!(result.height_or_zero(), 0.0);
    }

    #[test]
    fn larger_of_two_blobs_sets_the_height() {
        let mut image = RgbImage::from_pixel(400, 300, RED);
        // ~40% of the frame: 240 x 200, rows 50..=249.
        fill(&mut image, 10, 50, 249, 249, GREEN);
        // ~10% of the frame: 100 x 120, rows 20..=139.
        fill(&mut image, 280, 20, 379, 139, GREEN);
        let measurement = HeightPipeline::new(full_frame_config())
            .measure(&encode(&image))
            .unwrap();
        assert_eq!(measurement.pixel_height, 199);
        assert_eq!(measurement.height_cm, 3.6);
    }

    #[test]
    fn invalid_calibration_yields_zero_for_any_region() {
        for calibration in [0.0, -55.0] {
            let config = full_frame_config().with_calibration(calibration);
            let result = HeightPipeline::new(config).measure(&encode(&banded_image()));
            assert_eq!(result, Err(MeasurementError::InvalidCalibration(calibration)));
            assert_eq!(result.height_or_zero(), 0.0);
        }
    }

    #[test]
    fn undecodable_bytes_are_a_decode_error() {
        let result = HeightPipeline::new(MeasurementConfig::default()).measure(b"not an image");
        assert!(matches!(result, Err(MeasurementError::Decode(_))));
        assert_eq!(analyze_plant_height(b"", 55.0), 0.0);
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let bytes = encode(&banded_image());
        let pipeline = HeightPipeline::new(full_frame_config());
        assert_eq!(pipeline.measure(&bytes), pipeline.measure(&bytes));
    }

    #[test]
    fn larger_calibration_never_increases_the_height() {
        let bytes = encode(&banded_image());
        let mut previous = f64::MAX;
        for calibration in [5.0, 20.0, 55.0, 80.0, 300.0] {
            let height = HeightPipeline::new(full_frame_config().with_calibration(calibration))
                .measure(&bytes)
                .height_or_zero();
            assert!(height <= previous, "{calibration} gave {height} after {previous}");
            previous = height;
        }
    }

    #[test]
    fn out_of_range_roi_ratios_match_ratio_one() {
        let bytes = encode(&banded_image());
        let reference = HeightPipeline::new(full_frame_config()).measure(&bytes);
        for ratio in [0.0, -1.0, 1.0, 2.0] {
            let config = MeasurementConfig::default().with_roi_ratio(ratio);
            assert_eq!(HeightPipeline::new(config).measure(&bytes), reference);
        }
    }

    #[test]
    fn default_roi_crops_the_margins() {
        let measurement = HeightPipeline::new(MeasurementConfig::default())
            .measure(&encode(&banded_image()))
            .unwrap();
        assert_eq!(measurement.roi, Roi::centered(400, 300, DEFAULT_ROI_RATIO));
        // Band rows 100..=200 sit inside the 45..255 crop, so the extent is unchanged.
        assert_eq!(measurement.pixel_height, 100);
    }

    #[test]
    fn legacy_entry_point_matches_the_pipeline() {
        let bytes = encode(&banded_image());
        let expected = HeightPipeline::new(MeasurementConfig::default())
            .measure(&bytes)
            .height_or_zero();
        assert_eq!(analyze_plant_height(&bytes, DEFAULT_PIXELS_PER_CM), expected);
    }

    #[test]
    fn diagnostics_are_recorded_with_the_tag() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = HeightPipeline::new(MeasurementConfig::default())
            .with_sink(sink.clone())
            .with_tag("monstera");
        pipeline.measure(&encode(&banded_image())).unwrap();

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let (tag, artifacts) = &records[0];
        assert_eq!(tag, "monstera");
        assert_eq!(artifacts.mask.dimensions(), (280, 210));
        assert!(artifacts.annotated_full.is_some());
    }

    #[test]
    fn configured_diagnostics_are_on_disk_once_the_pipeline_is_dropped() {
        let temp = tempfile::tempdir().unwrap();
        let directory = temp.path().join("diag");
        let mut config = MeasurementConfig::default();
        config.diagnostics = Some(DiagnosticsConfig {
            directory: directory.clone(),
            tag: "basil".to_string(),
        });

        let pipeline = HeightPipeline::new(config);
        let measurement = pipeline.measure(&encode(&banded_image())).unwrap();
        assert!(measurement.height_cm > 0.0);
        drop(pipeline);

        let names: Vec<String> = std::fs::read_dir(&directory)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|name| name.starts_with("basil_")));
    }

    #[test]
    fn failing_sink_does_not_change_the_result() {
        let bytes = encode(&banded_image());
        let plain = HeightPipeline::new(full_frame_config()).measure(&bytes);
        let with_failing_sink = HeightPipeline::new(full_frame_config())
            .with_sink(Arc::new(FailingSink))
            .measure(&bytes);
        assert_eq!(plain, with_failing_sink);
    }

    #[test]
    fn config_deserializes_with_defaults_for_missing_fields() {
        let config: MeasurementConfig = serde_json::from_str(r#"{ "pixels_per_cm": 40.0 }"#).unwrap();
        assert_eq!(config.pixels_per_cm, 40.0);
        assert_eq!(config.roi_ratio, DEFAULT_ROI_RATIO);
        assert_eq!(config.kernel_size, DEFAULT_KERNEL_SIZE);
        assert!(config.diagnostics.is_none());
    }
}
