// THEORY:
// The height estimator is the only place pixels become centimeters.
//
// The vertical extent is taken over every boundary point of the selected region,
// not over the corners of a bounding box, so a drooping leaf or a single tall shoot
// is measured at its true extreme. The pixel height is then divided by the
// caller's calibration (pixels per centimeter) and rounded to one decimal.

use crate::core_modules::region::Region;
use crate::error::MeasurementError;

/// Default calibration in pixels per centimeter.
pub const DEFAULT_PIXELS_PER_CM: f64 = 55.0;

/// Vertical pixel extent of `region`: `max(0, y_max - y_min)`.
pub fn pixel_height(region: &Region) -> u32 {
    region
        .vertical_extent()
        .map(|(y_min, y_max)| (y_max - y_min).max(0) as u32)
        .unwrap_or(0)
}

/// Converts a pixel height to centimeters, rounded to one decimal place.
pub fn height_cm(pixel_height: u32, pixels_per_cm: f64) -> Result<f64, MeasurementError> {
    if !pixels_per_cm.is_finite() || pixels_per_cm <= 0.0 {
        return Err(MeasurementError::InvalidCalibration(pixels_per_cm));
    }

    Ok(round_to_tenth(pixel_height as f64 / pixels_per_cm))
}

/// Rounds half away from zero at the first decimal.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
