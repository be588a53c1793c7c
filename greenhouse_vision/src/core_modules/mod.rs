// Stage-by-stage building blocks of the height measurement. Each module is usable
// on its own; `crate::pipeline` wires them together.

pub mod diagnostics;
pub mod height_estimator;
pub mod hsv_pixel;
pub mod mask_refiner;
pub mod region;
pub mod region_extractor;
pub mod roi;
pub mod segmenter;
