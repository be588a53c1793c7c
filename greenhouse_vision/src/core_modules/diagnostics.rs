// THEORY:
// Diagnostics are a side branch of the measurement: they show a human what the
// pipeline saw, and nothing downstream ever reads them back.
//
// The module has two halves:
// 1.  **Rendering** (`render_artifacts`) is pure. It draws the mask, the ROI with
//     the selected boundary and its top/bottom lines, and the full frame with the
//     ROI rectangle. Tests can inspect the pixels directly.
// 2.  **Recording** goes through the `DiagnosticSink` trait. `FileSystemSink`
//     writes PNGs, `DeferredSink` moves any sink's work off the caller's thread,
//     tests plug in an in-memory sink.
//
// A sink may fail; the pipeline logs the failure and carries on. A sink may also
// return before its write has happened, so the measurement never waits on disk.

use crate::core_modules::region::Region;
use crate::core_modules::roi::Roi;
use crate::error::DiagnosticError;
use chrono::{DateTime, Local};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Tag used when the caller does not supply one.
pub const DEFAULT_TAG: &str = "plant";

const BOUNDARY_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const EXTENT_LINE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const ROI_RECT_COLOR: Rgb<u8> = Rgb([0, 128, 255]);
const ROI_RECT_THICKNESS: u32 = 3;

/// Where and under what name diagnostic images are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Output directory; created on first write.
    pub directory: PathBuf,
    /// Prefix for every file of one measurement.
    pub tag: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("debug_output"),
            tag: DEFAULT_TAG.to_string(),
        }
    }
}

/// Rendered images for one measurement.
#[derive(Debug, Clone)]
pub struct DiagnosticArtifacts {
    /// The refined binary mask, ROI-sized.
    pub mask: GrayImage,
    /// The ROI with the selected boundary and its y_min / y_max lines.
    pub annotated_roi: RgbImage,
    /// The full image with the ROI outlined. `None` when the ROI is the full image.
    pub annotated_full: Option<RgbImage>,
}

/// Destination for diagnostic artifacts.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, tag: &str, artifacts: &DiagnosticArtifacts) -> Result<(), DiagnosticError>;
}

/// Queues records for a background writer thread and returns at once.
///
/// Failures of the wrapped sink are logged on the writer thread and never reach
/// the caller. Dropping the sink waits for every queued record to be written.
pub struct DeferredSink {
    queue: Option<mpsc::Sender<(String, DiagnosticArtifacts)>>,
    writer: Option<JoinHandle<()>>,
}

impl DeferredSink {
    pub fn new(inner: Arc<dyn DiagnosticSink>) -> Result<Self, DiagnosticError> {
        let (queue, pending) = mpsc::channel::<(String, DiagnosticArtifacts)>();

        let writer = std::thread::Builder::new()
            .name("diagnostics".to_string())
            .spawn(move || {
                for (tag, artifacts) in pending {
                    if let Err(error) = inner.record(&tag, &artifacts) {
                        warn!(%tag, %error, "deferred diagnostics write failed");
                    }
                }
            })
            .map_err(DiagnosticError::Spawn)?;

        Ok(Self {
            queue: Some(queue),
            writer: Some(writer),
        })
    }
}

impl DiagnosticSink for DeferredSink {
    fn record(&self, tag: &str, artifacts: &DiagnosticArtifacts) -> Result<(), DiagnosticError> {
        self.queue
            .as_ref()
            .ok_or(DiagnosticError::WriterStopped)?
            .send((tag.to_string(), artifacts.clone()))
            .map_err(|_| DiagnosticError::WriterStopped)
    }
}

impl Drop for DeferredSink {
    fn drop(&mut self) {
        // Closing the queue ends the writer loop once it is drained.
        drop(self.queue.take());
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!("diagnostics writer panicked");
            }
        }
    }
}

/// Writes `{tag}_{YYYYmmdd_HHMMSS}_{mask|roi|full}.png` files into a directory.
///
/// Two measurements with the same tag in the same second overwrite each other.
#[derive(Debug, Clone)]
pub struct FileSystemSink {
    directory: PathBuf,
}

impl FileSystemSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File stem shared by all artifacts of one measurement.
    pub fn file_stem(tag: &str, at: DateTime<Local>) -> String {
        format!("{}_{}", sanitize_tag(tag), at.format("%Y%m%d_%H%M%S"))
    }

    fn ensure_directory(&self) -> Result<(), DiagnosticError> {
        std::fs::create_dir_all(&self.directory).map_err(|source| DiagnosticError::Directory {
            path: self.directory.clone(),
            source,
        })
    }
}

impl DiagnosticSink for FileSystemSink {
    fn record(&self, tag: &str, artifacts: &DiagnosticArtifacts) -> Result<(), DiagnosticError> {
        self.ensure_directory()?;
        let stem = Self::file_stem(tag, Local::now());

        let mask_path = self.directory.join(format!("{stem}_mask.png"));
        save_png(&artifacts.mask, &mask_path)?;

        let roi_path = self.directory.join(format!("{stem}_roi.png"));
        save_png(&artifacts.annotated_roi, &roi_path)?;

        if let Some(full) = &artifacts.annotated_full {
            let full_path = self.directory.join(format!("{stem}_full.png"));
            save_png(full, &full_path)?;
        }

        debug!(directory = %self.directory.display(), stem = %stem, "diagnostic images written");
        Ok(())
    }
}

fn save_png<P, C>(image: &image::ImageBuffer<P, C>, path: &Path) -> Result<(), DiagnosticError>
where
    P: image::PixelWithColorType,
    [P::Subpixel]: image::EncodableLayout,
    C: std::ops::Deref<Target = [P::Subpixel]>,
{
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|source| DiagnosticError::Encode {
            path: path.to_path_buf(),
            source,
        })
}

/// Keeps tags usable as a file name component.
fn sanitize_tag(tag: &str) -> String {
    let cleaned: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_TAG.to_string()
    } else {
        cleaned
    }
}

/// Draws the three diagnostic images. `region` is in ROI coordinates.
pub fn render_artifacts(
    full_image: &RgbImage,
    roi: &Roi,
    roi_image: &RgbImage,
    mask: &GrayImage,
    region: Option<&Region>,
) -> DiagnosticArtifacts {
    let mut annotated_roi = roi_image.clone();
    if let Some(region) = region {
        draw_boundary(&mut annotated_roi, region);
        if let Some((y_min, y_max)) = region.vertical_extent() {
            draw_horizontal_line(&mut annotated_roi, y_min);
            draw_horizontal_line(&mut annotated_roi, y_max);
        }
    }

    let (width, height) = full_image.dimensions();
    let annotated_full = if roi.is_full_frame(width, height) {
        None
    } else {
        let mut annotated = full_image.clone();
        draw_roi_rectangle(&mut annotated, roi);
        Some(annotated)
    };

    DiagnosticArtifacts {
        mask: mask.clone(),
        annotated_roi,
        annotated_full,
    }
}

fn draw_boundary(image: &mut RgbImage, region: &Region) {
    let points = &region.boundary;
    if let [only] = points.as_slice() {
        if only.x >= 0 && only.y >= 0 && (only.x as u32) < image.width() && (only.y as u32) < image.height() {
            image.put_pixel(only.x as u32, only.y as u32, BOUNDARY_COLOR);
        }
        return;
    }
    for (a, b) in points.iter().zip(points.iter().cycle().skip(1)) {
        draw_line_segment_mut(
            image,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            BOUNDARY_COLOR,
        );
    }
}

fn draw_horizontal_line(image: &mut RgbImage, y: i32) {
    let right = image.width().saturating_sub(1) as f32;
    draw_line_segment_mut(image, (0.0, y as f32), (right, y as f32), EXTENT_LINE_COLOR);
}

fn draw_roi_rectangle(image: &mut RgbImage, roi: &Roi) {
    for inset in 0..ROI_RECT_THICKNESS {
        let width = roi.width.saturating_sub(2 * inset);
        let height = roi.height.saturating_sub(2 * inset);
        if width == 0 || height == 0 {
            break;
        }
        let rect = Rect::at((roi.x + inset) as i32, (roi.y + inset) as i32).of_size(width, height);
        draw_hollow_rect_mut(image, rect, ROI_RECT_COLOR);
    }
}
