// THEORY:
// The ROI selector trims the photograph down to a centered window before any color
// analysis runs. Pots, walls and tables tend to live in the margins of a plant
// photo; cropping them away keeps stray green objects out of the mask.
//
// The selector is a pure function of (width, height, ratio). It never fails for a
// non-empty image: out-of-range ratios simply mean "use the whole frame".

use image::RgbImage;
use serde::Serialize;

/// A rectangular window inside a decoded image, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Roi {
    /// Left edge of the window in the full image.
    pub x: u32,
    /// Top edge of the window in the full image.
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    /// Computes the centered window for `ratio`.
    ///
    /// A ratio outside the open interval (0, 1), or NaN, selects the full image.
    pub fn centered(image_width: u32, image_height: u32, ratio: f64) -> Self {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Self::full(image_width, image_height);
        }

        let width = ((image_width as f64 * ratio).floor() as u32).clamp(1, image_width.max(1));
        let height = ((image_height as f64 * ratio).floor() as u32).clamp(1, image_height.max(1));

        Self {
            x: (image_width - width) / 2,
            y: (image_height - height) / 2,
            width,
            height,
        }
    }

    pub fn full(image_width: u32, image_height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: image_width,
            height: image_height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True when this window covers the whole `image_width` x `image_height` frame.
    pub fn is_full_frame(&self, image_width: u32, image_height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == image_width && self.height == image_height
    }

    /// Copies the window out of `image`.
    pub fn crop(&self, image: &RgbImage) -> RgbImage {
        image::imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_crops_a_centered_window() {
        let roi = Roi::centered(400, 300, 0.7);
        assert_eq!(roi.width, 280);
        assert_eq!(roi.height, 210);
        assert_eq!(roi.x, 60);
        assert_eq!(roi.y, 45);
    }

    #[test]
    fn odd_margins_use_integer_division() {
        let roi = Roi::centered(101, 51, 0.5);
        assert_eq!((roi.width, roi.height), (50, 25));
        assert_eq!((roi.x, roi.y), (25, 13));
    }

    #[test]
    fn out_of_range_ratios_select_the_full_image() {
        let full = Roi::full(640, 480);
        for ratio in [0.0, -0.3, 1.0, 1.5, f64::NAN, f64::INFINITY] {
            assert_eq!(Roi::centered(640, 480, ratio), full, "ratio {ratio}");
        }
        assert!(full.is_full_frame(640, 480));
    }

    #[test]
    fn tiny_ratio_keeps_at_least_one_pixel() {
        let roi = Roi::centered(10, 10, 0.01);
        assert_eq!((roi.width, roi.height), (1, 1));
        assert!(roi.x + roi.width <= 10 && roi.y + roi.height <= 10);
    }

    #[test]
    fn crop_copies_the_window_pixels() {
        let mut image = RgbImage::new(4, 4);
        image.put_pixel(1, 1, image::Rgb([9, 8, 7]));
        let roi = Roi { x: 1, y: 1, width: 2, height: 2 };
        let cropped = roi.crop(&image);
        assert_eq!(cropped.dimensions(), (2, 2));
        assert_eq!(cropped.get_pixel(0, 0).0, [9, 8, 7]);
    }
}
