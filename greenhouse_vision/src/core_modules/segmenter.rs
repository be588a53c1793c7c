// THEORY:
// The segmenter turns the cropped photograph into a binary vegetation mask. Each
// pixel is classified on its own (see `HsvPixel`): it counts as plant when its hue
// sits inside the green band AND it is both saturated and bright enough. The last
// two conditions reject gray pots, white walls and deep shadows whose hue is
// numerically "green" but meaningless.

use crate::core_modules::hsv_pixel::hsv_pixel::HsvPixel;
use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

/// Mask value for vegetation pixels.
pub const FOREGROUND: u8 = 255;
/// Mask value for everything else.
pub const BACKGROUND: u8 = 0;

/// Inclusive HSV range that counts as vegetation, in 8-bit HSV units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HsvBand {
    /// Lowest accepted hue (0-179). 30 is roughly yellow-green.
    pub hue_min: u8,
    /// Highest accepted hue (0-179). 90 is roughly cyan-green.
    pub hue_max: u8,
    /// Minimum saturation; rejects near-gray pixels.
    pub saturation_min: u8,
    /// Minimum value; rejects near-black pixels such as shadows.
    pub value_min: u8,
}

impl Default for HsvBand {
    fn default() -> Self {
        Self {
            hue_min: 30,
            hue_max: 90,
            saturation_min: 40,
            value_min: 40,
        }
    }
}

impl HsvBand {
    pub fn contains(&self, pixel: &HsvPixel) -> bool {
        pixel.hue >= self.hue_min
            && pixel.hue <= self.hue_max
            && pixel.saturation >= self.saturation_min
            && pixel.value >= self.value_min
    }
}

/// Classifies every pixel of `roi_image`, producing a mask of the same size.
pub fn segment_vegetation(roi_image: &RgbImage, band: &HsvBand) -> GrayImage {
    let (width, height) = roi_image.dimensions();
    let mut mask = GrayImage::new(width, height);

    for (x, y, pixel) in roi_image.enumerate_pixels() {
        if band.contains(&HsvPixel::from(pixel)) {
            mask.put_pixel(x, y, Luma([FOREGROUND]));
        }
    }

    mask
}

/// Number of vegetation pixels in a mask.
pub fn foreground_count(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p.0[0] != BACKGROUND).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn green_pixels_become_foreground() {
        let image = RgbImage::from_pixel(3, 2, Rgb([40, 180, 60]));
        let mask = segment_vegetation(&image, &HsvBand::default());
        assert_eq!(mask.dimensions(), (3, 2));
        assert_eq!(foreground_count(&mask), 6);
    }

    #[test]
    fn red_soil_gray_pot_and_shadow_are_rejected() {
        let band = HsvBand::default();
        for rgb in [[200, 30, 30], [128, 128, 128], [10, 25, 12], [255, 255, 255]] {
            let image = RgbImage::from_pixel(1, 1, Rgb(rgb));
            let mask = segment_vegetation(&image, &band);
            assert_eq!(foreground_count(&mask), 0, "{rgb:?} should not be vegetation");
        }
    }

    #[test]
    fn band_limits_are_inclusive() {
        let band = HsvBand {
            hue_min: 60,
            hue_max: 60,
            saturation_min: 255,
            value_min: 255,
        };
        let pixel = HsvPixel::from_rgb(0, 255, 0);
        assert!(band.contains(&pixel));
    }

    #[test]
    fn only_the_green_half_is_marked() {
        let mut image = RgbImage::from_pixel(4, 1, Rgb([220, 20, 20]));
        image.put_pixel(2, 0, Rgb([0, 200, 0]));
        image.put_pixel(3, 0, Rgb([0, 200, 0]));
        let mask = segment_vegetation(&image, &HsvBand::default());
        let row: Vec<u8> = mask.pixels().map(|p| p.0[0]).collect();
        assert_eq!(row, vec![BACKGROUND, BACKGROUND, FOREGROUND, FOREGROUND]);
    }
}
