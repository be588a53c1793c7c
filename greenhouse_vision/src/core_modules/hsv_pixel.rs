// THEORY (single-pixel color model):
// The `HsvPixel` is the smallest unit the segmenter reasons about. It converts one
// RGB sample into hue / saturation / value so that "is this green?" becomes a range
// check on hue, independent of how bright the scene is.
//
// Conventions:
// - 8-bit HSV, the layout most camera tooling uses:
//   • hue:        [0, 180), i.e. degrees / 2, so it fits a byte
//   • saturation: [0, 255], chroma / value scaled to a byte
//   • value:      [0, 255], the largest channel
// - Achromatic pixels (chroma == 0) report hue 0 and saturation 0.
//
// Single-pixel scope: nothing in here reads neighbors. Spatial work belongs to the
// mask refiner and region extractor.

pub mod hsv_pixel {
    use image::Rgb;

    pub type Hue = u8;
    pub type Saturation = u8;
    pub type Value = u8;

    /// Hue range of the 8-bit convention (exclusive upper bound).
    pub const HUE_RANGE: u16 = 180;

    /// A "dumb" data container holding one pixel in 8-bit HSV.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HsvPixel {
        /// Hue in half-degrees (0-179).
        pub hue: Hue,
        /// Saturation (0-255).
        pub saturation: Saturation,
        /// Value / brightness (0-255).
        pub value: Value,
    }

    impl HsvPixel {
        pub fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
            let maximum_channel = red.max(green).max(blue);
            let minimum_channel = red.min(green).min(blue);
            let chroma = (maximum_channel - minimum_channel) as f32;

            if maximum_channel == 0 || chroma == 0.0 {
                return Self {
                    hue: 0,
                    saturation: 0,
                    value: maximum_channel,
                };
            }

            let saturation = (255.0 * chroma / maximum_channel as f32).round() as u8;

            let (r, g, b) = (red as f32, green as f32, blue as f32);
            let (base_difference, sector_offset) = if maximum_channel == red {
                (g - b, 0.0)
            } else if maximum_channel == green {
                (b - r, 2.0)
            } else {
                (r - g, 4.0)
            };

            let mut hue_degrees = (base_difference / chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }

            // Halve into a byte; 359.x degrees would round up to 180, wrap it to 0.
            let hue = ((hue_degrees / 2.0).round() as u16) % HUE_RANGE;

            Self {
                hue: hue as Hue,
                saturation,
                value: maximum_channel,
            }
        }
    }

    impl From<&Rgb<u8>> for HsvPixel {
        fn from(pixel: &Rgb<u8>) -> Self {
            let [red, green, blue] = pixel.0;
            Self::from_rgb(red, green, blue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::hsv_pixel::HsvPixel;

    #[test]
    fn primaries_land_on_expected_half_degree_hues() {
        assert_eq!(HsvPixel::from_rgb(255, 0, 0).hue, 0);
        assert_eq!(HsvPixel::from_rgb(0, 255, 0).hue, 60);
        assert_eq!(HsvPixel::from_rgb(0, 0, 255).hue, 120);
    }

    #[test]
    fn pure_green_is_fully_saturated_and_bright() {
        let pixel = HsvPixel::from_rgb(0, 255, 0);
        assert_eq!(pixel.saturation, 255);
        assert_eq!(pixel.value, 255);
    }

    #[test]
    fn gray_has_no_hue_or_saturation() {
        let pixel = HsvPixel::from_rgb(128, 128, 128);
        assert_eq!(pixel.hue, 0);
        assert_eq!(pixel.saturation, 0);
        assert_eq!(pixel.value, 128);
    }

    #[test]
    fn black_is_all_zero() {
        assert_eq!(HsvPixel::from_rgb(0, 0, 0), HsvPixel::default());
    }

    #[test]
    fn near_red_magenta_wraps_to_zero_instead_of_180() {
        // 359.x degrees
        let pixel = HsvPixel::from_rgb(255, 0, 1);
        assert!(pixel.hue < 180);
    }
}
