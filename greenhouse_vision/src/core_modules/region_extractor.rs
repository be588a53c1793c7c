// THEORY:
// The `RegionExtractor` is the spatial grouping stage. It turns the refined mask
// into a list of connected regions and then decides which one is "the plant".
//
// Algorithm steps:
// 1.  **Border Following**: the mask is traced with a Suzuki-style border
//     follower. Only outer borders without a parent are kept, so holes inside a
//     leaf and islands inside those holes never become regions of their own.
// 2.  **Area Filtering**: every region smaller than `min_area_ratio` of the ROI is
//     discarded. Reflections, single fallen leaves and color noise that survived
//     the refiner die here.
// 3.  **Largest Wins**: of the survivors, the region with the largest enclosed area
//     is selected. This assumes one dominant plant fills most of the frame; it is
//     a heuristic, not a guarantee.
// 4.  **Deterministic Ties**: the border follower discovers regions in raster order
//     (top-to-bottom, then left-to-right, by the first pixel of each region). On
//     equal area the earlier region wins.
//
// Stateless utility: one mask in, one decision out.

use crate::core_modules::region::Region;
use crate::error::MeasurementError;
use image::imageops::replace;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

pub mod region_extractor {
    use super::*;

    /// Default fraction of the ROI area a region must cover to be considered.
    pub const DEFAULT_MIN_AREA_RATIO: f64 = 0.05;

    /// Finds every external region of the mask, in raster discovery order.
    ///
    /// The border follower only opens an outer border after a background pixel,
    /// so the mask is traced inside a one-pixel background frame and the points
    /// are shifted back into mask coordinates.
    pub fn extract_regions(mask: &GrayImage) -> Vec<Region> {
        let padded = pad_with_background(mask);

        find_contours::<i32>(&padded)
            .into_iter()
            .filter(|contour| matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none())
            .enumerate()
            .map(|(scan_index, contour)| {
                let boundary = contour
                    .points
                    .into_iter()
                    .map(|p| Point::new(p.x - 1, p.y - 1))
                    .collect();
                Region::new(scan_index, boundary)
            })
            .collect()
    }

    fn pad_with_background(mask: &GrayImage) -> GrayImage {
        let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
        replace(&mut padded, mask, 1, 1);
        padded
    }

    /// Applies the area filter and picks the largest surviving region.
    ///
    /// `roi_area` is the pixel count of the ROI the mask was built from. A
    /// non-positive `min_area_ratio` disables the filter.
    pub fn select_plant_region(
        regions: Vec<Region>,
        roi_area: u64,
        min_area_ratio: f64,
    ) -> Result<Region, MeasurementError> {
        if regions.is_empty() {
            return Err(MeasurementError::NoVegetationDetected);
        }

        let min_area = if min_area_ratio > 0.0 {
            min_area_ratio * roi_area as f64
        } else {
            0.0
        };

        let largest_area = regions.iter().map(|r| r.area).fold(0.0_f64, f64::max);

        let mut selected: Option<Region> = None;
        for region in regions.into_iter().filter(|r| r.area >= min_area) {
            // Strictly greater: an equal area never displaces an earlier region.
            let replaces = match &selected {
                Some(best) => region.area > best.area,
                None => true,
            };
            if replaces {
                selected = Some(region);
            }
        }

        selected.ok_or(MeasurementError::RegionTooSmall {
            largest_area,
            min_area,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::region_extractor::*;
    use super::*;
    use crate::core_modules::segmenter::FOREGROUND;
    use image::Luma;

    fn filled_rect(mask: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }

    fn clear_rect(mask: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
    }

    #[test]
    fn empty_mask_has_no_regions() {
        let mask = GrayImage::new(20, 20);
        assert!(extract_regions(&mask).is_empty());
        assert_eq!(
            select_plant_region(Vec::new(), 400, DEFAULT_MIN_AREA_RATIO),
            Err(MeasurementError::NoVegetationDetected)
        );
    }

    #[test]
    fn separate_blobs_are_separate_regions_in_scan_order() {
        let mut mask = GrayImage::new(60, 60);
        filled_rect(&mut mask, 40, 5, 50, 15);
        filled_rect(&mut mask, 5, 30, 20, 50);
        let regions = extract_regions(&mask);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].scan_index, 0);
        assert_eq!(regions[0].vertical_extent(), Some((5, 15)));
        assert_eq!(regions[1].vertical_extent(), Some((30, 50)));
    }

    #[test]
    fn holes_and_islands_do_not_become_regions() {
        let mut mask = GrayImage::new(60, 60);
        filled_rect(&mut mask, 5, 5, 54, 54);
        clear_rect(&mut mask, 15, 15, 44, 44);
        filled_rect(&mut mask, 25, 25, 34, 34);
        let regions = extract_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].vertical_extent(), Some((5, 54)));
    }

    #[test]
    fn area_matches_the_filled_rectangle_polygon() {
        let mut mask = GrayImage::new(30, 30);
        filled_rect(&mut mask, 5, 5, 14, 14);
        let regions = extract_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 81.0);
    }

    #[test]
    fn largest_region_wins() {
        let mut mask = GrayImage::new(100, 100);
        filled_rect(&mut mask, 5, 5, 15, 15);
        filled_rect(&mut mask, 40, 30, 90, 95);
        let selected = select_plant_region(extract_regions(&mask), 10_000, 0.01).unwrap();
        assert_eq!(selected.vertical_extent(), Some((30, 95)));
    }

    #[test]
    fn equal_areas_resolve_to_first_in_raster_order() {
        let mut mask = GrayImage::new(100, 100);
        filled_rect(&mut mask, 60, 10, 79, 29);
        filled_rect(&mut mask, 10, 60, 29, 79);
        let selected = select_plant_region(extract_regions(&mask), 10_000, 0.0).unwrap();
        assert_eq!(selected.scan_index, 0);
        assert_eq!(selected.vertical_extent(), Some((10, 29)));
    }

    #[test]
    fn undersized_regions_are_rejected() {
        let mut mask = GrayImage::new(100, 100);
        filled_rect(&mut mask, 10, 10, 19, 19);
        let result = select_plant_region(extract_regions(&mask), 10_000, DEFAULT_MIN_AREA_RATIO);
        assert_eq!(
            result,
            Err(MeasurementError::RegionTooSmall {
                largest_area: 81.0,
                min_area: 500.0,
            })
        );
    }

    #[test]
    fn blob_touching_the_left_edge_is_found() {
        let mut mask = GrayImage::new(40, 40);
        filled_rect(&mut mask, 0, 10, 12, 30);
        let regions = extract_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].vertical_extent(), Some((10, 30)));
        assert!(regions[0].boundary.iter().any(|p| p.x == 0));
        assert_eq!(regions[0].area, 12.0 * 20.0);
    }

    #[test]
    fn full_width_band_and_full_mask_are_found() {
        let mut band = GrayImage::new(50, 40);
        filled_rect(&mut band, 0, 10, 49, 29);
        let regions = extract_regions(&band);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].vertical_extent(), Some((10, 29)));

        let mut full = GrayImage::new(30, 20);
        filled_rect(&mut full, 0, 0, 29, 19);
        let regions = extract_regions(&full);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].vertical_extent(), Some((0, 19)));
        assert!(regions[0].boundary.iter().all(|p| p.x >= 0 && p.y >= 0 && p.x < 30 && p.y < 20));
    }

    #[test]
    fn single_pixel_in_the_corner_is_a_region() {
        let mut mask = GrayImage::new(1, 1);
        mask.put_pixel(0, 0, Luma([FOREGROUND]));
        let regions = extract_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].vertical_extent(), Some((0, 0)));
    }

    #[test]
    fn region_exactly_at_minimum_area_survives() {
        let mut mask = GrayImage::new(100, 100);
        filled_rect(&mut mask, 10, 10, 20, 20);
        // 10 x 10 polygon = 100 px, 1% of 10_000.
        assert!(select_plant_region(extract_regions(&mask), 10_000, 0.01).is_ok());
    }
}
