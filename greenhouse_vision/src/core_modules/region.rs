// THEORY:
// A `Region` is one connected patch of vegetation, described by its outer boundary.
// It is the hand-off between spatial grouping (the region extractor) and geometry
// (the height estimator).
//
// Key architectural principles:
// 1.  **Boundary, not pixels**: only the external contour is kept. Area and extent
//     are derived from the boundary, which is all the estimator needs.
// 2.  **Stateless Data Container**: a region belongs to one image and one call.
//     It knows nothing about other regions or other frames.
// 3.  **Stable identity within a call**: `scan_index` records the order in which
//     the border follower discovered the region (top-to-bottom, left-to-right).
//     It is the tie-breaker when two regions have the same area.

use imageproc::point::Point;

/// A single, spatially coherent patch of vegetation in the ROI mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Discovery order in the raster scan of the mask; 0 is found first.
    pub scan_index: usize,
    /// Outer boundary points in ROI coordinates, in traversal order.
    pub boundary: Vec<Point<i32>>,
    /// Area enclosed by the boundary polygon, in square pixels.
    pub area: f64,
}

impl Region {
    pub fn new(scan_index: usize, boundary: Vec<Point<i32>>) -> Self {
        let area = polygon_area(&boundary);
        Self {
            scan_index,
            boundary,
            area,
        }
    }

    /// Smallest and largest y over every boundary point, or `None` for an empty boundary.
    pub fn vertical_extent(&self) -> Option<(i32, i32)> {
        let first = self.boundary.first()?;
        Some(
            self.boundary
                .iter()
                .fold((first.y, first.y), |(min_y, max_y), p| {
                    (min_y.min(p.y), max_y.max(p.y))
                }),
        )
    }
}

/// Shoelace area of the closed polygon through `points`.
///
/// Boundary pixels sit on the polygon's vertices, so a one-pixel-wide line or a
/// lone pixel encloses no area.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();

    twice_area.abs() as f64 / 2.0
}
