// THEORY:
// The `contour` module bridges the segmentation mask and the geometry toolkit. It
// turns the per-pixel foreground map into the single polygon that best represents
// the subject's silhouette, and answers "where does this ray leave the body?".
//
// Key architectural principles & algorithm steps:
// 1.  **Binarize**: The probability mask is thresholded at 0.5.
// 2.  **Border Following**: `imageproc` traces every border in the binary image.
//     Only top-level outer borders are kept, which is the "external retrieval"
//     mode: holes and islands inside holes are ignored.
// 3.  **Largest Wins**: The outer border with the largest enclosed area is taken
//     as the subject. Stray foreground specks lose to the body.
// 4.  **Cyclic Edge Walk**: Ray queries walk every edge of the polygon, including
//     the closing edge from the last point back to the first, and keep the hit
//     nearest along the ray.

use crate::core_modules::geometry::{Point2, RayHit, polygon_area, ray_segment_intersection};
use crate::core_modules::landmark::SegmentationMask;
use imageproc::contours::{BorderType, find_contours};

pub mod contour_walk {
    use super::*; // Make imports from parent module available.

    /// Extracts the largest external contour of the mask's foreground.
    /// Returns `None` when the mask has no foreground at all.
    pub fn largest_external_contour(mask: &SegmentationMask) -> Option<Vec<Point2>> {
        let binary = mask.to_binary();
        let contours = find_contours::<i32>(&binary);

        contours
            .into_iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
            .map(|c| {
                c.points
                    .iter()
                    .map(|p| Point2::new(p.x as f64, p.y as f64))
                    .collect::<Vec<_>>()
            })
            .filter(|points| !points.is_empty())
            .max_by(|a, b| polygon_area(a).total_cmp(&polygon_area(b)))
    }

    /// Finds the intersection of the ray with the closed polygon that lies
    /// nearest to the origin. Near-parallel edges are skipped.
    pub fn nearest_ray_hit(contour: &[Point2], origin: Point2, dir: Point2) -> Option<RayHit> {
        if contour.len() < 2 {
            return None;
        }
        let edges = contour.iter().zip(contour.iter().cycle().skip(1));

        let mut best: Option<RayHit> = None;
        for (a, b) in edges {
            if let Some(hit) = ray_segment_intersection(origin, dir, *a, *b) {
                if best.is_none_or(|current| hit.t < current.t) {
                    best = Some(hit);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::contour_walk::*;
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rect_mask(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> SegmentationMask {
        let mut probs = vec![0.0f32; (width * height) as usize];
        for y in y0..=y1 {
            for x in x0..=x1 {
                probs[(y * width + x) as usize] = 1.0;
            }
        }
        SegmentationMask::new(width, height, probs).expect("mask dims")
    }

    #[test]
    fn empty_mask_has_no_contour() {
        let mask = SegmentationMask::new(8, 8, vec![0.0; 64]).expect("mask dims");
        assert!(largest_external_contour(&mask).is_none());
    }

    #[test]
    fn picks_largest_blob() {
        let mut mask = rect_mask(40, 40, 5, 5, 25, 30);
        // A small speck far away from the main body.
        let mut probs: Vec<f32> = (0..40 * 40)
            .map(|i| mask.probability(i % 40, i / 40))
            .collect();
        for y in 34..=36 {
            for x in 34..=36 {
                probs[(y * 40 + x) as usize] = 1.0;
            }
        }
        mask = SegmentationMask::new(40, 40, probs).expect("mask dims");

        let contour = largest_external_contour(&mask).expect("foreground present");
        let max_x = contour.iter().map(|p| p.x).fold(f64::MIN, f64::max);
        let min_x = contour.iter().map(|p| p.x).fold(f64::MAX, f64::min);
        assert_abs_diff_eq!(min_x, 5.0);
        assert_abs_diff_eq!(max_x, 25.0);
    }

    #[test]
    fn ray_exits_rectangle_on_near_side() {
        let mask = rect_mask(40, 40, 10, 10, 30, 30);
        let contour = largest_external_contour(&mask).expect("foreground present");

        let hit = nearest_ray_hit(&contour, Point2::new(20.0, 20.0), Point2::new(1.0, 0.0))
            .expect("ray leaves the rectangle");
        assert_abs_diff_eq!(hit.point.x, 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(hit.point.y, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn closing_edge_is_walked() {
        let triangle = [Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), Point2::new(0.0, 10.0)];
        // Only the closing edge (0,10)->(0,0) lies on the ray's path.
        let hit = nearest_ray_hit(&triangle, Point2::new(2.0, 2.0), Point2::new(-1.0, 0.0))
            .expect("hits the closing edge");
        assert_abs_diff_eq!(hit.point.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(hit.t, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn ray_pointing_away_misses() {
        let segment = [Point2::new(5.0, -1.0), Point2::new(5.0, 1.0)];
        assert!(nearest_ray_hit(&segment, Point2::new(0.0, 0.0), Point2::new(-1.0, 0.0)).is_none());
    }
}
