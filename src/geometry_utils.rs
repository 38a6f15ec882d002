use crate::tracking::MotionBox;

pub fn distance(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    ((x2 - x1).powf(2.0) + (y2 - y1).powf(2.0)).sqrt()
}

/// Minimum distance between the boundaries of two non-intersecting boxes:
/// the axis gap where the boxes are separated on one axis only, otherwise the
/// distance between the nearest corners. Returns 0 for intersecting or
/// touching boxes.
pub fn edge_distance(a: &MotionBox, b: &MotionBox) -> f32 {
    let dx = if a.right() <= b.x {
        b.x - a.right()
    } else if b.right() <= a.x {
        a.x - b.right()
    } else {
        0
    };
    let dy = if a.bottom() <= b.y {
        b.y - a.bottom()
    } else if b.bottom() <= a.y {
        a.y - b.bottom()
    } else {
        0
    };
    distance(0., 0., dx as f32, dy as f32)
}

/// Area of a closed polygon via the shoelace formula. The contour point lists
/// produced by border following are valid input; fewer than 3 points yield 0.
pub fn polygon_area(points: &[(f32, f32)]) -> f32 {
    if points.len() < 3 {
        return 0.;
    }
    let mut sum = 0.;
    for (i, (x1, y1)) in points.iter().enumerate() {
        let (x2, y2) = points[(i + 1) % points.len()];
        sum += x1 * y2 - x2 * y1;
    }
    (sum * 0.5).abs()
}

/// Linearly-interpolated percentile of an unsorted sample, `p` in [0, 100].
/// An empty sample returns None rather than a made-up value.
pub fn percentile(values: &[f32], p: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0., 100.) / 100.) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let t = rank - lo as f32;
    Some(sorted[lo] * (1. - t) + sorted[hi] * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_distance_axis_gap() {
        let a = MotionBox::new(0, 0, 10, 10);
        let b = MotionBox::new(30, 0, 10, 10); // separated in x only
        assert_eq!(edge_distance(&a, &b), 20.);
        assert_eq!(edge_distance(&b, &a), 20.);
    }

    #[test]
    fn test_edge_distance_corner() {
        let a = MotionBox::new(0, 0, 10, 10);
        let b = MotionBox::new(13, 14, 10, 10); // diagonal gap 3,4
        assert_eq!(edge_distance(&a, &b), 5.);
    }

    #[test]
    fn test_edge_distance_zero_for_overlap_and_touch() {
        let a = MotionBox::new(0, 0, 10, 10);
        let overlapping = MotionBox::new(5, 5, 10, 10);
        let touching = MotionBox::new(10, 0, 10, 10);
        assert_eq!(edge_distance(&a, &overlapping), 0.);
        assert_eq!(edge_distance(&a, &touching), 0.);
    }

    #[test]
    fn test_polygon_area_square() {
        let square = [(0., 0.), (10., 0.), (10., 10.), (0., 10.)];
        assert_eq!(polygon_area(&square), 100.);
        assert_eq!(polygon_area(&square[..2]), 0.);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [4., 1., 3., 2.];
        assert_eq!(percentile(&values, 0.), Some(1.));
        assert_eq!(percentile(&values, 100.), Some(4.));
        assert_eq!(percentile(&values, 50.), Some(2.5));
        assert_eq!(percentile(&[], 50.), None);
    }

    #[test]
    fn test_box_union_and_intersection() {
        let a = MotionBox::new(0, 0, 10, 10);
        let b = MotionBox::new(5, 5, 10, 10);
        assert_eq!(a.union(&b), MotionBox::new(0, 0, 15, 15));
        assert_eq!(a.intersection_area(&b), 25.);

        let zero = MotionBox::new(3, 3, 0, 5);
        assert!(!zero.intersects(&a));
        assert_eq!(zero.intersection_area(&a), 0.);
    }

    #[test]
    fn test_box_expansion_clamps_to_frame() {
        let b = MotionBox::new(0, 0, 100, 100);
        let grown = b.expanded(0.5, 120, 120);
        assert_eq!(grown, MotionBox::new(0, 0, 120, 120));

        let inner = MotionBox::new(50, 50, 20, 20);
        let grown = inner.expanded(0.5, 640, 480);
        assert_eq!(grown, MotionBox::new(45, 45, 30, 30));
    }
}
