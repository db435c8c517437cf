//! Geometric helpers for collision and support checks between placed boxes.
//!
//! All tests work on axis-aligned boxes. Collisions need a strict overlap on
//! every axis, so boxes that only touch at a shared face never collide.

use crate::model::PlacedBox;
use crate::types::{BoundingBox, EPSILON_HEIGHT};

/// `true` if the boxes overlap strictly on all three axes.
pub fn intersects(a: &PlacedBox, b: &PlacedBox) -> bool {
    a.bounding_box().intersects(&b.bounding_box())
}

/// Checks whether `upper` rests on the top face of `lower`.
///
/// The bottom of `upper` must lie at the top of `lower` and the two
/// footprints must overlap with positive area.
pub fn rests_on(upper: &BoundingBox, lower: &BoundingBox) -> bool {
    (upper.min.z - lower.top_z()).abs() <= EPSILON_HEIGHT && upper.footprint_overlaps(lower)
}

/// Checks whether a region stands on the pallet floor.
#[inline]
pub fn on_floor(region: &BoundingBox) -> bool {
    region.min.z.abs() <= EPSILON_HEIGHT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Box3D;
    use crate::types::Vec3;

    fn placed(id: usize, dims: (f64, f64, f64), pos: (f64, f64, f64)) -> PlacedBox {
        PlacedBox::new(
            Box3D::new(id, dims.0, dims.1, dims.2, 10.0).unwrap(),
            Vec3::from(pos),
        )
    }

    #[test]
    fn overlapping_boxes_collide() {
        let a = placed(1, (30.0, 30.0, 20.0), (0.0, 0.0, 0.0));
        let b = placed(2, (30.0, 30.0, 20.0), (29.0, 29.0, 19.0));
        assert!(intersects(&a, &b));
        assert!(intersects(&b, &a));
    }

    #[test]
    fn shared_faces_do_not_collide() {
        let a = placed(1, (30.0, 30.0, 20.0), (0.0, 0.0, 0.0));
        let right = placed(2, (30.0, 30.0, 20.0), (30.0, 0.0, 0.0));
        let behind = placed(3, (30.0, 30.0, 20.0), (0.0, 30.0, 0.0));
        let above = placed(4, (30.0, 30.0, 20.0), (0.0, 0.0, 20.0));

        assert!(!intersects(&a, &right));
        assert!(!intersects(&a, &behind));
        assert!(!intersects(&a, &above));
    }

    #[test]
    fn rests_on_requires_matching_height_and_footprint() {
        let base = placed(1, (30.0, 30.0, 20.0), (0.0, 0.0, 0.0)).bounding_box();
        let on_top = placed(2, (20.0, 20.0, 20.0), (5.0, 5.0, 20.0)).bounding_box();
        let floating = placed(3, (20.0, 20.0, 20.0), (5.0, 5.0, 25.0)).bounding_box();
        let edge_only = placed(4, (20.0, 20.0, 20.0), (30.0, 0.0, 20.0)).bounding_box();

        assert!(rests_on(&on_top, &base));
        assert!(!rests_on(&floating, &base));
        assert!(!rests_on(&edge_only, &base));
        assert!(on_floor(&base));
        assert!(!on_floor(&on_top));
    }
}
