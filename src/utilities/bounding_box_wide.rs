use glam::{BVec4A, Mat4, Vec3, Vec4};

use crate::physics::collidables::ray::RayInvDirection;
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::oriented_box::OrientedBox;

/// Number of bounding boxes stored in a single block.
pub const BLOCK_WIDTH: usize = 4;

/// Four axis aligned bounding boxes in structure of arrays layout: lane `i` of every component belongs to box `i`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBoxWide {
    pub min_x: Vec4,
    pub min_y: Vec4,
    pub min_z: Vec4,
    pub max_x: Vec4,
    pub max_y: Vec4,
    pub max_z: Vec4,
}

impl BoundingBoxWide {
    /// Transposes four boxes into structure of arrays form.
    #[inline]
    pub fn from_boxes(boxes: &[BoundingBox; BLOCK_WIDTH]) -> Self {
        // Put the boxes in the columns of a matrix; the transpose then holds one axis per column.
        let mins = Mat4::from_cols(
            boxes[0].min.extend(0.0),
            boxes[1].min.extend(0.0),
            boxes[2].min.extend(0.0),
            boxes[3].min.extend(0.0),
        )
        .transpose();
        let maxs = Mat4::from_cols(
            boxes[0].max.extend(0.0),
            boxes[1].max.extend(0.0),
            boxes[2].max.extend(0.0),
            boxes[3].max.extend(0.0),
        )
        .transpose();
        Self {
            min_x: mins.x_axis,
            min_y: mins.y_axis,
            min_z: mins.z_axis,
            max_x: maxs.x_axis,
            max_y: maxs.y_axis,
            max_z: maxs.z_axis,
        }
    }

    /// Extracts the box stored in `slot`.
    #[inline]
    pub fn get(&self, slot: usize) -> BoundingBox {
        debug_assert!(slot < BLOCK_WIDTH, "Slot must be within the block.");
        BoundingBox::new(
            Vec3::new(self.min_x[slot], self.min_y[slot], self.min_z[slot]),
            Vec3::new(self.max_x[slot], self.max_y[slot], self.max_z[slot]),
        )
    }

    /// Grows all four boxes by `extent` on every side.
    #[inline(always)]
    pub fn enlarged(&self, extent: Vec3) -> Self {
        let (ex, ey, ez) = (Vec4::splat(extent.x), Vec4::splat(extent.y), Vec4::splat(extent.z));
        Self {
            min_x: self.min_x - ex,
            min_y: self.min_y - ey,
            min_z: self.min_z - ez,
            max_x: self.max_x + ex,
            max_y: self.max_y + ey,
            max_z: self.max_z + ez,
        }
    }

    /// Intersects a ray with all four boxes.
    /// Each lane holds the entry fraction (negative when the origin is inside) or `f32::MAX` on a miss.
    #[inline]
    pub fn ray_fractions(&self, origin: Vec3, inv_direction: &RayInvDirection) -> Vec4 {
        let flt_min = Vec4::splat(-f32::MAX);
        let flt_max = Vec4::splat(f32::MAX);

        let origin_x = Vec4::splat(origin.x);
        let origin_y = Vec4::splat(origin.y);
        let origin_z = Vec4::splat(origin.z);

        let parallel_x = BVec4A::splat(inv_direction.is_parallel.x);
        let parallel_y = BVec4A::splat(inv_direction.is_parallel.y);
        let parallel_z = BVec4A::splat(inv_direction.is_parallel.z);

        let inv_x = Vec4::splat(inv_direction.inv_direction.x);
        let inv_y = Vec4::splat(inv_direction.inv_direction.y);
        let inv_z = Vec4::splat(inv_direction.inv_direction.z);

        // Intersect the ray with the slabs
        let t1_x = (self.min_x - origin_x) * inv_x;
        let t1_y = (self.min_y - origin_y) * inv_y;
        let t1_z = (self.min_z - origin_z) * inv_z;
        let t2_x = (self.max_x - origin_x) * inv_x;
        let t2_y = (self.max_y - origin_y) * inv_y;
        let t2_z = (self.max_z - origin_z) * inv_z;

        let t_min_x = Vec4::select(parallel_x, flt_min, t1_x.min(t2_x));
        let t_min_y = Vec4::select(parallel_y, flt_min, t1_y.min(t2_y));
        let t_min_z = Vec4::select(parallel_z, flt_min, t1_z.min(t2_z));
        let t_max_x = Vec4::select(parallel_x, flt_max, t1_x.max(t2_x));
        let t_max_y = Vec4::select(parallel_y, flt_max, t1_y.max(t2_y));
        let t_max_z = Vec4::select(parallel_z, flt_max, t1_z.max(t2_z));

        let t_min = t_min_x.max(t_min_y).max(t_min_z);
        let t_max = t_max_x.min(t_max_y).min(t_max_z);

        let mut no_intersection = t_min.cmpgt(t_max) | t_max.cmplt(Vec4::ZERO);

        // A parallel ray has to start between the slabs.
        no_intersection |= parallel_x & (origin_x.cmplt(self.min_x) | origin_x.cmpgt(self.max_x));
        no_intersection |= parallel_y & (origin_y.cmplt(self.min_y) | origin_y.cmpgt(self.max_y));
        no_intersection |= parallel_z & (origin_z.cmplt(self.min_z) | origin_z.cmpgt(self.max_z));

        Vec4::select(no_intersection, flt_max, t_min)
    }

    /// Tests which of the four boxes overlap `bounds`. Touching boxes count as overlapping.
    #[inline]
    pub fn overlaps_box(&self, bounds: &BoundingBox) -> BVec4A {
        let no_overlap_x = Vec4::splat(bounds.min.x).cmpgt(self.max_x)
            | self.min_x.cmpgt(Vec4::splat(bounds.max.x));
        let no_overlap_y = Vec4::splat(bounds.min.y).cmpgt(self.max_y)
            | self.min_y.cmpgt(Vec4::splat(bounds.max.y));
        let no_overlap_z = Vec4::splat(bounds.min.z).cmpgt(self.max_z)
            | self.min_z.cmpgt(Vec4::splat(bounds.max.z));
        !(no_overlap_x | no_overlap_y | no_overlap_z)
    }

    /// Tests which of the four boxes contain `point`, surface included.
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> BVec4A {
        let (x, y, z) = (Vec4::splat(point.x), Vec4::splat(point.y), Vec4::splat(point.z));
        x.cmpge(self.min_x)
            & x.cmple(self.max_x)
            & y.cmpge(self.min_y)
            & y.cmple(self.max_y)
            & z.cmpge(self.min_z)
            & z.cmple(self.max_z)
    }

    /// Tests which of the four boxes overlap an oriented box with the separating axis test.
    /// `epsilon` is added to the absolute rotation terms to stay robust when edges are near parallel.
    pub fn overlaps_oriented_box(&self, oriented: &OrientedBox, epsilon: f32) -> BVec4A {
        // The axis aligned boxes are A, the oriented box is B. r[i][j] is the i-th component of B's j-th axis.
        let basis = oriented.basis();
        let columns = [basis.x_axis, basis.y_axis, basis.z_axis];
        let mut r = [[0.0f32; 3]; 3];
        let mut abs_r = [[0.0f32; 3]; 3];
        for (j, column) in columns.iter().enumerate() {
            for i in 0..3 {
                r[i][j] = column[i];
                abs_r[i][j] = column[i].abs() + epsilon;
            }
        }

        let half = Vec4::splat(0.5);
        let center = oriented.pose.position;
        // Translation of B relative to the center of each A.
        let t = [
            Vec4::splat(center.x) - half * (self.min_x + self.max_x),
            Vec4::splat(center.y) - half * (self.min_y + self.max_y),
            Vec4::splat(center.z) - half * (self.min_z + self.max_z),
        ];
        let a = [
            half * (self.max_x - self.min_x),
            half * (self.max_y - self.min_y),
            half * (self.max_z - self.min_z),
        ];
        let b = oriented.half_extents;

        let mut overlapping = BVec4A::splat(true);

        // Axes L = A0, A1, A2
        for i in 0..3 {
            let rb = b.x * abs_r[i][0] + b.y * abs_r[i][1] + b.z * abs_r[i][2];
            overlapping &= t[i].abs().cmple(a[i] + Vec4::splat(rb));
        }

        // Axes L = B0, B1, B2
        for j in 0..3 {
            let ra = a[0] * abs_r[0][j] + a[1] * abs_r[1][j] + a[2] * abs_r[2][j];
            let distance = t[0] * r[0][j] + t[1] * r[1][j] + t[2] * r[2][j];
            overlapping &= distance.abs().cmple(ra + Vec4::splat(b[j]));
        }

        // Axes L = Ai x Bj. For axis i the two other axes are (i + 1) % 3 and (i + 2) % 3, likewise for j.
        for i in 0..3 {
            let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
            for j in 0..3 {
                let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
                let ra = a[i1] * abs_r[i2][j] + a[i2] * abs_r[i1][j];
                let rb = b[j1] * abs_r[i][j2] + b[j2] * abs_r[i][j1];
                let distance = t[i2] * r[i1][j] - t[i1] * r[i2][j];
                overlapping &= distance.abs().cmple(ra + Vec4::splat(rb));
            }
        }

        overlapping
    }
}

/// Reads a single lane of a block test mask.
#[inline(always)]
pub fn lane_set(mask: BVec4A, slot: usize) -> bool {
    mask.bitmask() & (1 << slot) != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body_properties::RigidPose;
    use glam::Quat;

    fn unit_boxes_along_x() -> BoundingBoxWide {
        BoundingBoxWide::from_boxes(&[
            BoundingBox::from_center_and_extent(Vec3::new(0.0, 0.0, 0.0), Vec3::ONE),
            BoundingBox::from_center_and_extent(Vec3::new(3.0, 0.0, 0.0), Vec3::ONE),
            BoundingBox::from_center_and_extent(Vec3::new(6.0, 0.0, 0.0), Vec3::ONE),
            BoundingBox::from_center_and_extent(Vec3::new(9.0, 0.0, 0.0), Vec3::ONE),
        ])
    }

    #[test]
    fn transpose_preserves_boxes() {
        let wide = unit_boxes_along_x();
        for slot in 0..BLOCK_WIDTH {
            let expected = BoundingBox::from_center_and_extent(
                Vec3::new(3.0 * slot as f32, 0.0, 0.0),
                Vec3::ONE,
            );
            assert_eq!(wide.get(slot), expected);
        }
    }

    #[test]
    fn wide_ray_test_matches_scalar_test() {
        let wide = unit_boxes_along_x();
        let origin = Vec3::new(-5.0, 0.5, 0.0);
        let inv = RayInvDirection::new(Vec3::new(20.0, 0.0, 0.0));
        let fractions = wide.ray_fractions(origin, &inv);
        for slot in 0..BLOCK_WIDTH {
            assert_eq!(fractions[slot], wide.get(slot).ray_fraction(origin, &inv));
        }
        assert!(fractions[0] < fractions[1]);

        let miss = wide.ray_fractions(Vec3::new(-5.0, 5.0, 0.0), &inv);
        assert_eq!(miss, Vec4::splat(f32::MAX));
    }

    #[test]
    fn point_and_box_masks() {
        let wide = unit_boxes_along_x();
        assert_eq!(wide.contains_point(Vec3::new(3.5, 0.0, 0.0)).bitmask(), 0b0010);
        assert_eq!(wide.contains_point(Vec3::new(1.0, 1.0, 1.0)).bitmask(), 0b0001);

        let query = BoundingBox::new(Vec3::new(2.5, -0.5, -0.5), Vec3::new(5.5, 0.5, 0.5));
        assert_eq!(wide.overlaps_box(&query).bitmask(), 0b0110);
        assert!(lane_set(wide.overlaps_box(&query), 1));
        assert!(!lane_set(wide.overlaps_box(&query), 3));
    }

    #[test]
    fn oriented_box_test_agrees_with_axis_aligned_test_for_identity() {
        let wide = unit_boxes_along_x();
        let query = BoundingBox::new(Vec3::new(2.5, -0.5, -0.5), Vec3::new(5.5, 0.5, 0.5));
        let oriented = OrientedBox::from_transformed_box(&RigidPose::IDENTITY, &query);
        assert_eq!(
            wide.overlaps_oriented_box(&oriented, 1.0e-6).bitmask(),
            wide.overlaps_box(&query).bitmask()
        );
    }

    #[test]
    fn rotated_box_separates_on_edge_axis() {
        // A long thin box rotated 45 degrees about z crosses the first two boxes diagonally.
        let wide = unit_boxes_along_x();
        let oriented = OrientedBox::new(
            RigidPose::new(
                Vec3::new(1.5, 0.0, 0.0),
                Quat::from_rotation_z(std::f32::consts::FRAC_PI_4),
            ),
            Vec3::new(0.1, 10.0, 0.1),
        );
        let mask = wide.overlaps_oriented_box(&oriented, 1.0e-6);
        assert!(lane_set(mask, 0));
        assert!(lane_set(mask, 1));
        assert!(!lane_set(mask, 2));
        assert!(!lane_set(mask, 3));

        let far = OrientedBox::new(
            RigidPose::new(
                Vec3::new(1.5, 3.0, 0.0),
                Quat::from_rotation_z(std::f32::consts::FRAC_PI_4),
            ),
            Vec3::new(0.1, 0.5, 0.1),
        );
        assert_eq!(wide.overlaps_oriented_box(&far, 1.0e-6).bitmask(), 0);
    }
}
