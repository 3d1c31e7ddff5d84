//! Query descriptions and results for point, shape overlap and shape sweep queries.

use glam::Vec3;

use crate::physics::body_properties::RigidPose;
use crate::physics::collidables::shape::{Shape, SubShapeId};
use crate::utilities::bounding_box::BoundingBox;

use super::collision_collector::CollisionResult;

/// Result of a point containment query.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollidePointResult {
    /// Sub shape that contains the point.
    pub sub_shape_id: SubShapeId,
}

impl CollisionResult for CollidePointResult {
    const INITIAL_EARLY_OUT_FRACTION: f32 = f32::MAX;
    const SHOULD_EARLY_OUT_FRACTION: f32 = -f32::MAX;

    #[inline(always)]
    fn early_out_fraction(&self) -> f32 {
        0.0
    }
}

/// Settings for shape-vs-shape overlap queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollideShapeSettings {
    /// Shapes further apart than this are not reported. Bounds are grown by this amount before testing.
    pub max_separation_distance: f32,
}

impl Default for CollideShapeSettings {
    fn default() -> Self {
        Self {
            max_separation_distance: 0.0,
        }
    }
}

/// Contact between two shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollideShapeResult {
    pub contact_point_on1: Vec3,
    pub contact_point_on2: Vec3,
    /// Direction to move shape 2 out of collision along the shortest path.
    pub penetration_axis: Vec3,
    /// Negative when the shapes are separated.
    pub penetration_depth: f32,
    pub sub_shape_id1: SubShapeId,
    pub sub_shape_id2: SubShapeId,
}

impl CollisionResult for CollideShapeResult {
    const INITIAL_EARLY_OUT_FRACTION: f32 = f32::MAX;
    const SHOULD_EARLY_OUT_FRACTION: f32 = -f32::MAX;

    #[inline(always)]
    fn early_out_fraction(&self) -> f32 {
        -self.penetration_depth
    }
}

/// Settings for shape sweeps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeCastSettings {
    /// Report a hit at fraction 0 when the cast starts inside a convex shape.
    pub treat_convex_as_solid: bool,
    /// When the cast starts in collision, look for the deepest point instead of any contact.
    pub return_deepest_point: bool,
}

impl Default for ShapeCastSettings {
    fn default() -> Self {
        Self {
            treat_convex_as_solid: true,
            return_deepest_point: false,
        }
    }
}

/// A shape swept from `center_of_mass_start` along `direction`.
#[derive(Debug, Clone, Copy)]
pub struct ShapeCast<'a> {
    pub shape: &'a dyn Shape,
    /// Transform of the shape's center of mass at the start of the sweep.
    pub center_of_mass_start: RigidPose,
    /// Sweep displacement. Hits are reported as a fraction of it.
    pub direction: Vec3,
    /// Bounds of the shape at the start of the sweep.
    pub shape_world_bounds: BoundingBox,
}

impl<'a> ShapeCast<'a> {
    pub fn new(shape: &'a dyn Shape, center_of_mass_start: RigidPose, direction: Vec3) -> Self {
        Self {
            shape,
            center_of_mass_start,
            direction,
            shape_world_bounds: shape.world_space_bounds(&center_of_mass_start),
        }
    }

    /// Expresses the cast in the space `transform` maps into.
    #[inline]
    pub fn post_transformed(&self, transform: &RigidPose) -> Self {
        Self::new(
            self.shape,
            *transform * self.center_of_mass_start,
            transform.orientation * self.direction,
        )
    }
}

/// Hit of a shape sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShapeCastResult {
    pub contact_point_on1: Vec3,
    pub contact_point_on2: Vec3,
    pub penetration_axis: Vec3,
    pub penetration_depth: f32,
    pub sub_shape_id1: SubShapeId,
    pub sub_shape_id2: SubShapeId,
    /// Fraction of the sweep at which the shapes first touch.
    pub fraction: f32,
    pub is_back_face_hit: bool,
}

impl CollisionResult for ShapeCastResult {
    const INITIAL_EARLY_OUT_FRACTION: f32 = 1.0 + f32::EPSILON;
    const SHOULD_EARLY_OUT_FRACTION: f32 = -f32::MAX;

    /// Hits at the start of the sweep are ordered by how deep they penetrate.
    #[inline(always)]
    fn early_out_fraction(&self) -> f32 {
        if self.fraction > 0.0 {
            self.fraction
        } else {
            -self.penetration_depth
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collidables::sphere::SphereShape;
    use glam::Quat;

    #[test]
    fn cast_bounds_follow_the_start_transform() {
        let sphere = SphereShape::new(1.0);
        let cast = ShapeCast::new(&sphere, RigidPose::from_position(Vec3::new(5.0, 0.0, 0.0)), Vec3::X);
        assert_eq!(cast.shape_world_bounds.center(), Vec3::new(5.0, 0.0, 0.0));

        let rotate = RigidPose::new(Vec3::ZERO, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        let moved = cast.post_transformed(&rotate);
        assert!(moved.center_of_mass_start.position.abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), 1e-5));
        assert!(moved.direction.abs_diff_eq(Vec3::Y, 1e-5));
        assert!(moved.shape_world_bounds.center().abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), 1e-5));
    }

    #[test]
    fn deeper_start_hits_sort_first() {
        let shallow = ShapeCastResult { fraction: 0.0, penetration_depth: 0.1, ..Default::default() };
        let deep = ShapeCastResult { fraction: 0.0, penetration_depth: 0.5, ..Default::default() };
        let later = ShapeCastResult { fraction: 0.4, ..Default::default() };
        assert!(deep.early_out_fraction() < shallow.early_out_fraction());
        assert!(shallow.early_out_fraction() < later.early_out_fraction());
    }
}
