use glam::{BVec3, Vec3};

use crate::physics::body_properties::RigidPose;
use crate::physics::collidables::shape::SubShapeId;
use crate::physics::collision_detection::collision_collector::CollisionResult;

/// A ray segment. The direction carries the length of the ray: the segment runs from `origin` to `origin + direction`,
/// and hits are reported as a fraction of that segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCast {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl RayCast {
    #[inline(always)]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Point at `fraction` along the segment.
    #[inline(always)]
    pub fn point_on_ray(&self, fraction: f32) -> Vec3 {
        self.origin + fraction * self.direction
    }

    /// Moves the ray into the space described by `pose`.
    #[inline]
    pub fn transformed(&self, pose: &RigidPose) -> Self {
        Self {
            origin: pose.transform_point(self.origin),
            direction: pose.orientation * self.direction,
        }
    }

    /// Moves the ray out of the space described by `pose`, i.e. into the local space of something placed at `pose`.
    #[inline]
    pub fn inverse_transformed(&self, pose: &RigidPose) -> Self {
        Self {
            origin: pose.inverse_transform_point(self.origin),
            direction: pose.orientation.conjugate() * self.direction,
        }
    }
}

/// Result of a ray cast. The fraction starts just beyond the end of the ray so any hit on the segment is accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastResult {
    /// Fraction along the ray where the hit occurred.
    pub fraction: f32,
    /// Sub shape that was hit.
    pub sub_shape_id: SubShapeId,
}

impl Default for RayCastResult {
    fn default() -> Self {
        Self {
            fraction: Self::INITIAL_EARLY_OUT_FRACTION,
            sub_shape_id: SubShapeId::EMPTY,
        }
    }
}

impl CollisionResult for RayCastResult {
    const INITIAL_EARLY_OUT_FRACTION: f32 = 1.0 + f32::EPSILON;
    const SHOULD_EARLY_OUT_FRACTION: f32 = 0.0;

    #[inline(always)]
    fn early_out_fraction(&self) -> f32 {
        self.fraction
    }
}

/// Settings for collector based ray casts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastSettings {
    /// When true, a ray starting inside a convex shape reports a hit at fraction 0.
    /// When false, it reports the point where it leaves the shape.
    pub treat_convex_as_solid: bool,
}

impl Default for RayCastSettings {
    fn default() -> Self {
        Self {
            treat_convex_as_solid: true,
        }
    }
}

/// Ray representation designed for quicker intersection against axis aligned bounding boxes.
#[derive(Debug, Clone, Copy)]
pub struct RayInvDirection {
    /// Reciprocal of the ray direction, zero on axes where the ray is parallel.
    pub inv_direction: Vec3,
    /// Axes on which the ray runs parallel to the slabs.
    pub is_parallel: BVec3,
}

impl RayInvDirection {
    /// Components with a smaller magnitude than this are treated as parallel.
    pub const PARALLEL_EPSILON: f32 = 1.0e-20;

    #[inline(always)]
    pub fn new(direction: Vec3) -> Self {
        // A parallel axis would produce an infinite reciprocal; those axes are resolved separately with a slab containment test.
        let is_parallel = direction.abs().cmple(Vec3::splat(Self::PARALLEL_EPSILON));
        let inv_direction = Vec3::select(is_parallel, Vec3::ZERO, direction.recip());
        Self {
            inv_direction,
            is_parallel,
        }
    }
}
