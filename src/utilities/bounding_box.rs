use glam::{Mat3, Vec3};

use crate::physics::body_properties::RigidPose;
use crate::physics::collidables::ray::RayInvDirection;

/// Provides simple axis-aligned bounding box functionality.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Location with the lowest X, Y, and Z coordinates in the axis-aligned bounding box.
    pub min: Vec3,
    /// Location with the highest X, Y, and Z coordinates in the axis-aligned bounding box.
    pub max: Vec3,
}

impl Default for BoundingBox {
    #[inline(always)]
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// Constructs a bounding box from the specified minimum and maximum.
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates an inverted box that contains nothing. Encapsulating anything into it yields that thing.
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(-f32::MAX),
        }
    }

    /// Creates a box centered on `center` with half extents `extent`.
    #[inline]
    pub fn from_center_and_extent(center: Vec3, extent: Vec3) -> Self {
        Self {
            min: center - extent,
            max: center + extent,
        }
    }

    /// Returns true when min <= max on every axis.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    /// Half of the size of the box along each axis.
    #[inline]
    pub fn extent(&self) -> Vec3 {
        0.5 * (self.max - self.min)
    }

    /// Grows the box so it also contains `other`.
    #[inline]
    pub fn encapsulate(&mut self, other: &BoundingBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Grows the box so it also contains `point`.
    #[inline]
    pub fn encapsulate_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Returns the box grown by `amount` on every side.
    #[inline]
    pub fn expanded_by(&self, amount: Vec3) -> Self {
        Self {
            min: self.min - amount,
            max: self.max + amount,
        }
    }

    /// Determines if a bounding box intersects another bounding box.
    #[inline]
    pub fn intersects(a: &Self, b: &Self) -> bool {
        Self::intersects_bounds(a.min, a.max, b.min, b.max)
    }

    /// Determines if a bounding box intersects another bounding box.
    #[inline]
    pub fn intersects_bounds(min_a: Vec3, max_a: Vec3, min_b: Vec3, max_b: Vec3) -> bool {
        let no_intersection_on_axes = max_a.cmplt(min_b) | max_b.cmplt(min_a);
        !no_intersection_on_axes.any()
    }

    /// Tests whether the point lies inside or on the surface of the box.
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        (point.cmpge(self.min) & point.cmple(self.max)).all()
    }

    /// Computes a bounding box which contains two other bounding boxes.
    #[inline]
    pub fn create_merged(a: &Self, b: &Self) -> Self {
        Self {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    /// Computes the box enclosing this box after it has been rotated and translated by `pose`.
    pub fn transformed(&self, pose: &RigidPose) -> Self {
        // Project the rotated extents onto the world axes; this gives the tightest axis aligned fit of the rotated box.
        let basis = Mat3::from_quat(pose.orientation);
        let extent = self.extent();
        let rotated_extent = basis.x_axis.abs() * extent.x
            + basis.y_axis.abs() * extent.y
            + basis.z_axis.abs() * extent.z;
        Self::from_center_and_extent(pose.transform_point(self.center()), rotated_extent)
    }

    /// Intersects a ray with the box.
    /// Returns the fraction along the ray at which it enters the box, which is negative if the origin is inside,
    /// or `f32::MAX` when the ray misses.
    #[inline]
    pub fn ray_fraction(&self, origin: Vec3, inv_direction: &RayInvDirection) -> f32 {
        let (entry, exit) = self.ray_interval(origin, inv_direction);
        if entry > exit || exit < 0.0 {
            f32::MAX
        } else {
            entry
        }
    }

    /// Computes the entry and exit fractions of the infinite line through `origin` against the slabs of the box.
    /// When the line misses the box, entry is greater than exit.
    pub fn ray_interval(&self, origin: Vec3, inv_direction: &RayInvDirection) -> (f32, f32) {
        let t1 = (self.min - origin) * inv_direction.inv_direction;
        let t2 = (self.max - origin) * inv_direction.inv_direction;
        let parallel = inv_direction.is_parallel;
        let t_min = Vec3::select(parallel, Vec3::splat(-f32::MAX), t1.min(t2));
        let t_max = Vec3::select(parallel, Vec3::splat(f32::MAX), t1.max(t2));

        // A parallel ray has to start between the slabs.
        let outside_slab = parallel & (origin.cmplt(self.min) | origin.cmpgt(self.max));
        if outside_slab.any() {
            return (f32::MAX, -f32::MAX);
        }
        (t_min.max_element(), t_max.min_element())
    }
}
