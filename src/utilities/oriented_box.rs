use glam::{Mat3, Vec3};

use crate::physics::body_properties::RigidPose;
use crate::utilities::bounding_box::BoundingBox;

/// A box with an arbitrary orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    /// Position of the box center and its orientation.
    pub pose: RigidPose,
    /// Half of the size of the box along each of its local axes.
    pub half_extents: Vec3,
}

impl OrientedBox {
    #[inline(always)]
    pub fn new(pose: RigidPose, half_extents: Vec3) -> Self {
        Self { pose, half_extents }
    }

    /// Creates the oriented box that results from placing an axis aligned box at `pose`.
    #[inline]
    pub fn from_transformed_box(pose: &RigidPose, bounds: &BoundingBox) -> Self {
        Self {
            pose: RigidPose::new(pose.transform_point(bounds.center()), pose.orientation),
            half_extents: bounds.extent(),
        }
    }

    /// Rotation matrix whose columns are the box's local axes.
    #[inline(always)]
    pub fn basis(&self) -> Mat3 {
        Mat3::from_quat(self.pose.orientation)
    }

    /// Axis aligned box that encloses the oriented box.
    #[inline]
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_center_and_extent(Vec3::ZERO, self.half_extents).transformed(&self.pose)
    }
}
