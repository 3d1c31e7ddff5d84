use glam::{Mat3, Quat, Vec3};
use std::fmt;
use std::ops::Mul;

/// Represents a rigid transformation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidPose {
    /// Orientation of the pose.
    pub orientation: Quat,
    /// Position of the pose.
    pub position: Vec3,
}

impl Default for RigidPose {
    #[inline(always)]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidPose {
    /// Returns a pose with a position at (0,0,0) and identity orientation.
    pub const IDENTITY: Self = Self {
        orientation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    /// Creates a rigid pose with the given position and orientation.
    #[inline(always)]
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Creates a rigid pose with the given position and identity orientation.
    #[inline(always)]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }

    /// Transforms a point by the rigid pose: orientation * v + position.
    #[inline(always)]
    pub fn transform_point(&self, v: Vec3) -> Vec3 {
        self.orientation * v + self.position
    }

    /// Transforms a point by the inverse of the rigid pose: orientation^-1 * (v - position).
    #[inline(always)]
    pub fn inverse_transform_point(&self, v: Vec3) -> Vec3 {
        self.orientation.conjugate() * (v - self.position)
    }

    /// Inverts the rigid transformation of the pose.
    #[inline(always)]
    pub fn inverse(&self) -> Self {
        let orientation = self.orientation.conjugate();
        Self {
            orientation,
            position: orientation * -self.position,
        }
    }
}

/// Composes two poses. `a * b` applies `b` first, then `a`.
impl Mul for RigidPose {
    type Output = RigidPose;

    #[inline(always)]
    fn mul(self, rhs: RigidPose) -> RigidPose {
        RigidPose {
            orientation: self.orientation * rhs.orientation,
            position: self.transform_point(rhs.position),
        }
    }
}

impl From<Vec3> for RigidPose {
    fn from(position: Vec3) -> Self {
        Self::from_position(position)
    }
}

impl From<Quat> for RigidPose {
    fn from(orientation: Quat) -> Self {
        Self {
            position: Vec3::ZERO,
            orientation,
        }
    }
}

impl From<(Vec3, Quat)> for RigidPose {
    fn from((position, orientation): (Vec3, Quat)) -> Self {
        Self::new(position, orientation)
    }
}

impl fmt::Display for RigidPose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}, {}", self.position, self.orientation)
    }
}

/// Mass and inertia tensor of a shape, expressed about its center of mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassProperties {
    pub mass: f32,
    /// Inertia tensor (not inverted).
    pub inertia: Mat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 0.0,
            inertia: Mat3::ZERO,
        }
    }
}

impl MassProperties {
    /// Gets the contribution to an inertia tensor of a point mass at the given offset from the center of mass.
    #[inline(always)]
    pub fn offset_inertia_contribution(offset: Vec3, mass: f32) -> Mat3 {
        let inner_product = offset.dot(offset);
        let xy = -mass * offset.x * offset.y;
        let xz = -mass * offset.x * offset.z;
        let yz = -mass * offset.y * offset.z;
        Mat3::from_cols(
            Vec3::new(mass * (inner_product - offset.x * offset.x), xy, xz),
            Vec3::new(xy, mass * (inner_product - offset.y * offset.y), yz),
            Vec3::new(xz, yz, mass * (inner_product - offset.z * offset.z)),
        )
    }

    /// Rotates the inertia tensor: R * I * R^T.
    #[inline]
    pub fn rotate(&mut self, rotation: Quat) {
        let basis = Mat3::from_quat(rotation);
        self.inertia = basis * self.inertia * basis.transpose();
    }

    /// Moves the mass away from the center of mass by `translation` (parallel axis theorem).
    #[inline]
    pub fn translate(&mut self, translation: Vec3) {
        self.inertia += Self::offset_inertia_contribution(translation, self.mass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition_applies_right_hand_side_first() {
        let a = RigidPose::new(Vec3::new(1.0, 0.0, 0.0), Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        let b = RigidPose::from_position(Vec3::new(0.0, 2.0, 0.0));
        let composed = a * b;
        let point = Vec3::new(1.0, 0.0, 0.0);
        let expected = a.transform_point(b.transform_point(point));
        assert!(composed.transform_point(point).abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn inverse_round_trips() {
        let pose = RigidPose::new(Vec3::new(3.0, -1.0, 2.0), Quat::from_rotation_x(1.1));
        let identity = pose * pose.inverse();
        assert!(identity.position.abs_diff_eq(Vec3::ZERO, 1e-5));
        assert!(identity.orientation.abs_diff_eq(Quat::IDENTITY, 1e-5));
    }

    #[test]
    fn translating_a_point_mass_follows_parallel_axis_theorem() {
        let mut properties = MassProperties {
            mass: 2.0,
            inertia: Mat3::ZERO,
        };
        properties.translate(Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(properties.inertia.x_axis.x, 18.0);
        assert_eq!(properties.inertia.y_axis.y, 0.0);
        assert_eq!(properties.inertia.z_axis.z, 18.0);
    }
}
