use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::physics::body_properties::RigidPose;

use super::shape::{ShapeRef, ShapeResult, ShapeSettings};

/// Rotations closer than this (squared quaternion distance) to identity are snapped to identity.
const IDENTITY_ROTATION_TOLERANCE_SQUARED: f32 = 1.0e-12;

/// Where a child's shape comes from when a compound is built from settings.
#[derive(Debug, Clone)]
pub enum ShapeSource {
    /// An already built shape, shared with the compound.
    Shape(ShapeRef),
    /// Settings that are turned into a shape when the compound is created.
    Settings(Arc<dyn ShapeSettings>),
}

impl ShapeSource {
    /// Returns the shape, creating it from settings if needed.
    pub fn resolve(&self) -> ShapeResult<ShapeRef> {
        match self {
            ShapeSource::Shape(shape) => Ok(shape.clone()),
            ShapeSource::Settings(settings) => settings.create(),
        }
    }
}

impl From<ShapeRef> for ShapeSource {
    fn from(shape: ShapeRef) -> Self {
        ShapeSource::Shape(shape)
    }
}

/// Description of a single child of a compound.
#[derive(Debug, Clone)]
pub struct SubShapeSettings {
    pub shape: ShapeSource,
    /// Position of the child relative to the compound's origin.
    pub position: Vec3,
    /// Rotation of the child relative to the compound.
    pub rotation: Quat,
    /// Tag stored alongside the child and returned to the caller untouched.
    pub user_data: u32,
}

impl SubShapeSettings {
    pub fn new(shape: impl Into<ShapeSource>, position: Vec3, rotation: Quat) -> Self {
        Self {
            shape: shape.into(),
            position,
            rotation,
            user_data: 0,
        }
    }

    pub fn with_user_data(mut self, user_data: u32) -> Self {
        self.user_data = user_data;
        self
    }
}

/// A child of a compound together with its placement.
#[derive(Debug, Clone)]
pub struct SubShape {
    pub shape: ShapeRef,
    /// Position of the child's center of mass relative to the compound's center of mass.
    pub position_com: Vec3,
    pub rotation: Quat,
    pub user_data: u32,
    /// Set when `rotation` was snapped to identity, which lets queries skip rotating into the child's space.
    pub is_rotation_identity: bool,
}

impl SubShape {
    /// Creates a child placed at `position` / `rotation` in a compound whose center of mass is `parent_com`.
    pub fn new(shape: ShapeRef, position: Vec3, rotation: Quat, parent_com: Vec3, user_data: u32) -> Self {
        let mut sub_shape = Self {
            shape,
            position_com: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            user_data,
            is_rotation_identity: true,
        };
        sub_shape.set_transform(position, rotation, parent_com);
        sub_shape
    }

    /// Builds a child from settings. Failing child settings propagate their error.
    pub fn from_settings(settings: &SubShapeSettings) -> ShapeResult<Self> {
        Ok(Self::new(
            settings.shape.resolve()?,
            settings.position,
            settings.rotation,
            Vec3::ZERO,
            settings.user_data,
        ))
    }

    /// Places the child. The stored position accounts for the parent's and the child's own center of mass.
    pub fn set_transform(&mut self, position: Vec3, rotation: Quat, parent_com: Vec3) {
        self.set_rotation(rotation);
        self.position_com = position - parent_com + self.rotation * self.shape.center_of_mass();
    }

    #[inline]
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.is_rotation_identity = (rotation - Quat::IDENTITY).length_squared()
            <= IDENTITY_ROTATION_TOLERANCE_SQUARED
            || (rotation + Quat::IDENTITY).length_squared() <= IDENTITY_ROTATION_TOLERANCE_SQUARED;
        self.rotation = if self.is_rotation_identity {
            Quat::IDENTITY
        } else {
            rotation
        };
    }

    /// Position of the child's origin relative to the compound's origin, given the compound's center of mass.
    #[inline]
    pub fn position(&self, parent_com: Vec3) -> Vec3 {
        self.position_com - self.rotation * self.shape.center_of_mass() + parent_com
    }

    /// Transform from the child's center of mass space into the compound's center of mass space.
    #[inline(always)]
    pub fn local_pose(&self) -> RigidPose {
        RigidPose::new(self.position_com, self.rotation)
    }

    /// Transform of the child's center of mass after placing the compound's center of mass at `position_com` /
    /// `rotation`.
    #[inline]
    pub fn center_of_mass_transform(&self, position_com: Vec3, rotation: Quat) -> RigidPose {
        RigidPose::new(position_com + rotation * self.position_com, rotation * self.rotation)
    }
}

/// Settings to create a `MutableCompoundShape`.
#[derive(Debug, Clone, Default)]
pub struct MutableCompoundShapeSettings {
    pub sub_shapes: Vec<SubShapeSettings>,
}

impl MutableCompoundShapeSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a child built from an existing shape.
    pub fn add_shape(&mut self, position: Vec3, rotation: Quat, shape: ShapeRef, user_data: u32) -> &mut Self {
        self.sub_shapes
            .push(SubShapeSettings::new(shape, position, rotation).with_user_data(user_data));
        self
    }

    /// Appends a child that is created from settings when the compound is built.
    pub fn add_shape_settings(
        &mut self,
        position: Vec3,
        rotation: Quat,
        settings: Arc<dyn ShapeSettings>,
        user_data: u32,
    ) -> &mut Self {
        self.sub_shapes.push(
            SubShapeSettings::new(ShapeSource::Settings(settings), position, rotation).with_user_data(user_data),
        );
        self
    }
}
