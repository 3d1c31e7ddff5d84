use std::f32::consts::PI;
use std::sync::Arc;

use glam::{Mat3, Vec3};

use crate::physics::body_properties::{MassProperties, RigidPose};
use crate::physics::collision_detection::collision_collector::CollisionCollector;
use crate::physics::collision_detection::shape_queries::CollidePointResult;
use crate::utilities::bounding_box::BoundingBox;

use super::ray::{RayCast, RayCastResult, RayCastSettings};
use super::shape::{Shape, ShapeError, ShapeRef, ShapeResult, ShapeSettings, SubShapeIdCreator, DEFAULT_DENSITY};

/// Collision shape representing a sphere centered on its center of mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereShape {
    /// Radius of the sphere.
    pub radius: f32,
    /// Mass per unit volume.
    pub density: f32,
}

impl SphereShape {
    /// Creates a sphere shape with the default density.
    #[inline(always)]
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            density: DEFAULT_DENSITY,
        }
    }

    /// Intersects the line through the ray with the sphere.
    /// Returns the entry and exit fractions, or `None` if the ray misses.
    fn ray_interval(&self, ray: &RayCast) -> Option<(f32, f32)> {
        let length = ray.direction.length();
        if length <= f32::EPSILON {
            return None;
        }
        // Normalize the direction. It both simplifies things and helps avoid numerical problems.
        let inverse_d_length = 1.0 / length;
        let d = ray.direction * inverse_d_length;

        // Move the origin up to the earliest possible impact time.
        let t_offset = (-ray.origin.dot(d) - self.radius).max(0.0);
        let o = ray.origin + d * t_offset;
        let b = o.dot(d);
        let c = o.dot(o) - self.radius * self.radius;

        if b > 0.0 && c > 0.0 {
            // Ray is outside and pointing away, no hit.
            return None;
        }

        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        Some((
            (t_offset - b - root) * inverse_d_length,
            (t_offset - b + root) * inverse_d_length,
        ))
    }
}

impl Shape for SphereShape {
    fn local_bounds(&self) -> BoundingBox {
        BoundingBox::from_center_and_extent(Vec3::ZERO, Vec3::splat(self.radius))
    }

    /// Rotation does not change the bounds of a sphere.
    fn world_space_bounds(&self, center_of_mass_transform: &RigidPose) -> BoundingBox {
        BoundingBox::from_center_and_extent(center_of_mass_transform.position, Vec3::splat(self.radius))
    }

    #[inline]
    fn inner_radius(&self) -> f32 {
        self.radius
    }

    fn mass_properties(&self) -> MassProperties {
        let mass = (4.0 / 3.0) * PI * self.radius * self.radius * self.radius * self.density;
        MassProperties {
            mass,
            inertia: Mat3::from_diagonal(Vec3::splat((2.0 / 5.0) * mass * self.radius * self.radius)),
        }
    }

    fn cast_ray(&self, ray: &RayCast, id_creator: &SubShapeIdCreator, hit: &mut RayCastResult) -> bool {
        let Some((entry, exit)) = self.ray_interval(ray) else {
            return false;
        };
        if exit < 0.0 {
            return false;
        }
        let fraction = entry.max(0.0);
        if fraction < hit.fraction {
            hit.fraction = fraction;
            hit.sub_shape_id = id_creator.id();
            return true;
        }
        false
    }

    fn cast_ray_collect(
        &self,
        ray: &RayCast,
        settings: &RayCastSettings,
        id_creator: &SubShapeIdCreator,
        collector: &mut dyn CollisionCollector<RayCastResult>,
    ) {
        let Some((entry, exit)) = self.ray_interval(ray) else {
            return;
        };
        if exit < 0.0 {
            return;
        }
        let fraction = if entry >= 0.0 || settings.treat_convex_as_solid {
            entry.max(0.0)
        } else {
            exit
        };
        if fraction < collector.early_out_fraction() {
            collector.add_hit(RayCastResult {
                fraction,
                sub_shape_id: id_creator.id(),
            });
        }
    }

    fn collide_point(
        &self,
        point: Vec3,
        id_creator: &SubShapeIdCreator,
        collector: &mut dyn CollisionCollector<CollidePointResult>,
    ) {
        if point.length_squared() <= self.radius * self.radius {
            collector.add_hit(CollidePointResult {
                sub_shape_id: id_creator.id(),
            });
        }
    }
}

/// Settings to create a `SphereShape`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereShapeSettings {
    pub radius: f32,
    pub density: f32,
}

impl SphereShapeSettings {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            density: DEFAULT_DENSITY,
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }
}

impl ShapeSettings for SphereShapeSettings {
    fn create(&self) -> ShapeResult<ShapeRef> {
        if !(self.radius > 0.0) {
            return Err(ShapeError::InvalidRadius(self.radius));
        }
        if !(self.density > 0.0) {
            return Err(ShapeError::InvalidDensity(self.density));
        }
        Ok(Arc::new(SphereShape {
            radius: self.radius,
            density: self.density,
        }))
    }
}
