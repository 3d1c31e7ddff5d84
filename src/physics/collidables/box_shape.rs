use std::sync::Arc;

use glam::{Mat3, Vec3};

use crate::physics::body_properties::MassProperties;
use crate::physics::collision_detection::collision_collector::CollisionCollector;
use crate::physics::collision_detection::shape_queries::CollidePointResult;
use crate::utilities::bounding_box::BoundingBox;

use super::ray::{RayCast, RayCastResult, RayCastSettings};
use super::shape::{Shape, ShapeError, ShapeRef, ShapeResult, ShapeSettings, SubShapeIdCreator, DEFAULT_DENSITY};

/// Collision shape representing a solid cuboid centered on its center of mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxShape {
    /// Half of the box's size along its local axes.
    pub half_extent: Vec3,
    /// Mass per unit volume.
    pub density: f32,
}

impl BoxShape {
    /// Creates a box from its half extents, with the default density.
    #[inline(always)]
    pub fn new(half_extent: Vec3) -> Self {
        Self {
            half_extent,
            density: DEFAULT_DENSITY,
        }
    }

    pub fn width(&self) -> f32 {
        self.half_extent.x * 2.0
    }
    pub fn height(&self) -> f32 {
        self.half_extent.y * 2.0
    }
    pub fn length(&self) -> f32 {
        self.half_extent.z * 2.0
    }

    /// Latest entry and earliest exit fraction of the ray against the box slabs.
    /// Returns `None` when the ray misses or the box lies behind the origin.
    fn ray_interval(&self, ray: &RayCast) -> Option<(f32, f32)> {
        let offset_to_t_scale = Vec3::new(
            if ray.direction.x < 0.0 { 1.0 } else { -1.0 },
            if ray.direction.y < 0.0 { 1.0 } else { -1.0 },
            if ray.direction.z < 0.0 { 1.0 } else { -1.0 },
        ) / ray.direction.abs().max(Vec3::splat(1e-15));

        let negative_t = (ray.origin - self.half_extent) * offset_to_t_scale;
        let positive_t = (ray.origin + self.half_extent) * offset_to_t_scale;
        let entry_t = negative_t.min(positive_t);
        let exit_t = negative_t.max(positive_t);

        let earliest_exit = exit_t.min_element();
        if earliest_exit < 0.0 {
            return None;
        }
        let latest_entry = entry_t.max_element();
        if earliest_exit < latest_entry {
            return None;
        }
        Some((latest_entry, earliest_exit))
    }
}

impl Shape for BoxShape {
    fn local_bounds(&self) -> BoundingBox {
        BoundingBox::new(-self.half_extent, self.half_extent)
    }

    #[inline]
    fn inner_radius(&self) -> f32 {
        self.half_extent.min_element()
    }

    fn mass_properties(&self) -> MassProperties {
        let size = self.half_extent * 2.0;
        let mass = size.x * size.y * size.z * self.density;
        let squared = size * size;
        MassProperties {
            mass,
            inertia: Mat3::from_diagonal(
                Vec3::new(
                    squared.y + squared.z,
                    squared.x + squared.z,
                    squared.x + squared.y,
                ) * (mass / 12.0),
            ),
        }
    }

    fn cast_ray(&self, ray: &RayCast, id_creator: &SubShapeIdCreator, hit: &mut RayCastResult) -> bool {
        let Some((entry, _)) = self.ray_interval(ray) else {
            return false;
        };
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
        if point.abs().cmple(self.half_extent).all() {
            collector.add_hit(CollidePointResult {
                sub_shape_id: id_creator.id(),
            });
        }
    }
}

/// Settings to create a `BoxShape`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxShapeSettings {
    pub half_extent: Vec3,
    pub density: f32,
}

impl BoxShapeSettings {
    pub fn new(half_extent: Vec3) -> Self {
        Self {
            half_extent,
            density: DEFAULT_DENSITY,
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }
}

impl ShapeSettings for BoxShapeSettings {
    fn create(&self) -> ShapeResult<ShapeRef> {
        if !self.half_extent.cmpgt(Vec3::ZERO).all() {
            return Err(ShapeError::InvalidHalfExtent(self.half_extent));
        }
        if !(self.density > 0.0) {
            return Err(ShapeError::InvalidDensity(self.density));
        }
        Ok(Arc::new(BoxShape {
            half_extent: self.half_extent,
            density: self.density,
        }))
    }
}
