use std::fmt;
use std::io;
use std::sync::Arc;

use glam::{Quat, Vec3};
use thiserror::Error;

use crate::physics::body_properties::{MassProperties, RigidPose};
use crate::physics::collision_detection::collision_collector::{CollisionCollector, CollisionResult};
use crate::physics::collision_detection::shape_queries::CollidePointResult;
use crate::utilities::bounding_box::BoundingBox;

use super::mutable_compound::MutableCompoundShape;
use super::ray::{RayCast, RayCastResult, RayCastSettings};

/// Shared reference to a shape. A shape can be a child of any number of compounds.
pub type ShapeRef = Arc<dyn Shape>;

/// Density used by leaf shapes when none is given, in kg/m^3.
pub const DEFAULT_DENSITY: f32 = 1000.0;

/// Errors produced while building or editing shapes.
#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("Compound hierarchy needs {required} sub shape ID bits but only {max} are available")]
    SubShapeIdBitsExceeded { required: u32, max: u32 },

    #[error("Sub shape index {index} out of range, compound has {count} sub shapes")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Sub shape range {start}..{start}+{count} exceeds the {len} sub shapes of the compound")]
    RangeOutOfBounds { start: usize, count: usize, len: usize },

    #[error("Strided buffer holds {available} elements but {required} were requested")]
    StridedBufferTooShort { required: usize, available: usize },

    #[error("Binary state references {expected} sub shapes but {provided} shapes were provided")]
    SubShapeCountMismatch { expected: usize, provided: usize },

    #[error("Invalid radius: {0}")]
    InvalidRadius(f32),

    #[error("Invalid half extent: {0}")]
    InvalidHalfExtent(Vec3),

    #[error("Invalid density: {0}")]
    InvalidDensity(f32),

    #[error("Stream error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for shape creation and editing.
pub type ShapeResult<T> = Result<T, ShapeError>;

/// Serializable description of a shape that can be turned into a runtime shape.
pub trait ShapeSettings: Send + Sync + fmt::Debug {
    /// Validates the settings and builds the shape.
    fn create(&self) -> ShapeResult<ShapeRef>;
}

/// Identifies a leaf in a hierarchy of shapes.
///
/// Every compound level stores the index of the child that was taken in the next free bits, starting from the least
/// significant bit. Unused bits are set, so an id that has been fully consumed reads as `EMPTY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubShapeId(u32);

impl Default for SubShapeId {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl SubShapeId {
    /// Maximum number of bits a hierarchy may use for addressing.
    pub const MAX_BITS: u32 = 32;
    /// Id that does not address any sub shape.
    pub const EMPTY: Self = Self(u32::MAX);

    #[inline(always)]
    pub fn from_value(value: u32) -> Self {
        Self(value)
    }

    #[inline(always)]
    pub fn value(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }

    /// Takes the lowest `bits` bits off the id. Returns the value stored in them and the id of the remainder.
    #[inline]
    pub fn pop_id(self, bits: u32) -> (u32, SubShapeId) {
        debug_assert!(bits <= Self::MAX_BITS, "Cannot pop more bits than an id holds.");
        let mask = ((1u64 << bits) - 1) as u32;
        // Fill the vacated high bits with ones so an exhausted id becomes EMPTY.
        let fill = (u64::from(u32::MAX) << (Self::MAX_BITS - bits)) as u32;
        let value = self.0 & mask;
        let remainder = (u64::from(self.0) >> bits) as u32 | fill;
        (value, SubShapeId(remainder))
    }

    #[inline]
    fn push_id(&mut self, value: u32, first_bit: u32, bits: u32) {
        let mask = (((1u64 << bits) - 1) << first_bit) as u32;
        self.0 &= !mask;
        self.0 |= (u64::from(value) << first_bit) as u32;
    }
}

/// Builds a `SubShapeId` while descending through a hierarchy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubShapeIdCreator {
    id: SubShapeId,
    current_bit: u32,
}

impl SubShapeIdCreator {
    /// Returns a creator with `value` appended using `bits` bits.
    #[inline]
    pub fn push_id(&self, value: u32, bits: u32) -> Self {
        debug_assert!(
            u64::from(value) < (1u64 << bits) || (bits == 0 && value == 0),
            "Value does not fit in the requested number of bits."
        );
        let mut copy = *self;
        copy.id.push_id(value, self.current_bit, bits);
        copy.current_bit += bits;
        debug_assert!(
            copy.current_bit <= SubShapeId::MAX_BITS,
            "Sub shape id bits exhausted."
        );
        copy
    }

    #[inline(always)]
    pub fn id(&self) -> SubShapeId {
        self.id
    }

    #[inline(always)]
    pub fn num_bits_written(&self) -> u32 {
        self.current_bit
    }
}

/// A shape together with the world transform of its center of mass, as produced by `collect_transformed_shapes`.
#[derive(Clone, Debug)]
pub struct TransformedShape {
    pub shape: ShapeRef,
    pub position_com: Vec3,
    pub rotation: Quat,
    /// Id of the shape relative to the root of the query.
    pub sub_shape_id_creator: SubShapeIdCreator,
}

impl TransformedShape {
    /// World transform of the shape's center of mass.
    #[inline]
    pub fn center_of_mass_transform(&self) -> RigidPose {
        RigidPose::new(self.position_com, self.rotation)
    }

    /// World space bounds of the shape.
    #[inline]
    pub fn world_space_bounds(&self) -> BoundingBox {
        self.shape.world_space_bounds(&self.center_of_mass_transform())
    }
}

impl CollisionResult for TransformedShape {
    const INITIAL_EARLY_OUT_FRACTION: f32 = f32::MAX;
    const SHOULD_EARLY_OUT_FRACTION: f32 = -f32::MAX;

    #[inline(always)]
    fn early_out_fraction(&self) -> f32 {
        0.0
    }
}

/// Interface every collision shape implements.
///
/// All spatial data is expressed relative to the shape's center of mass ("center of mass space").
pub trait Shape: Send + Sync + fmt::Debug {
    /// Center of mass relative to the origin the shape was authored around.
    fn center_of_mass(&self) -> Vec3 {
        Vec3::ZERO
    }

    /// Bounding box in center of mass space.
    fn local_bounds(&self) -> BoundingBox;

    /// Bounding box after placing the center of mass at `center_of_mass_transform`.
    fn world_space_bounds(&self, center_of_mass_transform: &RigidPose) -> BoundingBox {
        self.local_bounds().transformed(center_of_mass_transform)
    }

    /// Radius of the largest sphere around the center of mass that fits entirely inside the shape.
    /// For shapes made of parts, the smallest of the parts' radii.
    fn inner_radius(&self) -> f32;

    fn mass_properties(&self) -> MassProperties;

    /// Number of sub shape id bits this shape and all of its descendants need.
    fn sub_shape_id_bits_recursive(&self) -> u32 {
        0
    }

    /// Casts a ray in center of mass space and records the hit in `hit` if it is closer than the current one.
    /// Returns true when `hit` was updated.
    fn cast_ray(&self, ray: &RayCast, id_creator: &SubShapeIdCreator, hit: &mut RayCastResult) -> bool;

    /// Casts a ray in center of mass space and reports hits to `collector`.
    fn cast_ray_collect(
        &self,
        ray: &RayCast,
        settings: &RayCastSettings,
        id_creator: &SubShapeIdCreator,
        collector: &mut dyn CollisionCollector<RayCastResult>,
    );

    /// Reports to `collector` if `point` (in center of mass space) lies inside the shape.
    fn collide_point(
        &self,
        point: Vec3,
        id_creator: &SubShapeIdCreator,
        collector: &mut dyn CollisionCollector<CollidePointResult>,
    );

    /// Reports the leaf shapes whose bounds may touch `bounds` (world space), with their world transforms.
    /// `this` must reference the shape the method is called on; leaves hand it to the collector.
    fn collect_transformed_shapes(
        &self,
        this: &ShapeRef,
        bounds: &BoundingBox,
        position_com: Vec3,
        rotation: Quat,
        id_creator: &SubShapeIdCreator,
        collector: &mut dyn CollisionCollector<TransformedShape>,
    ) {
        debug_assert!(
            std::ptr::addr_eq(Arc::as_ptr(this), self as *const Self),
            "The shape reference must point at the shape being queried."
        );
        let _ = bounds;
        collector.add_hit(TransformedShape {
            shape: this.clone(),
            position_com,
            rotation,
            sub_shape_id_creator: *id_creator,
        });
    }

    /// Downcast used by collision routing to detect compounds.
    fn as_mutable_compound(&self) -> Option<&MutableCompoundShape> {
        None
    }
}
