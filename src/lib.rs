//! Mutable compound collision shape.
//!
//! A compound aggregates child shapes, each placed with its own rotation and position, and answers ray, point,
//! sweep and overlap queries against the whole set. Children can be added, removed and moved at runtime; their
//! bounding boxes are kept in blocks of four so each query rejects four children per bounds test.

pub mod physics;
pub mod utilities;

pub use physics::body_properties::{MassProperties, RigidPose};
pub use physics::collidables::box_shape::{BoxShape, BoxShapeSettings};
pub use physics::collidables::compound::{MutableCompoundShapeSettings, ShapeSource, SubShape, SubShapeSettings};
pub use physics::collidables::mutable_compound::MutableCompoundShape;
pub use physics::collidables::ray::{RayCast, RayCastResult, RayCastSettings};
pub use physics::collidables::shape::{
    Shape, ShapeError, ShapeRef, ShapeResult, ShapeSettings, SubShapeId, SubShapeIdCreator, TransformedShape,
};
pub use physics::collidables::sphere::{SphereShape, SphereShapeSettings};
pub use physics::collision_detection::collision_collector::{
    AllHitCollector, AnyHitCollector, ClosestHitCollector, CollisionCollector, CollisionResult,
};
pub use physics::collision_detection::collision_dispatch::{CollisionDispatch, LeafCollider};
pub use physics::collision_detection::shape_queries::{
    CollidePointResult, CollideShapeResult, CollideShapeSettings, ShapeCast, ShapeCastResult, ShapeCastSettings,
};
