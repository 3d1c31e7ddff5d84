//! Routes shape-vs-shape queries through compounds down to pairs of leaf shapes.
//!
//! Compounds are unpacked here; every pair of leaves is handed to a `LeafCollider` supplied by the caller, which owns
//! the actual narrow phase.

use crate::physics::body_properties::RigidPose;
use crate::physics::collidables::shape::{Shape, SubShapeIdCreator};

use super::collision_collector::CollisionCollector;
use super::shape_queries::{CollideShapeResult, CollideShapeSettings, ShapeCast, ShapeCastResult, ShapeCastSettings};

/// Narrow phase for pairs of leaf shapes.
///
/// Transforms are center of mass transforms of both shapes in a shared space. Implementations report contacts to the
/// collector and should respect its early-out fraction.
pub trait LeafCollider: Sync {
    #[allow(clippy::too_many_arguments)]
    fn collide_leaves(
        &self,
        shape1: &dyn Shape,
        shape2: &dyn Shape,
        center_of_mass_transform1: &RigidPose,
        center_of_mass_transform2: &RigidPose,
        id_creator1: &SubShapeIdCreator,
        id_creator2: &SubShapeIdCreator,
        settings: &CollideShapeSettings,
        collector: &mut dyn CollisionCollector<CollideShapeResult>,
    );

    /// Sweeps `shape_cast` against `shape`. The cast is expressed in the center of mass space of `shape`;
    /// `center_of_mass_transform2` places that space in the world for reporting.
    #[allow(clippy::too_many_arguments)]
    fn cast_leaf(
        &self,
        shape_cast: &ShapeCast,
        settings: &ShapeCastSettings,
        shape: &dyn Shape,
        center_of_mass_transform2: &RigidPose,
        id_creator1: &SubShapeIdCreator,
        id_creator2: &SubShapeIdCreator,
        collector: &mut dyn CollisionCollector<ShapeCastResult>,
    );
}

/// Entry point for shape-vs-shape queries.
#[derive(Clone, Copy)]
pub struct CollisionDispatch<'a> {
    leaf_collider: &'a dyn LeafCollider,
}

impl<'a> CollisionDispatch<'a> {
    pub fn new(leaf_collider: &'a dyn LeafCollider) -> Self {
        Self { leaf_collider }
    }

    /// Collides two shapes, unpacking compounds on either side.
    #[allow(clippy::too_many_arguments)]
    pub fn collide_shape_vs_shape(
        &self,
        shape1: &dyn Shape,
        shape2: &dyn Shape,
        center_of_mass_transform1: &RigidPose,
        center_of_mass_transform2: &RigidPose,
        id_creator1: &SubShapeIdCreator,
        id_creator2: &SubShapeIdCreator,
        settings: &CollideShapeSettings,
        collector: &mut dyn CollisionCollector<CollideShapeResult>,
    ) {
        if let Some(compound1) = shape1.as_mutable_compound() {
            compound1.collide_compound_vs_shape(
                shape2,
                center_of_mass_transform1,
                center_of_mass_transform2,
                id_creator1,
                id_creator2,
                settings,
                self,
                collector,
            );
        } else if let Some(compound2) = shape2.as_mutable_compound() {
            compound2.collide_shape_vs_compound(
                shape1,
                center_of_mass_transform1,
                center_of_mass_transform2,
                id_creator1,
                id_creator2,
                settings,
                self,
                collector,
            );
        } else {
            self.leaf_collider.collide_leaves(
                shape1,
                shape2,
                center_of_mass_transform1,
                center_of_mass_transform2,
                id_creator1,
                id_creator2,
                settings,
                collector,
            );
        }
    }

    /// Sweeps a shape against another, unpacking compounds on either side.
    /// `shape_cast` is expressed in the center of mass space of `shape`.
    #[allow(clippy::too_many_arguments)]
    pub fn cast_shape_vs_shape(
        &self,
        shape_cast: &ShapeCast,
        settings: &ShapeCastSettings,
        shape: &dyn Shape,
        center_of_mass_transform2: &RigidPose,
        id_creator1: &SubShapeIdCreator,
        id_creator2: &SubShapeIdCreator,
        collector: &mut dyn CollisionCollector<ShapeCastResult>,
    ) {
        if let Some(cast_compound) = shape_cast.shape.as_mutable_compound() {
            // Sweep every child of the cast compound separately.
            let sub_shape_bits = cast_compound.sub_shape_id_bits();
            for (index, sub_shape) in cast_compound.sub_shapes().iter().enumerate() {
                let child_cast = ShapeCast::new(
                    sub_shape.shape.as_ref(),
                    shape_cast.center_of_mass_start * sub_shape.local_pose(),
                    shape_cast.direction,
                );
                let child_id = id_creator1.push_id(index as u32, sub_shape_bits);
                self.cast_shape_vs_shape(
                    &child_cast,
                    settings,
                    shape,
                    center_of_mass_transform2,
                    &child_id,
                    id_creator2,
                    &mut *collector,
                );
                if collector.should_early_out() {
                    break;
                }
            }
        } else if let Some(compound) = shape.as_mutable_compound() {
            compound.cast_shape(
                shape_cast,
                settings,
                center_of_mass_transform2,
                id_creator1,
                id_creator2,
                self,
                collector,
            );
        } else {
            self.leaf_collider.cast_leaf(
                shape_cast,
                settings,
                shape,
                center_of_mass_transform2,
                id_creator1,
                id_creator2,
                collector,
            );
        }
    }
}
