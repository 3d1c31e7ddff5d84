//! Visitors that drive `MutableCompoundShape::walk_sub_shapes` for each kind of query.
//!
//! A visitor first tests a whole block of four child bounding boxes at once, then decides per child whether to
//! descend into it. Visitors that track an early-out fraction re-check it for every child since visiting a child can
//! lower it.

use glam::{BVec4A, Quat, Vec3, Vec4};

use crate::physics::body_properties::RigidPose;
use crate::physics::collision_detection::collision_collector::CollisionCollector;
use crate::physics::collision_detection::collision_dispatch::CollisionDispatch;
use crate::physics::collision_detection::shape_queries::{
    CollidePointResult, CollideShapeResult, CollideShapeSettings, ShapeCast, ShapeCastResult, ShapeCastSettings,
};
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::bounding_box_wide::{lane_set, BoundingBoxWide};
use crate::utilities::oriented_box::OrientedBox;

use super::compound::SubShape;
use super::ray::{RayCast, RayCastResult, RayCastSettings, RayInvDirection};
use super::shape::{Shape, SubShapeIdCreator, TransformedShape};

/// Separation tolerance used when testing oriented boxes against child bounds.
pub const ORIENTED_BOX_EPSILON: f32 = 1.0e-6;

/// Callbacks for `MutableCompoundShape::walk_sub_shapes`.
pub trait SubShapeVisitor {
    /// Outcome of testing a block, e.g. a hit mask or per-child fractions.
    type Result: Copy;

    /// Tests the four bounding boxes of a block.
    fn test_block(&self, bounds: &BoundingBoxWide) -> Self::Result;

    /// Whether any child of the block can still contribute.
    fn should_visit_block(&self, result: &Self::Result) -> bool;

    /// Whether the child in `index_in_block` should be visited.
    fn should_visit_sub_shape(&self, result: &Self::Result, index_in_block: usize) -> bool;

    fn visit_shape(&mut self, sub_shape: &SubShape, sub_shape_index: u32);

    /// Checked after every visited child. Returning true ends the walk.
    fn should_abort(&self) -> bool;
}

/// Moves a ray from compound space into the space of `sub_shape`.
#[inline]
fn ray_in_sub_shape_space(ray: &RayCast, sub_shape: &SubShape) -> RayCast {
    if sub_shape.is_rotation_identity {
        RayCast::new(ray.origin - sub_shape.position_com, ray.direction)
    } else {
        ray.inverse_transformed(&sub_shape.local_pose())
    }
}

#[inline(always)]
fn any_closer(fractions: &Vec4, early_out_fraction: f32) -> bool {
    fractions.cmplt(Vec4::splat(early_out_fraction)).any()
}

/// Finds the closest ray hit among the children.
pub struct CastRayVisitor<'a> {
    ray: RayCast,
    inv_direction: RayInvDirection,
    sub_shape_bits: u32,
    id_creator: SubShapeIdCreator,
    hit: &'a mut RayCastResult,
    pub return_value: bool,
}

impl<'a> CastRayVisitor<'a> {
    pub fn new(ray: &RayCast, sub_shape_bits: u32, id_creator: &SubShapeIdCreator, hit: &'a mut RayCastResult) -> Self {
        Self {
            ray: *ray,
            inv_direction: RayInvDirection::new(ray.direction),
            sub_shape_bits,
            id_creator: *id_creator,
            hit,
            return_value: false,
        }
    }
}

impl SubShapeVisitor for CastRayVisitor<'_> {
    type Result = Vec4;

    #[inline(always)]
    fn test_block(&self, bounds: &BoundingBoxWide) -> Vec4 {
        bounds.ray_fractions(self.ray.origin, &self.inv_direction)
    }

    #[inline(always)]
    fn should_visit_block(&self, result: &Vec4) -> bool {
        any_closer(result, self.hit.fraction)
    }

    #[inline(always)]
    fn should_visit_sub_shape(&self, result: &Vec4, index_in_block: usize) -> bool {
        result[index_in_block] < self.hit.fraction
    }

    fn visit_shape(&mut self, sub_shape: &SubShape, sub_shape_index: u32) {
        let id = self.id_creator.push_id(sub_shape_index, self.sub_shape_bits);
        let local_ray = ray_in_sub_shape_space(&self.ray, sub_shape);
        if sub_shape.shape.cast_ray(&local_ray, &id, self.hit) {
            self.return_value = true;
        }
    }

    /// A hit at the start of the ray cannot be beaten.
    #[inline(always)]
    fn should_abort(&self) -> bool {
        self.hit.fraction <= 0.0
    }
}

/// Reports ray hits of the children to a collector.
pub struct CastRayCollectorVisitor<'a> {
    ray: RayCast,
    inv_direction: RayInvDirection,
    settings: RayCastSettings,
    sub_shape_bits: u32,
    id_creator: SubShapeIdCreator,
    collector: &'a mut dyn CollisionCollector<RayCastResult>,
}

impl<'a> CastRayCollectorVisitor<'a> {
    pub fn new(
        ray: &RayCast,
        settings: &RayCastSettings,
        sub_shape_bits: u32,
        id_creator: &SubShapeIdCreator,
        collector: &'a mut dyn CollisionCollector<RayCastResult>,
    ) -> Self {
        Self {
            ray: *ray,
            inv_direction: RayInvDirection::new(ray.direction),
            settings: *settings,
            sub_shape_bits,
            id_creator: *id_creator,
            collector,
        }
    }
}

impl SubShapeVisitor for CastRayCollectorVisitor<'_> {
    type Result = Vec4;

    #[inline(always)]
    fn test_block(&self, bounds: &BoundingBoxWide) -> Vec4 {
        bounds.ray_fractions(self.ray.origin, &self.inv_direction)
    }

    #[inline(always)]
    fn should_visit_block(&self, result: &Vec4) -> bool {
        any_closer(result, self.collector.early_out_fraction())
    }

    #[inline(always)]
    fn should_visit_sub_shape(&self, result: &Vec4, index_in_block: usize) -> bool {
        result[index_in_block] < self.collector.early_out_fraction()
    }

    fn visit_shape(&mut self, sub_shape: &SubShape, sub_shape_index: u32) {
        let id = self.id_creator.push_id(sub_shape_index, self.sub_shape_bits);
        let local_ray = ray_in_sub_shape_space(&self.ray, sub_shape);
        sub_shape
            .shape
            .cast_ray_collect(&local_ray, &self.settings, &id, &mut *self.collector);
    }

    #[inline(always)]
    fn should_abort(&self) -> bool {
        self.collector.should_early_out()
    }
}

/// Reports the children that contain a point.
pub struct CollidePointVisitor<'a> {
    point: Vec3,
    sub_shape_bits: u32,
    id_creator: SubShapeIdCreator,
    collector: &'a mut dyn CollisionCollector<CollidePointResult>,
}

impl<'a> CollidePointVisitor<'a> {
    pub fn new(
        point: Vec3,
        sub_shape_bits: u32,
        id_creator: &SubShapeIdCreator,
        collector: &'a mut dyn CollisionCollector<CollidePointResult>,
    ) -> Self {
        Self {
            point,
            sub_shape_bits,
            id_creator: *id_creator,
            collector,
        }
    }
}

impl SubShapeVisitor for CollidePointVisitor<'_> {
    type Result = BVec4A;

    #[inline(always)]
    fn test_block(&self, bounds: &BoundingBoxWide) -> BVec4A {
        bounds.contains_point(self.point)
    }

    #[inline(always)]
    fn should_visit_block(&self, result: &BVec4A) -> bool {
        result.any()
    }

    #[inline(always)]
    fn should_visit_sub_shape(&self, result: &BVec4A, index_in_block: usize) -> bool {
        lane_set(*result, index_in_block)
    }

    fn visit_shape(&mut self, sub_shape: &SubShape, sub_shape_index: u32) {
        let id = self.id_creator.push_id(sub_shape_index, self.sub_shape_bits);
        let local_point = sub_shape.local_pose().inverse_transform_point(self.point);
        sub_shape.shape.collide_point(local_point, &id, &mut *self.collector);
    }

    #[inline(always)]
    fn should_abort(&self) -> bool {
        self.collector.should_early_out()
    }
}

/// Sweeps a shape against the children of a compound. The sweep is expressed in the compound's center of mass space.
pub struct CastShapeVisitor<'a> {
    shape_cast: ShapeCast<'a>,
    settings: ShapeCastSettings,
    center_of_mass_transform2: RigidPose,
    sub_shape_bits: u32,
    id_creator1: SubShapeIdCreator,
    id_creator2: SubShapeIdCreator,
    box_center: Vec3,
    box_extent: Vec3,
    inv_direction: RayInvDirection,
    dispatch: &'a CollisionDispatch<'a>,
    collector: &'a mut dyn CollisionCollector<ShapeCastResult>,
}

impl<'a> CastShapeVisitor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shape_cast: &ShapeCast<'a>,
        settings: &ShapeCastSettings,
        center_of_mass_transform2: &RigidPose,
        sub_shape_bits: u32,
        id_creator1: &SubShapeIdCreator,
        id_creator2: &SubShapeIdCreator,
        dispatch: &'a CollisionDispatch<'a>,
        collector: &'a mut dyn CollisionCollector<ShapeCastResult>,
    ) -> Self {
        // Sweeping a box against a box is the same as casting a ray from its center against the box grown by its extent.
        Self {
            shape_cast: *shape_cast,
            settings: *settings,
            center_of_mass_transform2: *center_of_mass_transform2,
            sub_shape_bits,
            id_creator1: *id_creator1,
            id_creator2: *id_creator2,
            box_center: shape_cast.shape_world_bounds.center(),
            box_extent: shape_cast.shape_world_bounds.extent(),
            inv_direction: RayInvDirection::new(shape_cast.direction),
            dispatch,
            collector,
        }
    }
}

impl SubShapeVisitor for CastShapeVisitor<'_> {
    type Result = Vec4;

    #[inline(always)]
    fn test_block(&self, bounds: &BoundingBoxWide) -> Vec4 {
        bounds
            .enlarged(self.box_extent)
            .ray_fractions(self.box_center, &self.inv_direction)
    }

    #[inline(always)]
    fn should_visit_block(&self, result: &Vec4) -> bool {
        any_closer(result, self.collector.early_out_fraction())
    }

    #[inline(always)]
    fn should_visit_sub_shape(&self, result: &Vec4, index_in_block: usize) -> bool {
        result[index_in_block] < self.collector.early_out_fraction()
    }

    fn visit_shape(&mut self, sub_shape: &SubShape, sub_shape_index: u32) {
        let id2 = self.id_creator2.push_id(sub_shape_index, self.sub_shape_bits);
        let local_pose = sub_shape.local_pose();
        let center_of_mass_transform2 = self.center_of_mass_transform2 * local_pose;
        let shape_cast = self.shape_cast.post_transformed(&local_pose.inverse());
        self.dispatch.cast_shape_vs_shape(
            &shape_cast,
            &self.settings,
            sub_shape.shape.as_ref(),
            &center_of_mass_transform2,
            &self.id_creator1,
            &id2,
            &mut *self.collector,
        );
    }

    #[inline(always)]
    fn should_abort(&self) -> bool {
        self.collector.should_early_out()
    }
}

/// Collides the children of a compound (shape 1) with another shape (shape 2).
pub struct CollideCompoundVsShapeVisitor<'a> {
    shape2: &'a dyn Shape,
    transform1: RigidPose,
    transform2: RigidPose,
    sub_shape_bits: u32,
    id_creator1: SubShapeIdCreator,
    id_creator2: SubShapeIdCreator,
    settings: CollideShapeSettings,
    bounds_of_2_in_space_of_1: BoundingBox,
    dispatch: &'a CollisionDispatch<'a>,
    collector: &'a mut dyn CollisionCollector<CollideShapeResult>,
}

impl<'a> CollideCompoundVsShapeVisitor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shape2: &'a dyn Shape,
        center_of_mass_transform1: &RigidPose,
        center_of_mass_transform2: &RigidPose,
        sub_shape_bits: u32,
        id_creator1: &SubShapeIdCreator,
        id_creator2: &SubShapeIdCreator,
        settings: &CollideShapeSettings,
        dispatch: &'a CollisionDispatch<'a>,
        collector: &'a mut dyn CollisionCollector<CollideShapeResult>,
    ) -> Self {
        let transform2_to_1 = center_of_mass_transform1.inverse() * *center_of_mass_transform2;
        let bounds_of_2_in_space_of_1 = shape2
            .local_bounds()
            .transformed(&transform2_to_1)
            .expanded_by(Vec3::splat(settings.max_separation_distance));
        Self {
            shape2,
            transform1: *center_of_mass_transform1,
            transform2: *center_of_mass_transform2,
            sub_shape_bits,
            id_creator1: *id_creator1,
            id_creator2: *id_creator2,
            settings: *settings,
            bounds_of_2_in_space_of_1,
            dispatch,
            collector,
        }
    }
}

impl SubShapeVisitor for CollideCompoundVsShapeVisitor<'_> {
    type Result = BVec4A;

    #[inline(always)]
    fn test_block(&self, bounds: &BoundingBoxWide) -> BVec4A {
        bounds.overlaps_box(&self.bounds_of_2_in_space_of_1)
    }

    #[inline(always)]
    fn should_visit_block(&self, result: &BVec4A) -> bool {
        result.any()
    }

    #[inline(always)]
    fn should_visit_sub_shape(&self, result: &BVec4A, index_in_block: usize) -> bool {
        lane_set(*result, index_in_block)
    }

    fn visit_shape(&mut self, sub_shape: &SubShape, sub_shape_index: u32) {
        let id1 = self.id_creator1.push_id(sub_shape_index, self.sub_shape_bits);
        let transform1 = self.transform1 * sub_shape.local_pose();
        self.dispatch.collide_shape_vs_shape(
            sub_shape.shape.as_ref(),
            self.shape2,
            &transform1,
            &self.transform2,
            &id1,
            &self.id_creator2,
            &self.settings,
            &mut *self.collector,
        );
    }

    #[inline(always)]
    fn should_abort(&self) -> bool {
        self.collector.should_early_out()
    }
}

/// Collides a shape (shape 1) with the children of a compound (shape 2).
pub struct CollideShapeVsCompoundVisitor<'a> {
    shape1: &'a dyn Shape,
    transform1: RigidPose,
    transform2: RigidPose,
    sub_shape_bits: u32,
    id_creator1: SubShapeIdCreator,
    id_creator2: SubShapeIdCreator,
    settings: CollideShapeSettings,
    bounds_of_1_in_space_of_2: BoundingBox,
    dispatch: &'a CollisionDispatch<'a>,
    collector: &'a mut dyn CollisionCollector<CollideShapeResult>,
}

impl<'a> CollideShapeVsCompoundVisitor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shape1: &'a dyn Shape,
        center_of_mass_transform1: &RigidPose,
        center_of_mass_transform2: &RigidPose,
        sub_shape_bits: u32,
        id_creator1: &SubShapeIdCreator,
        id_creator2: &SubShapeIdCreator,
        settings: &CollideShapeSettings,
        dispatch: &'a CollisionDispatch<'a>,
        collector: &'a mut dyn CollisionCollector<CollideShapeResult>,
    ) -> Self {
        let transform1_to_2 = center_of_mass_transform2.inverse() * *center_of_mass_transform1;
        let bounds_of_1_in_space_of_2 = shape1
            .local_bounds()
            .transformed(&transform1_to_2)
            .expanded_by(Vec3::splat(settings.max_separation_distance));
        Self {
            shape1,
            transform1: *center_of_mass_transform1,
            transform2: *center_of_mass_transform2,
            sub_shape_bits,
            id_creator1: *id_creator1,
            id_creator2: *id_creator2,
            settings: *settings,
            bounds_of_1_in_space_of_2,
            dispatch,
            collector,
        }
    }
}

impl SubShapeVisitor for CollideShapeVsCompoundVisitor<'_> {
    type Result = BVec4A;

    #[inline(always)]
    fn test_block(&self, bounds: &BoundingBoxWide) -> BVec4A {
        bounds.overlaps_box(&self.bounds_of_1_in_space_of_2)
    }

    #[inline(always)]
    fn should_visit_block(&self, result: &BVec4A) -> bool {
        result.any()
    }

    #[inline(always)]
    fn should_visit_sub_shape(&self, result: &BVec4A, index_in_block: usize) -> bool {
        lane_set(*result, index_in_block)
    }

    fn visit_shape(&mut self, sub_shape: &SubShape, sub_shape_index: u32) {
        let id2 = self.id_creator2.push_id(sub_shape_index, self.sub_shape_bits);
        let transform2 = self.transform2 * sub_shape.local_pose();
        self.dispatch.collide_shape_vs_shape(
            self.shape1,
            sub_shape.shape.as_ref(),
            &self.transform1,
            &transform2,
            &self.id_creator1,
            &id2,
            &self.settings,
            &mut *self.collector,
        );
    }

    #[inline(always)]
    fn should_abort(&self) -> bool {
        self.collector.should_early_out()
    }
}

/// Volume that can be tested against a block of child bounds.
pub trait BlockOverlapTest {
    fn overlaps_block(&self, bounds: &BoundingBoxWide) -> BVec4A;
}

impl BlockOverlapTest for BoundingBox {
    #[inline(always)]
    fn overlaps_block(&self, bounds: &BoundingBoxWide) -> BVec4A {
        bounds.overlaps_box(self)
    }
}

impl BlockOverlapTest for OrientedBox {
    #[inline(always)]
    fn overlaps_block(&self, bounds: &BoundingBoxWide) -> BVec4A {
        bounds.overlaps_oriented_box(self, ORIENTED_BOX_EPSILON)
    }
}

/// Writes the indices of the children overlapping a volume into a caller provided buffer, stopping when it is full.
pub struct IntersectingSubShapesVisitor<'a, B: BlockOverlapTest> {
    volume: &'a B,
    sub_shape_indices: &'a mut [u32],
    count: usize,
}

impl<'a, B: BlockOverlapTest> IntersectingSubShapesVisitor<'a, B> {
    pub fn new(volume: &'a B, sub_shape_indices: &'a mut [u32]) -> Self {
        Self {
            volume,
            sub_shape_indices,
            count: 0,
        }
    }

    /// Number of indices written.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }
}

impl<B: BlockOverlapTest> SubShapeVisitor for IntersectingSubShapesVisitor<'_, B> {
    type Result = BVec4A;

    #[inline(always)]
    fn test_block(&self, bounds: &BoundingBoxWide) -> BVec4A {
        self.volume.overlaps_block(bounds)
    }

    #[inline(always)]
    fn should_visit_block(&self, result: &BVec4A) -> bool {
        result.any()
    }

    #[inline(always)]
    fn should_visit_sub_shape(&self, result: &BVec4A, index_in_block: usize) -> bool {
        lane_set(*result, index_in_block)
    }

    fn visit_shape(&mut self, _sub_shape: &SubShape, sub_shape_index: u32) {
        if let Some(slot) = self.sub_shape_indices.get_mut(self.count) {
            *slot = sub_shape_index;
            self.count += 1;
        }
    }

    #[inline(always)]
    fn should_abort(&self) -> bool {
        self.count >= self.sub_shape_indices.len()
    }
}

/// Collects the leaf shapes whose bounds overlap a world space box.
pub struct CollectTransformedShapesVisitor<'a> {
    bounds: BoundingBox,
    local_box: OrientedBox,
    position_com: Vec3,
    rotation: Quat,
    sub_shape_bits: u32,
    id_creator: SubShapeIdCreator,
    collector: &'a mut dyn CollisionCollector<TransformedShape>,
}

impl<'a> CollectTransformedShapesVisitor<'a> {
    pub fn new(
        bounds: &BoundingBox,
        position_com: Vec3,
        rotation: Quat,
        sub_shape_bits: u32,
        id_creator: &SubShapeIdCreator,
        collector: &'a mut dyn CollisionCollector<TransformedShape>,
    ) -> Self {
        // The query box as seen from the compound's center of mass space.
        let world_to_local = RigidPose::new(position_com, rotation).inverse();
        Self {
            bounds: *bounds,
            local_box: OrientedBox::from_transformed_box(&world_to_local, bounds),
            position_com,
            rotation,
            sub_shape_bits,
            id_creator: *id_creator,
            collector,
        }
    }
}

impl SubShapeVisitor for CollectTransformedShapesVisitor<'_> {
    type Result = BVec4A;

    #[inline(always)]
    fn test_block(&self, bounds: &BoundingBoxWide) -> BVec4A {
        bounds.overlaps_oriented_box(&self.local_box, ORIENTED_BOX_EPSILON)
    }

    #[inline(always)]
    fn should_visit_block(&self, result: &BVec4A) -> bool {
        result.any()
    }

    #[inline(always)]
    fn should_visit_sub_shape(&self, result: &BVec4A, index_in_block: usize) -> bool {
        lane_set(*result, index_in_block)
    }

    fn visit_shape(&mut self, sub_shape: &SubShape, sub_shape_index: u32) {
        let id = self.id_creator.push_id(sub_shape_index, self.sub_shape_bits);
        let child = sub_shape.center_of_mass_transform(self.position_com, self.rotation);
        sub_shape.shape.collect_transformed_shapes(
            &sub_shape.shape,
            &self.bounds,
            child.position,
            child.orientation,
            &id,
            &mut *self.collector,
        );
    }

    #[inline(always)]
    fn should_abort(&self) -> bool {
        self.collector.should_early_out()
    }
}
