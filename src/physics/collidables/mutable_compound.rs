use std::io::{Read, Write};
use std::sync::Arc;

use glam::{Quat, Vec3};
use log::{debug, warn};

use crate::physics::body_properties::{MassProperties, RigidPose};
use crate::physics::collision_detection::collision_collector::CollisionCollector;
use crate::physics::collision_detection::collision_dispatch::CollisionDispatch;
use crate::physics::collision_detection::shape_queries::{
    CollidePointResult, CollideShapeResult, CollideShapeSettings, ShapeCast, ShapeCastResult, ShapeCastSettings,
};
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::bounding_box_wide::{BoundingBoxWide, BLOCK_WIDTH};
use crate::utilities::memory::StridedSlice;
use crate::utilities::oriented_box::OrientedBox;
use crate::utilities::stream::{StreamIn, StreamOut};

use super::compound::{MutableCompoundShapeSettings, SubShape};
use super::compound_visitors::{
    CastRayCollectorVisitor, CastRayVisitor, CastShapeVisitor, CollectTransformedShapesVisitor,
    CollideCompoundVsShapeVisitor, CollidePointVisitor, CollideShapeVsCompoundVisitor, IntersectingSubShapesVisitor,
    SubShapeVisitor,
};
use super::ray::{RayCast, RayCastResult, RayCastSettings};
use super::shape::{
    Shape, ShapeError, ShapeRef, ShapeResult, ShapeSettings, SubShapeId, SubShapeIdCreator, TransformedShape,
};
use super::sub_shape_bounds::{block_count_for, SubShapeBounds};

/// Compound shape whose children can be added, removed and moved after creation.
///
/// The bounding boxes of the children are kept in blocks of four in structure of arrays form so queries can reject
/// four children with a single test. Every mutation immediately recomputes the bounds of the children it touched and
/// the bounds of the whole compound.
///
/// Children are addressed by index. Removing a child shifts the index of every child after it down by one.
#[derive(Debug, Clone, Default)]
pub struct MutableCompoundShape {
    center_of_mass: Vec3,
    local_bounds: BoundingBox,
    sub_shapes: Vec<SubShape>,
    inner_radius: f32,
    sub_shape_bounds: SubShapeBounds,
}

impl MutableCompoundShape {
    /// Compounds with at most this many children compute world space bounds from the children instead of from the
    /// transformed local bounds, which gives a tighter fit when rotated.
    pub const WORLD_BOUNDS_CHILD_THRESHOLD: usize = 10;

    /// Builds a compound from settings. The center of mass is placed at the mass weighted center of the children.
    pub fn new(settings: &MutableCompoundShapeSettings) -> ShapeResult<Self> {
        let sub_shapes = settings
            .sub_shapes
            .iter()
            .map(SubShape::from_settings)
            .collect::<ShapeResult<Vec<_>>>()?;

        let mut shape = Self {
            sub_shapes,
            ..Self::default()
        };
        shape.recenter();
        shape.calculate_sub_shape_bounds(0, shape.sub_shapes.len());

        let required = shape.sub_shape_id_bits_recursive();
        if required > SubShapeId::MAX_BITS {
            warn!(
                "Compound with {} sub shapes needs {} sub shape ID bits, only {} available",
                shape.sub_shapes.len(),
                required,
                SubShapeId::MAX_BITS
            );
            return Err(ShapeError::SubShapeIdBitsExceeded {
                required,
                max: SubShapeId::MAX_BITS,
            });
        }

        debug!(
            "Created mutable compound with {} sub shapes, center of mass {}",
            shape.sub_shapes.len(),
            shape.center_of_mass
        );
        Ok(shape)
    }

    /// Creates a compound without children. Its center of mass is the origin.
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn sub_shapes(&self) -> &[SubShape] {
        &self.sub_shapes
    }

    #[inline]
    pub fn num_sub_shapes(&self) -> usize {
        self.sub_shapes.len()
    }

    pub fn sub_shape(&self, index: usize) -> ShapeResult<&SubShape> {
        self.sub_shapes.get(index).ok_or(ShapeError::IndexOutOfRange {
            index,
            count: self.sub_shapes.len(),
        })
    }

    /// Number of blocks of four children in use.
    #[inline]
    pub fn block_count(&self) -> usize {
        block_count_for(self.sub_shapes.len())
    }

    /// Bounds of the block of children `4 * block .. 4 * block + 4`, in center of mass space.
    #[inline]
    pub fn block_bounds(&self, block: usize) -> BoundingBoxWide {
        debug_assert!(block < self.block_count(), "Block index out of range.");
        self.sub_shape_bounds.block(block)
    }

    /// Bits needed to store the index of a child in a `SubShapeId`.
    #[inline]
    pub fn sub_shape_id_bits(&self) -> u32 {
        match self.sub_shapes.len() {
            0 => 0,
            count => u32::BITS - ((count - 1) as u32).leading_zeros(),
        }
    }

    /// Splits `id` into the index of the child it addresses and the id relative to that child.
    #[inline]
    pub fn sub_shape_index_from_id(&self, id: SubShapeId) -> (u32, SubShapeId) {
        id.pop_id(self.sub_shape_id_bits())
    }

    /// User data of the child addressed by the first level of `id`.
    pub fn sub_shape_user_data(&self, id: SubShapeId) -> ShapeResult<u32> {
        let (index, _) = self.sub_shape_index_from_id(id);
        Ok(self.sub_shape(index as usize)?.user_data)
    }

    /// Appends a child and returns its index. `position` and `rotation` are relative to the compound's origin.
    ///
    /// The center of mass is left where it is; call `adjust_center_of_mass` after a batch of edits if it matters.
    pub fn add_shape(&mut self, position: Vec3, rotation: Quat, shape: ShapeRef, user_data: u32) -> u32 {
        self.sub_shapes
            .push(SubShape::new(shape, position, rotation, self.center_of_mass, user_data));
        let index = self.sub_shapes.len() - 1;
        self.calculate_sub_shape_bounds(index, 1);
        index as u32
    }

    /// Removes a child. Children after it move down one index.
    pub fn remove_shape(&mut self, index: usize) -> ShapeResult<()> {
        self.check_index(index)?;
        self.sub_shapes.remove(index);

        let count = self.sub_shapes.len();
        if index < count {
            self.calculate_sub_shape_bounds(index, count - index);
        } else if count > 0 {
            // Rewrite the padding of the now last block so it no longer holds the removed child.
            self.calculate_sub_shape_bounds(count - 1, 1);
        } else {
            self.calculate_local_bounds();
        }
        Ok(())
    }

    /// Moves a child.
    pub fn modify_shape(&mut self, index: usize, position: Vec3, rotation: Quat) -> ShapeResult<()> {
        self.check_index(index)?;
        let center_of_mass = self.center_of_mass;
        self.sub_shapes[index].set_transform(position, rotation, center_of_mass);
        self.calculate_sub_shape_bounds(index, 1);
        Ok(())
    }

    /// Moves a child and replaces its shape.
    pub fn modify_shape_with(&mut self, index: usize, position: Vec3, rotation: Quat, shape: ShapeRef) -> ShapeResult<()> {
        self.check_index(index)?;
        let center_of_mass = self.center_of_mass;
        let sub_shape = &mut self.sub_shapes[index];
        sub_shape.shape = shape;
        sub_shape.set_transform(position, rotation, center_of_mass);
        self.calculate_sub_shape_bounds(index, 1);
        Ok(())
    }

    /// Moves `count` children starting at `start`, reading their new positions and rotations from strided buffers.
    /// Bounds are recomputed once for the whole range.
    pub fn modify_shapes(
        &mut self,
        start: usize,
        count: usize,
        positions: StridedSlice<Vec3>,
        rotations: StridedSlice<Quat>,
    ) -> ShapeResult<()> {
        let len = self.sub_shapes.len();
        let end = start
            .checked_add(count)
            .filter(|&end| end <= len)
            .ok_or(ShapeError::RangeOutOfBounds { start, count, len })?;
        for available in [positions.len(), rotations.len()] {
            if available < count {
                return Err(ShapeError::StridedBufferTooShort {
                    required: count,
                    available,
                });
            }
        }
        if count == 0 {
            return Ok(());
        }

        let center_of_mass = self.center_of_mass;
        for ((sub_shape, position), rotation) in self.sub_shapes[start..end]
            .iter_mut()
            .zip(positions.iter())
            .zip(rotations.iter())
        {
            sub_shape.set_transform(position, rotation, center_of_mass);
        }
        self.calculate_sub_shape_bounds(start, count);
        Ok(())
    }

    /// Moves the center of mass to the mass weighted center of the children and recomputes all bounds.
    pub fn adjust_center_of_mass(&mut self) {
        self.recenter();
        self.calculate_sub_shape_bounds(0, self.sub_shapes.len());
    }

    /// Visits the children whose bounds pass the visitor's tests.
    ///
    /// Blocks are tested in ascending order and children within a block in ascending order, so the visiting order is
    /// fixed for a given set of children.
    pub fn walk_sub_shapes<V: SubShapeVisitor>(&self, visitor: &mut V) {
        let count = self.sub_shapes.len();
        for block in 0..self.block_count() {
            let result = visitor.test_block(&self.sub_shape_bounds.block(block));
            if !visitor.should_visit_block(&result) {
                continue;
            }

            let start = block * BLOCK_WIDTH;
            // The last block can be partially filled; its padding slots are never visited.
            for index_in_block in 0..BLOCK_WIDTH.min(count - start) {
                // The visitor's threshold can change while visiting, so every child is tested again.
                if visitor.should_visit_sub_shape(&result, index_in_block) {
                    let index = start + index_in_block;
                    visitor.visit_shape(&self.sub_shapes[index], index as u32);
                    if visitor.should_abort() {
                        return;
                    }
                }
            }
        }
    }

    /// Sweeps a shape against the children. `shape_cast` is expressed in the compound's center of mass space and
    /// `center_of_mass_transform2` places the compound in the world.
    #[allow(clippy::too_many_arguments)]
    pub fn cast_shape(
        &self,
        shape_cast: &ShapeCast,
        settings: &ShapeCastSettings,
        center_of_mass_transform2: &RigidPose,
        id_creator1: &SubShapeIdCreator,
        id_creator2: &SubShapeIdCreator,
        dispatch: &CollisionDispatch,
        collector: &mut dyn CollisionCollector<ShapeCastResult>,
    ) {
        let mut visitor = CastShapeVisitor::new(
            shape_cast,
            settings,
            center_of_mass_transform2,
            self.sub_shape_id_bits(),
            id_creator1,
            id_creator2,
            dispatch,
            collector,
        );
        self.walk_sub_shapes(&mut visitor);
    }

    /// Collides the children of this compound (shape 1) with `shape2`.
    #[allow(clippy::too_many_arguments)]
    pub fn collide_compound_vs_shape(
        &self,
        shape2: &dyn Shape,
        center_of_mass_transform1: &RigidPose,
        center_of_mass_transform2: &RigidPose,
        id_creator1: &SubShapeIdCreator,
        id_creator2: &SubShapeIdCreator,
        settings: &CollideShapeSettings,
        dispatch: &CollisionDispatch,
        collector: &mut dyn CollisionCollector<CollideShapeResult>,
    ) {
        let mut visitor = CollideCompoundVsShapeVisitor::new(
            shape2,
            center_of_mass_transform1,
            center_of_mass_transform2,
            self.sub_shape_id_bits(),
            id_creator1,
            id_creator2,
            settings,
            dispatch,
            collector,
        );
        self.walk_sub_shapes(&mut visitor);
    }

    /// Collides `shape1` with the children of this compound (shape 2).
    #[allow(clippy::too_many_arguments)]
    pub fn collide_shape_vs_compound(
        &self,
        shape1: &dyn Shape,
        center_of_mass_transform1: &RigidPose,
        center_of_mass_transform2: &RigidPose,
        id_creator1: &SubShapeIdCreator,
        id_creator2: &SubShapeIdCreator,
        settings: &CollideShapeSettings,
        dispatch: &CollisionDispatch,
        collector: &mut dyn CollisionCollector<CollideShapeResult>,
    ) {
        let mut visitor = CollideShapeVsCompoundVisitor::new(
            shape1,
            center_of_mass_transform1,
            center_of_mass_transform2,
            self.sub_shape_id_bits(),
            id_creator1,
            id_creator2,
            settings,
            dispatch,
            collector,
        );
        self.walk_sub_shapes(&mut visitor);
    }

    /// Writes the indices of the children whose bounds overlap `bounds` (center of mass space) into
    /// `sub_shape_indices`. Stops when the buffer is full. Returns the number of indices written.
    pub fn intersecting_sub_shapes(&self, bounds: &BoundingBox, sub_shape_indices: &mut [u32]) -> usize {
        if sub_shape_indices.is_empty() {
            return 0;
        }
        let mut visitor = IntersectingSubShapesVisitor::new(bounds, sub_shape_indices);
        self.walk_sub_shapes(&mut visitor);
        visitor.count()
    }

    /// Oriented box variant of `intersecting_sub_shapes`.
    pub fn intersecting_sub_shapes_oriented(&self, oriented_box: &OrientedBox, sub_shape_indices: &mut [u32]) -> usize {
        if sub_shape_indices.is_empty() {
            return 0;
        }
        let mut visitor = IntersectingSubShapesVisitor::new(oriented_box, sub_shape_indices);
        self.walk_sub_shapes(&mut visitor);
        visitor.count()
    }

    /// Child shapes in index order. These are not part of the binary state and must be stored by the caller.
    pub fn sub_shape_refs(&self) -> Vec<ShapeRef> {
        self.sub_shapes.iter().map(|sub_shape| sub_shape.shape.clone()).collect()
    }

    /// Writes the compound's state followed by the bounds of all used blocks.
    pub fn save_binary_state<W: Write + ?Sized>(&self, stream: &mut W) -> ShapeResult<()> {
        stream.write_value(&self.center_of_mass)?;
        stream.write_value(&self.local_bounds.min)?;
        stream.write_value(&self.local_bounds.max)?;
        stream.write_value(&self.inner_radius)?;
        stream.write_value(&(self.sub_shapes.len() as u32))?;
        for sub_shape in &self.sub_shapes {
            stream.write_value(&sub_shape.position_com)?;
            stream.write_value(&sub_shape.rotation)?;
            stream.write_value(&sub_shape.user_data)?;
            stream.write_value(&u32::from(sub_shape.is_rotation_identity))?;
        }
        self.sub_shape_bounds.save(stream, self.block_count())?;
        Ok(())
    }

    /// Restores state written by `save_binary_state`. `shapes` are the child shapes, in the order returned by
    /// `sub_shape_refs` at save time. On error the compound is left as it was.
    pub fn restore_binary_state<R: Read + ?Sized>(&mut self, stream: &mut R, shapes: &[ShapeRef]) -> ShapeResult<()> {
        let center_of_mass: Vec3 = stream.read_value()?;
        let min: Vec3 = stream.read_value()?;
        let max: Vec3 = stream.read_value()?;
        let inner_radius: f32 = stream.read_value()?;
        let count = stream.read_value::<u32>()? as usize;
        if count != shapes.len() {
            return Err(ShapeError::SubShapeCountMismatch {
                expected: count,
                provided: shapes.len(),
            });
        }

        let mut sub_shapes = Vec::with_capacity(count);
        for shape in shapes {
            let position_com: Vec3 = stream.read_value()?;
            let rotation: Quat = stream.read_value()?;
            let user_data: u32 = stream.read_value()?;
            let is_rotation_identity = stream.read_value::<u32>()? != 0;
            sub_shapes.push(SubShape {
                shape: shape.clone(),
                position_com,
                rotation,
                user_data,
                is_rotation_identity,
            });
        }

        let mut sub_shape_bounds = SubShapeBounds::new();
        sub_shape_bounds.restore(stream, block_count_for(count))?;

        // Nothing is committed until the whole state has been read.
        self.center_of_mass = center_of_mass;
        self.local_bounds = BoundingBox::new(min, max);
        self.inner_radius = inner_radius;
        self.sub_shapes = sub_shapes;
        self.sub_shape_bounds = sub_shape_bounds;

        debug!("Restored mutable compound with {} sub shapes", count);
        Ok(())
    }

    /// Creates a compound from state written by `save_binary_state`.
    pub fn from_binary_state<R: Read + ?Sized>(stream: &mut R, shapes: &[ShapeRef]) -> ShapeResult<Self> {
        let mut shape = Self::default();
        shape.restore_binary_state(stream, shapes)?;
        Ok(shape)
    }

    #[inline]
    fn check_index(&self, index: usize) -> ShapeResult<()> {
        if index < self.sub_shapes.len() {
            Ok(())
        } else {
            Err(ShapeError::IndexOutOfRange {
                index,
                count: self.sub_shapes.len(),
            })
        }
    }

    /// Re-expresses the children around their mass weighted center and moves the center of mass there.
    fn recenter(&mut self) {
        let mut mass = 0.0;
        let mut center_of_mass = Vec3::ZERO;
        for sub_shape in &self.sub_shapes {
            let child_mass = sub_shape.shape.mass_properties().mass;
            mass += child_mass;
            center_of_mass += sub_shape.position_com * child_mass;
        }
        if mass > 0.0 {
            center_of_mass /= mass;
        }

        for sub_shape in &mut self.sub_shapes {
            sub_shape.position_com -= center_of_mass;
        }
        self.center_of_mass += center_of_mass;
    }

    /// Recomputes the bounds of every block touched by children `start .. start + count`, then the compound bounds.
    fn calculate_sub_shape_bounds(&mut self, start: usize, count: usize) {
        let len = self.sub_shapes.len();
        debug_assert!(start + count <= len, "Bounds range exceeds the sub shapes.");
        self.sub_shape_bounds.ensure_capacity(len);

        let end = start + count;
        let mut block_start = start & !(BLOCK_WIDTH - 1);
        while block_start < end {
            let mut boxes = [BoundingBox::empty(); BLOCK_WIDTH];
            let mut bounds = BoundingBox::empty();
            for (slot, slot_bounds) in boxes.iter_mut().enumerate() {
                // Slots past the last child repeat the previous box.
                if let Some(sub_shape) = self.sub_shapes.get(block_start + slot) {
                    bounds = sub_shape.shape.world_space_bounds(&sub_shape.local_pose());
                }
                *slot_bounds = bounds;
            }
            self.sub_shape_bounds
                .set_block(block_start / BLOCK_WIDTH, &BoundingBoxWide::from_boxes(&boxes));
            block_start += BLOCK_WIDTH;
        }

        self.calculate_local_bounds();
    }

    fn calculate_local_bounds(&mut self) {
        self.local_bounds = self.sub_shape_bounds.union(self.block_count());
        self.calculate_inner_radius();
    }

    fn calculate_inner_radius(&mut self) {
        self.inner_radius = self
            .sub_shapes
            .iter()
            .map(|sub_shape| sub_shape.shape.inner_radius())
            .reduce(f32::min)
            .unwrap_or(0.0);
    }
}

impl Shape for MutableCompoundShape {
    #[inline]
    fn center_of_mass(&self) -> Vec3 {
        self.center_of_mass
    }

    #[inline]
    fn local_bounds(&self) -> BoundingBox {
        self.local_bounds
    }

    fn world_space_bounds(&self, center_of_mass_transform: &RigidPose) -> BoundingBox {
        if self.sub_shapes.len() <= Self::WORLD_BOUNDS_CHILD_THRESHOLD {
            let mut bounds = BoundingBox::empty();
            for sub_shape in &self.sub_shapes {
                let transform = *center_of_mass_transform * sub_shape.local_pose();
                bounds.encapsulate(&sub_shape.shape.world_space_bounds(&transform));
            }
            bounds
        } else {
            self.local_bounds.transformed(center_of_mass_transform)
        }
    }

    #[inline]
    fn inner_radius(&self) -> f32 {
        self.inner_radius
    }

    fn mass_properties(&self) -> MassProperties {
        let mut properties = MassProperties::default();
        for sub_shape in &self.sub_shapes {
            let mut child = sub_shape.shape.mass_properties();
            child.rotate(sub_shape.rotation);
            child.translate(sub_shape.position_com);
            properties.mass += child.mass;
            properties.inertia += child.inertia;
        }
        properties
    }

    fn sub_shape_id_bits_recursive(&self) -> u32 {
        let deepest_child = self
            .sub_shapes
            .iter()
            .map(|sub_shape| sub_shape.shape.sub_shape_id_bits_recursive())
            .max()
            .unwrap_or(0);
        self.sub_shape_id_bits() + deepest_child
    }

    fn cast_ray(&self, ray: &RayCast, id_creator: &SubShapeIdCreator, hit: &mut RayCastResult) -> bool {
        let mut visitor = CastRayVisitor::new(ray, self.sub_shape_id_bits(), id_creator, hit);
        self.walk_sub_shapes(&mut visitor);
        visitor.return_value
    }

    fn cast_ray_collect(
        &self,
        ray: &RayCast,
        settings: &RayCastSettings,
        id_creator: &SubShapeIdCreator,
        collector: &mut dyn CollisionCollector<RayCastResult>,
    ) {
        let mut visitor = CastRayCollectorVisitor::new(ray, settings, self.sub_shape_id_bits(), id_creator, collector);
        self.walk_sub_shapes(&mut visitor);
    }

    fn collide_point(
        &self,
        point: Vec3,
        id_creator: &SubShapeIdCreator,
        collector: &mut dyn CollisionCollector<CollidePointResult>,
    ) {
        let mut visitor = CollidePointVisitor::new(point, self.sub_shape_id_bits(), id_creator, collector);
        self.walk_sub_shapes(&mut visitor);
    }

    fn collect_transformed_shapes(
        &self,
        _this: &ShapeRef,
        bounds: &BoundingBox,
        position_com: Vec3,
        rotation: Quat,
        id_creator: &SubShapeIdCreator,
        collector: &mut dyn CollisionCollector<TransformedShape>,
    ) {
        let mut visitor = CollectTransformedShapesVisitor::new(
            bounds,
            position_com,
            rotation,
            self.sub_shape_id_bits(),
            id_creator,
            collector,
        );
        self.walk_sub_shapes(&mut visitor);
    }

    #[inline]
    fn as_mutable_compound(&self) -> Option<&MutableCompoundShape> {
        Some(self)
    }
}

impl ShapeSettings for MutableCompoundShapeSettings {
    fn create(&self) -> ShapeResult<ShapeRef> {
        Ok(Arc::new(MutableCompoundShape::new(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collidables::box_shape::BoxShape;
    use crate::physics::collidables::sphere::{SphereShape, SphereShapeSettings};
    use crate::physics::collision_detection::collision_collector::{
        AllHitCollector, AnyHitCollector, ClosestHitCollector, CollisionResult,
    };
    use crate::physics::collision_detection::collision_dispatch::LeafCollider;
    use approx::assert_relative_eq;
    use glam::Mat3;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sphere(radius: f32) -> ShapeRef {
        Arc::new(SphereShape::new(radius))
    }

    fn cuboid(half_extent: Vec3) -> ShapeRef {
        Arc::new(BoxShape::new(half_extent))
    }

    /// Boxes spread along a diagonal with varying rotations.
    fn box_compound(count: usize) -> MutableCompoundShape {
        let mut settings = MutableCompoundShapeSettings::new();
        for i in 0..count {
            let t = i as f32;
            settings.add_shape(
                Vec3::new(3.0 * t, t, -0.5 * t),
                Quat::from_rotation_y(0.3 * t),
                cuboid(Vec3::new(0.5 + 0.1 * t, 1.0, 0.25)),
                i as u32,
            );
        }
        MutableCompoundShape::new(&settings).unwrap()
    }

    /// Unit spheres at x = 0, 2, 4, 6 and 10 around a center of mass at the origin.
    fn five_spheres() -> MutableCompoundShape {
        let mut compound = MutableCompoundShape::empty();
        for x in [0.0, 2.0, 4.0, 6.0, 10.0] {
            compound.add_shape(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, sphere(1.0), 0);
        }
        compound
    }

    fn brute_force_union(compound: &MutableCompoundShape) -> BoundingBox {
        let mut bounds = BoundingBox::empty();
        for sub_shape in compound.sub_shapes() {
            bounds.encapsulate(&sub_shape.shape.world_space_bounds(&sub_shape.local_pose()));
        }
        bounds
    }

    fn child_bounds(sub_shape: &SubShape) -> BoundingBox {
        sub_shape.shape.world_space_bounds(&sub_shape.local_pose())
    }

    fn assert_blocks_match_children(compound: &MutableCompoundShape) {
        let count = compound.num_sub_shapes();
        assert_eq!(compound.block_count(), count.div_ceil(BLOCK_WIDTH));
        let Some(last) = compound.sub_shapes().last() else {
            return;
        };
        for slot in 0..compound.block_count() * BLOCK_WIDTH {
            let stored = compound.block_bounds(slot / BLOCK_WIDTH).get(slot % BLOCK_WIDTH);
            let expected = match compound.sub_shapes().get(slot) {
                Some(sub_shape) => child_bounds(sub_shape),
                None => child_bounds(last),
            };
            assert_eq!(stored, expected, "slot {slot} of {count} sub shapes");
        }
    }

    fn all_blocks(compound: &MutableCompoundShape) -> Vec<BoundingBoxWide> {
        (0..compound.block_count()).map(|block| compound.block_bounds(block)).collect()
    }

    fn cast(compound: &MutableCompoundShape, ray: &RayCast) -> Option<RayCastResult> {
        let mut hit = RayCastResult::default();
        compound
            .cast_ray(ray, &SubShapeIdCreator::default(), &mut hit)
            .then_some(hit)
    }

    /// Treats every leaf as a sphere of its inner radius around its center of mass.
    struct SphereLeafCollider;

    impl LeafCollider for SphereLeafCollider {
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
        ) {
            let (radius1, radius2) = (shape1.inner_radius(), shape2.inner_radius());
            let delta = center_of_mass_transform2.position - center_of_mass_transform1.position;
            let distance = delta.length();
            let penetration_depth = radius1 + radius2 - distance;
            if penetration_depth + settings.max_separation_distance < 0.0 {
                return;
            }
            let axis = delta.try_normalize().unwrap_or(Vec3::X);
            let result = CollideShapeResult {
                contact_point_on1: center_of_mass_transform1.position + axis * radius1,
                contact_point_on2: center_of_mass_transform2.position - axis * radius2,
                penetration_axis: axis,
                penetration_depth,
                sub_shape_id1: id_creator1.id(),
                sub_shape_id2: id_creator2.id(),
            };
            if result.early_out_fraction() < collector.early_out_fraction() {
                collector.add_hit(result);
            }
        }

        fn cast_leaf(
            &self,
            shape_cast: &ShapeCast,
            _settings: &ShapeCastSettings,
            shape: &dyn Shape,
            _center_of_mass_transform2: &RigidPose,
            id_creator1: &SubShapeIdCreator,
            id_creator2: &SubShapeIdCreator,
            collector: &mut dyn CollisionCollector<ShapeCastResult>,
        ) {
            let swept = SphereShape::new(shape_cast.shape.inner_radius() + shape.inner_radius());
            let ray = RayCast::new(shape_cast.center_of_mass_start.position, shape_cast.direction);
            let mut hit = RayCastResult::default();
            if swept.cast_ray(&ray, &SubShapeIdCreator::default(), &mut hit)
                && hit.fraction < collector.early_out_fraction()
            {
                collector.add_hit(ShapeCastResult {
                    fraction: hit.fraction,
                    penetration_axis: shape_cast.direction.normalize_or_zero(),
                    sub_shape_id1: id_creator1.id(),
                    sub_shape_id2: id_creator2.id(),
                    ..Default::default()
                });
            }
        }
    }

    /// Reports a fixed sub shape id budget so hierarchies can be made arbitrarily deep.
    #[derive(Debug)]
    struct DeepShape;

    impl Shape for DeepShape {
        fn local_bounds(&self) -> BoundingBox {
            BoundingBox::from_center_and_extent(Vec3::ZERO, Vec3::ONE)
        }

        fn inner_radius(&self) -> f32 {
            1.0
        }

        fn mass_properties(&self) -> MassProperties {
            MassProperties {
                mass: 1.0,
                inertia: Mat3::IDENTITY,
            }
        }

        fn sub_shape_id_bits_recursive(&self) -> u32 {
            30
        }

        fn cast_ray(&self, _ray: &RayCast, _id_creator: &SubShapeIdCreator, _hit: &mut RayCastResult) -> bool {
            false
        }

        fn cast_ray_collect(
            &self,
            _ray: &RayCast,
            _settings: &RayCastSettings,
            _id_creator: &SubShapeIdCreator,
            _collector: &mut dyn CollisionCollector<RayCastResult>,
        ) {
        }

        fn collide_point(
            &self,
            _point: Vec3,
            _id_creator: &SubShapeIdCreator,
            _collector: &mut dyn CollisionCollector<CollidePointResult>,
        ) {
        }
    }

    #[test]
    fn empty_compound_has_no_bounds_and_no_hits() {
        let compound = MutableCompoundShape::new(&MutableCompoundShapeSettings::new()).unwrap();
        assert_eq!(compound.num_sub_shapes(), 0);
        assert_eq!(compound.block_count(), 0);
        assert!(!compound.local_bounds().is_valid());
        assert_eq!(compound.inner_radius(), 0.0);
        assert_eq!(compound.sub_shape_id_bits(), 0);

        let ray = RayCast::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::new(20.0, 0.0, 0.0));
        assert!(cast(&compound, &ray).is_none());

        let mut points = AllHitCollector::new();
        compound.collide_point(Vec3::ZERO, &SubShapeIdCreator::default(), &mut points);
        assert!(!points.had_hit());

        let mut indices = [0u32; 4];
        let everything = BoundingBox::from_center_and_extent(Vec3::ZERO, Vec3::splat(1000.0));
        assert_eq!(compound.intersecting_sub_shapes(&everything, &mut indices), 0);
    }

    #[test]
    fn padding_slots_repeat_the_last_child() {
        for count in [1, 3, 4, 5, 8, 9] {
            let compound = box_compound(count);
            assert_blocks_match_children(&compound);
            assert_eq!(compound.local_bounds(), brute_force_union(&compound), "{count} sub shapes");
        }
    }

    #[test]
    fn nearest_ray_hit_is_found_in_second_block() {
        let compound = five_spheres();
        let ray = RayCast::new(Vec3::new(20.0, 0.0, 0.0), Vec3::new(-40.0, 0.0, 0.0));
        let hit = cast(&compound, &ray).unwrap();
        assert_relative_eq!(hit.fraction, 0.225, epsilon = 1e-6);

        let (index, remainder) = compound.sub_shape_index_from_id(hit.sub_shape_id);
        assert_eq!(index, 4);
        assert!(remainder.is_empty());
    }

    #[test]
    fn nearest_ray_hit_accounts_for_center_of_mass() {
        let mut settings = MutableCompoundShapeSettings::new();
        for x in [0.0, 2.0, 4.0, 6.0, 10.0] {
            settings.add_shape(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, sphere(1.0), 0);
        }
        let compound = MutableCompoundShape::new(&settings).unwrap();
        assert_relative_eq!(compound.center_of_mass().x, 4.4, epsilon = 1e-5);

        let ray = RayCast::new(Vec3::new(20.0, 0.0, 0.0) - compound.center_of_mass(), Vec3::new(-40.0, 0.0, 0.0));
        let hit = cast(&compound, &ray).unwrap();
        assert_relative_eq!(hit.fraction, 0.225, epsilon = 1e-5);
        assert_eq!(compound.sub_shape_index_from_id(hit.sub_shape_id).0, 4);
    }

    #[test]
    fn repeated_ray_casts_agree() {
        let compound = box_compound(9);
        let ray = RayCast::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(40.0, 4.0, -2.0));
        let first = cast(&compound, &ray);
        for _ in 0..16 {
            assert_eq!(cast(&compound, &ray), first);
        }
    }

    #[test]
    fn collector_ray_cast_reports_every_child_on_the_line() {
        let compound = five_spheres();
        let ray = RayCast::new(Vec3::new(-2.0, 0.0, 0.0), Vec3::new(14.0, 0.0, 0.0));
        let mut collector = AllHitCollector::new();
        compound.cast_ray_collect(&ray, &RayCastSettings::default(), &SubShapeIdCreator::default(), &mut collector);
        collector.sort();

        let indices: Vec<u32> = collector
            .hits
            .iter()
            .map(|hit| compound.sub_shape_index_from_id(hit.sub_shape_id).0)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_relative_eq!(collector.hits[0].fraction, 1.0 / 14.0, epsilon = 1e-6);
    }

    #[test]
    fn point_query_reports_containing_children() {
        let compound = five_spheres();
        let mut collector = AllHitCollector::new();
        compound.collide_point(Vec3::new(9.5, 0.0, 0.0), &SubShapeIdCreator::default(), &mut collector);
        assert_eq!(collector.hits.len(), 1);
        assert_eq!(compound.sub_shape_index_from_id(collector.hits[0].sub_shape_id).0, 4);

        // Touching spheres both contain their contact point.
        let mut touching = AllHitCollector::new();
        compound.collide_point(Vec3::new(1.0, 0.0, 0.0), &SubShapeIdCreator::default(), &mut touching);
        assert_eq!(touching.hits.len(), 2);
    }

    #[test]
    fn modifying_with_identical_arguments_is_idempotent() {
        let mut compound = box_compound(6);
        let position = Vec3::new(1.0, -2.0, 3.0);
        let rotation = Quat::from_rotation_x(0.7);

        compound.modify_shape(4, position, rotation).unwrap();
        let bounds = compound.local_bounds();
        let blocks = all_blocks(&compound);

        compound.modify_shape(4, position, rotation).unwrap();
        assert_eq!(compound.local_bounds(), bounds);
        assert_eq!(all_blocks(&compound), blocks);
        assert_blocks_match_children(&compound);
    }

    #[test]
    fn add_then_remove_restores_bounds() {
        let mut compound = box_compound(5);
        let bounds = compound.local_bounds();
        let blocks = all_blocks(&compound);

        let index = compound.add_shape(Vec3::new(50.0, 0.0, 0.0), Quat::IDENTITY, sphere(2.0), 99);
        assert_eq!(index, 5);
        assert_relative_eq!(
            compound.local_bounds().max.x,
            52.0 - compound.center_of_mass().x,
            epsilon = 1e-4
        );

        compound.remove_shape(index as usize).unwrap();
        assert_eq!(compound.num_sub_shapes(), 5);
        assert_eq!(compound.local_bounds(), bounds);
        assert_eq!(all_blocks(&compound), blocks);
    }

    #[test]
    fn removal_shifts_later_children() {
        let mut compound = box_compound(6);
        compound.remove_shape(1).unwrap();
        let user_data: Vec<u32> = compound.sub_shapes().iter().map(|sub_shape| sub_shape.user_data).collect();
        assert_eq!(user_data, vec![0, 2, 3, 4, 5]);
        assert_blocks_match_children(&compound);
        assert_eq!(compound.local_bounds(), brute_force_union(&compound));

        // Dropping the last child must not leave its box behind in the padding.
        compound.remove_shape(4).unwrap();
        assert_blocks_match_children(&compound);
        assert_eq!(compound.local_bounds(), brute_force_union(&compound));

        while compound.num_sub_shapes() > 0 {
            compound.remove_shape(0).unwrap();
        }
        assert!(!compound.local_bounds().is_valid());
        assert_eq!(compound.inner_radius(), 0.0);
    }

    #[test]
    fn misuse_is_reported() {
        let mut compound = box_compound(3);
        assert!(matches!(
            compound.remove_shape(3),
            Err(ShapeError::IndexOutOfRange { index: 3, count: 3 })
        ));
        assert!(matches!(
            compound.modify_shape(7, Vec3::ZERO, Quat::IDENTITY),
            Err(ShapeError::IndexOutOfRange { index: 7, count: 3 })
        ));
        assert!(compound
            .modify_shape_with(3, Vec3::ZERO, Quat::IDENTITY, sphere(1.0))
            .is_err());

        let positions = [Vec3::ZERO; 2];
        let rotations = [Quat::IDENTITY; 2];
        assert!(matches!(
            compound.modify_shapes(2, 2, StridedSlice::from_slice(&positions), StridedSlice::from_slice(&rotations)),
            Err(ShapeError::RangeOutOfBounds { start: 2, count: 2, len: 3 })
        ));
        assert!(matches!(
            compound.modify_shapes(0, 3, StridedSlice::from_slice(&positions), StridedSlice::from_slice(&rotations)),
            Err(ShapeError::StridedBufferTooShort { required: 3, available: 2 })
        ));
        assert_eq!(compound.num_sub_shapes(), 3);
    }

    #[test]
    fn strided_bulk_modify_matches_single_modifies() {
        let positions: Vec<Vec3> = (0..4).map(|i| Vec3::new(i as f32, 2.0 * i as f32, -1.0)).collect();
        let rotations: Vec<Quat> = (0..4).map(|i| Quat::from_rotation_z(0.1 * i as f32)).collect();

        // Interleave as { position: Vec3, padding: f32, rotation: Quat }, 32 bytes per element.
        let mut bytes = Vec::new();
        for (position, rotation) in positions.iter().zip(&rotations) {
            bytes.extend_from_slice(bytemuck::bytes_of(position));
            bytes.extend_from_slice(bytemuck::bytes_of(&0.0f32));
            bytes.extend_from_slice(bytemuck::bytes_of(rotation));
        }
        assert_eq!(bytes.len(), 4 * 32);

        let mut bulk = box_compound(8);
        let mut single = bulk.clone();
        bulk.modify_shapes(
            2,
            4,
            StridedSlice::new(&bytes, 32),
            StridedSlice::new(&bytes[16..], 32),
        )
        .unwrap();
        for (offset, (position, rotation)) in positions.iter().zip(&rotations).enumerate() {
            single.modify_shape(2 + offset, *position, *rotation).unwrap();
        }

        assert_eq!(bulk.local_bounds(), single.local_bounds());
        assert_eq!(all_blocks(&bulk), all_blocks(&single));
        for (a, b) in bulk.sub_shapes().iter().zip(single.sub_shapes()) {
            assert_eq!(a.position_com, b.position_com);
            assert_eq!(a.rotation, b.rotation);
        }
    }

    #[test]
    fn adjusting_center_of_mass_recenters_children() {
        let mut compound = MutableCompoundShape::empty();
        compound.add_shape(Vec3::ZERO, Quat::IDENTITY, sphere(1.0), 0);
        compound.add_shape(Vec3::new(4.0, 0.0, 0.0), Quat::IDENTITY, sphere(1.0), 0);
        assert_eq!(compound.center_of_mass(), Vec3::ZERO);

        compound.adjust_center_of_mass();
        let center_of_mass = compound.center_of_mass();
        assert_eq!(center_of_mass, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(compound.sub_shapes()[0].position_com, Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(compound.sub_shapes()[1].position(center_of_mass), Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(
            compound.local_bounds(),
            BoundingBox::new(Vec3::new(-3.0, -1.0, -1.0), Vec3::new(3.0, 1.0, 1.0))
        );
    }

    #[test]
    fn heavier_children_pull_the_center_of_mass() {
        let mut settings = MutableCompoundShapeSettings::new();
        settings
            .add_shape(Vec3::ZERO, Quat::IDENTITY, sphere(1.0), 0)
            .add_shape_settings(Vec3::new(9.0, 0.0, 0.0), Quat::IDENTITY, Arc::new(SphereShapeSettings::new(2.0)), 1);
        let compound = MutableCompoundShape::new(&settings).unwrap();
        // Masses are 1 : 8.
        assert_relative_eq!(compound.center_of_mass().x, 8.0, epsilon = 1e-4);
        assert_eq!(compound.inner_radius(), 1.0);
    }

    #[test]
    fn failing_child_settings_fail_creation() {
        let mut settings = MutableCompoundShapeSettings::new();
        settings.add_shape_settings(Vec3::ZERO, Quat::IDENTITY, Arc::new(SphereShapeSettings::new(0.0)), 0);
        assert!(matches!(
            MutableCompoundShape::new(&settings),
            Err(ShapeError::InvalidRadius(_))
        ));
    }

    #[test]
    fn too_many_sub_shape_id_bits_fail_creation() {
        let _ = env_logger::builder().is_test(true).try_init();

        let deep: ShapeRef = Arc::new(DeepShape);
        let mut settings = MutableCompoundShapeSettings::new();
        for i in 0..4 {
            settings.add_shape(Vec3::new(3.0 * i as f32, 0.0, 0.0), Quat::IDENTITY, deep.clone(), 0);
        }
        let fits = MutableCompoundShape::new(&settings).unwrap();
        assert_eq!(fits.sub_shape_id_bits(), 2);
        assert_eq!(fits.sub_shape_id_bits_recursive(), 32);

        settings.add_shape(Vec3::new(12.0, 0.0, 0.0), Quat::IDENTITY, deep, 0);
        assert!(matches!(
            settings.create(),
            Err(ShapeError::SubShapeIdBitsExceeded { required: 33, max: 32 })
        ));
    }

    #[test]
    fn save_and_restore_is_bit_identical() {
        let compound = box_compound(7);
        let mut bytes = Vec::new();
        compound.save_binary_state(&mut bytes).unwrap();

        let shapes = compound.sub_shape_refs();
        let restored = MutableCompoundShape::from_binary_state(&mut bytes.as_slice(), &shapes).unwrap();
        assert_eq!(restored.num_sub_shapes(), 7);
        assert_eq!(restored.center_of_mass().to_array(), compound.center_of_mass().to_array());
        assert_eq!(restored.local_bounds(), compound.local_bounds());
        assert_eq!(restored.inner_radius().to_bits(), compound.inner_radius().to_bits());
        assert_eq!(all_blocks(&restored), all_blocks(&compound));

        let mut resaved = Vec::new();
        restored.save_binary_state(&mut resaved).unwrap();
        assert_eq!(resaved, bytes);

        let ray = RayCast::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(40.0, 4.0, -2.0));
        assert_eq!(cast(&restored, &ray), cast(&compound, &ray));
    }

    #[test]
    fn restore_requires_matching_shapes() {
        let compound = box_compound(7);
        let mut bytes = Vec::new();
        compound.save_binary_state(&mut bytes).unwrap();
        let shapes = compound.sub_shape_refs();

        assert!(matches!(
            MutableCompoundShape::from_binary_state(&mut bytes.as_slice(), &shapes[..6]),
            Err(ShapeError::SubShapeCountMismatch { expected: 7, provided: 6 })
        ));
        assert!(matches!(
            MutableCompoundShape::from_binary_state(&mut &bytes[..bytes.len() - 1], &shapes),
            Err(ShapeError::Io(_))
        ));
    }

    #[test]
    fn intersecting_sub_shapes_truncate_at_buffer_length() {
        let compound = five_spheres();
        let query = BoundingBox::new(Vec3::new(0.5, -0.5, -0.5), Vec3::new(6.5, 0.5, 0.5));

        let mut indices = [u32::MAX; 8];
        let count = compound.intersecting_sub_shapes(&query, &mut indices);
        assert_eq!(&indices[..count], &[0, 1, 2, 3]);

        let mut small = [u32::MAX; 2];
        assert_eq!(compound.intersecting_sub_shapes(&query, &mut small), 2);
        assert_eq!(small, [0, 1]);

        assert_eq!(compound.intersecting_sub_shapes(&query, &mut []), 0);
    }

    #[test]
    fn intersecting_sub_shapes_with_oriented_box() {
        let compound = five_spheres();
        let tilted = OrientedBox::new(
            RigidPose::new(Vec3::new(10.0, 0.0, 0.0), Quat::from_rotation_z(std::f32::consts::FRAC_PI_4)),
            Vec3::new(0.5, 0.5, 0.5),
        );
        let mut indices = [0u32; 5];
        let count = compound.intersecting_sub_shapes_oriented(&tilted, &mut indices);
        assert_eq!(&indices[..count], &[4]);

        let far = OrientedBox::new(RigidPose::from_position(Vec3::new(0.0, 10.0, 0.0)), Vec3::ONE);
        assert_eq!(compound.intersecting_sub_shapes_oriented(&far, &mut indices), 0);
    }

    #[test]
    fn small_compounds_use_child_bounds_in_world_space() {
        let mut compound = MutableCompoundShape::empty();
        compound.add_shape(Vec3::new(-2.0, 0.0, 0.0), Quat::IDENTITY, sphere(1.0), 0);
        compound.add_shape(Vec3::new(2.0, 0.0, 0.0), Quat::IDENTITY, sphere(1.0), 0);

        let pose = RigidPose::new(Vec3::ZERO, Quat::from_rotation_z(std::f32::consts::FRAC_PI_4));
        let world = compound.world_space_bounds(&pose);
        let loose = compound.local_bounds().transformed(&pose);
        assert_relative_eq!(world.max.x, 2.0f32.sqrt() + 1.0, epsilon = 1e-5);
        assert!(world.max.x < loose.max.x);

        for i in 0..9 {
            compound.add_shape(Vec3::new(0.0, i as f32, 0.0), Quat::IDENTITY, sphere(0.5), 0);
        }
        assert!(compound.num_sub_shapes() > MutableCompoundShape::WORLD_BOUNDS_CHILD_THRESHOLD);
        assert_eq!(compound.world_space_bounds(&pose), compound.local_bounds().transformed(&pose));
    }

    #[test]
    fn mass_properties_combine_children() {
        let mut compound = MutableCompoundShape::empty();
        compound.add_shape(Vec3::new(-2.0, 0.0, 0.0), Quat::IDENTITY, sphere(1.0), 0);
        compound.add_shape(Vec3::new(2.0, 0.0, 0.0), Quat::IDENTITY, sphere(1.0), 0);

        let child = SphereShape::new(1.0).mass_properties();
        let properties = compound.mass_properties();
        assert_relative_eq!(properties.mass, 2.0 * child.mass, max_relative = 1e-6);
        assert_relative_eq!(properties.inertia.x_axis.x, 0.8 * child.mass, max_relative = 1e-5);
        assert_relative_eq!(properties.inertia.y_axis.y, 8.8 * child.mass, max_relative = 1e-5);
        assert_relative_eq!(properties.inertia.z_axis.z, 8.8 * child.mass, max_relative = 1e-5);
    }

    fn nested_compound() -> (ShapeRef, MutableCompoundShape) {
        let mut inner = MutableCompoundShape::empty();
        inner.add_shape(Vec3::new(-1.0, 0.0, 0.0), Quat::IDENTITY, sphere(0.5), 0);
        inner.add_shape(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, sphere(0.5), 1);
        let inner: ShapeRef = Arc::new(inner);

        let mut outer = MutableCompoundShape::empty();
        outer.add_shape(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY, inner.clone(), 0);
        outer.add_shape(Vec3::new(-10.0, 0.0, 0.0), Quat::IDENTITY, sphere(1.0), 1);
        (inner, outer)
    }

    #[test]
    fn nested_ray_hits_carry_both_indices() {
        let (inner, outer) = nested_compound();
        assert_eq!(outer.sub_shape_id_bits_recursive(), 2);

        let ray = RayCast::new(Vec3::new(20.0, 0.0, 0.0), Vec3::new(-40.0, 0.0, 0.0));
        let hit = cast(&outer, &ray).unwrap();
        assert_relative_eq!(hit.fraction, (20.0 - 11.5) / 40.0, epsilon = 1e-6);

        let (outer_index, remainder) = outer.sub_shape_index_from_id(hit.sub_shape_id);
        assert_eq!(outer_index, 0);
        let inner = inner.as_mutable_compound().unwrap();
        let (inner_index, remainder) = inner.sub_shape_index_from_id(remainder);
        assert_eq!(inner_index, 1);
        assert!(remainder.is_empty());
        assert_eq!(inner.sub_shape_user_data(hit.sub_shape_id.pop_id(1).1).unwrap(), 1);
    }

    #[test]
    fn transformed_shapes_are_collected_through_nesting() {
        let (inner, outer) = nested_compound();
        let outer: ShapeRef = Arc::new(outer);
        let query = BoundingBox::from_center_and_extent(Vec3::new(11.0, 5.0, 0.0), Vec3::splat(0.5));

        let mut collector = AllHitCollector::new();
        outer.collect_transformed_shapes(
            &outer,
            &query,
            Vec3::new(0.0, 5.0, 0.0),
            Quat::IDENTITY,
            &SubShapeIdCreator::default(),
            &mut collector,
        );
        assert_eq!(collector.hits.len(), 1);

        let found = &collector.hits[0];
        assert!(found.position_com.abs_diff_eq(Vec3::new(11.0, 5.0, 0.0), 1e-6));
        assert_eq!(found.rotation, Quat::IDENTITY);
        assert_eq!(found.shape.inner_radius(), 0.5);
        assert_eq!(found.sub_shape_id_creator.num_bits_written(), 2);
        assert!(found.world_space_bounds().contains_point(Vec3::new(11.0, 5.0, 0.0)));

        let outer = outer.as_mutable_compound().unwrap();
        let (outer_index, remainder) = outer.sub_shape_index_from_id(found.sub_shape_id_creator.id());
        assert_eq!(outer_index, 0);
        assert_eq!(inner.as_mutable_compound().unwrap().sub_shape_index_from_id(remainder).0, 1);
    }

    fn three_spheres() -> MutableCompoundShape {
        let mut compound = MutableCompoundShape::empty();
        for x in [0.0, 3.0, 6.0] {
            compound.add_shape(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, sphere(1.0), 0);
        }
        compound
    }

    #[test]
    fn compound_collides_with_shape_in_either_order() {
        let compound = three_spheres();
        let ball = SphereShape::new(1.0);
        let leaf_collider = SphereLeafCollider;
        let dispatch = CollisionDispatch::new(&leaf_collider);
        let ball_pose = RigidPose::from_position(Vec3::new(3.0, 1.5, 0.0));
        let id = SubShapeIdCreator::default();

        let mut first = AllHitCollector::new();
        dispatch.collide_shape_vs_shape(
            &compound,
            &ball,
            &RigidPose::IDENTITY,
            &ball_pose,
            &id,
            &id,
            &CollideShapeSettings::default(),
            &mut first,
        );
        assert_eq!(first.hits.len(), 1);
        assert_eq!(compound.sub_shape_index_from_id(first.hits[0].sub_shape_id1).0, 1);
        assert_relative_eq!(first.hits[0].penetration_depth, 0.5, epsilon = 1e-6);

        let mut second = AllHitCollector::new();
        dispatch.collide_shape_vs_shape(
            &ball,
            &compound,
            &ball_pose,
            &RigidPose::IDENTITY,
            &id,
            &id,
            &CollideShapeSettings::default(),
            &mut second,
        );
        assert_eq!(second.hits.len(), 1);
        assert_eq!(compound.sub_shape_index_from_id(second.hits[0].sub_shape_id2).0, 1);
        assert!(second.hits[0].sub_shape_id1.is_empty());
    }

    #[test]
    fn separation_distance_widens_the_overlap_test() {
        let compound = three_spheres();
        let ball = SphereShape::new(1.0);
        let leaf_collider = SphereLeafCollider;
        let dispatch = CollisionDispatch::new(&leaf_collider);
        let ball_pose = RigidPose::from_position(Vec3::new(3.0, 2.5, 0.0));
        let id = SubShapeIdCreator::default();

        let mut touching = AllHitCollector::new();
        dispatch.collide_shape_vs_shape(
            &compound,
            &ball,
            &RigidPose::IDENTITY,
            &ball_pose,
            &id,
            &id,
            &CollideShapeSettings::default(),
            &mut touching,
        );
        assert!(!touching.had_hit());

        let mut near = AllHitCollector::new();
        let settings = CollideShapeSettings {
            max_separation_distance: 1.0,
        };
        dispatch.collide_shape_vs_shape(&compound, &ball, &RigidPose::IDENTITY, &ball_pose, &id, &id, &settings, &mut near);
        assert_eq!(near.hits.len(), 1);
    }

    #[test]
    fn shape_cast_into_compound_finds_first_child() {
        let compound = three_spheres();
        let ball = SphereShape::new(1.0);
        let leaf_collider = SphereLeafCollider;
        let dispatch = CollisionDispatch::new(&leaf_collider);
        let id = SubShapeIdCreator::default();

        let shape_cast = ShapeCast::new(&ball, RigidPose::from_position(Vec3::new(-10.0, 0.0, 0.0)), Vec3::new(20.0, 0.0, 0.0));
        let mut collector = ClosestHitCollector::new();
        dispatch.cast_shape_vs_shape(
            &shape_cast,
            &ShapeCastSettings::default(),
            &compound,
            &RigidPose::IDENTITY,
            &id,
            &id,
            &mut collector,
        );
        let hit = collector.hit.unwrap();
        assert_relative_eq!(hit.fraction, 0.4, epsilon = 1e-6);
        assert_eq!(compound.sub_shape_index_from_id(hit.sub_shape_id2).0, 0);
    }

    #[test]
    fn compound_cast_sweeps_every_child() {
        let compound = three_spheres();
        let target = SphereShape::new(1.0);
        let leaf_collider = SphereLeafCollider;
        let dispatch = CollisionDispatch::new(&leaf_collider);
        let id = SubShapeIdCreator::default();

        let shape_cast = ShapeCast::new(
            &compound,
            RigidPose::from_position(Vec3::new(-20.0, 0.0, 0.0)),
            Vec3::new(20.0, 0.0, 0.0),
        );
        let mut collector = ClosestHitCollector::new();
        dispatch.cast_shape_vs_shape(
            &shape_cast,
            &ShapeCastSettings::default(),
            &target,
            &RigidPose::IDENTITY,
            &id,
            &id,
            &mut collector,
        );
        let hit = collector.hit.unwrap();
        assert_relative_eq!(hit.fraction, 0.6, epsilon = 1e-6);
        assert_eq!(compound.sub_shape_index_from_id(hit.sub_shape_id1).0, 2);
    }

    #[test]
    fn concurrent_queries_agree() {
        let compound = box_compound(9);
        let ray = RayCast::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(40.0, 4.0, -2.0));
        let expected = cast(&compound, &ray);

        crossbeam_utils::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|_| {
                    for _ in 0..64 {
                        assert_eq!(cast(&compound, &ray), expected);
                    }
                });
            }
        })
        .unwrap();
    }

    /// Sphere that counts how often it is queried.
    #[derive(Debug)]
    struct CountingSphere {
        sphere: SphereShape,
        queries: Arc<AtomicUsize>,
    }

    impl Shape for CountingSphere {
        fn local_bounds(&self) -> BoundingBox {
            self.sphere.local_bounds()
        }

        fn inner_radius(&self) -> f32 {
            self.sphere.inner_radius()
        }

        fn mass_properties(&self) -> MassProperties {
            self.sphere.mass_properties()
        }

        fn cast_ray(&self, ray: &RayCast, id_creator: &SubShapeIdCreator, hit: &mut RayCastResult) -> bool {
            self.queries.fetch_add(1, Ordering::Relaxed);
            self.sphere.cast_ray(ray, id_creator, hit)
        }

        fn cast_ray_collect(
            &self,
            ray: &RayCast,
            settings: &RayCastSettings,
            id_creator: &SubShapeIdCreator,
            collector: &mut dyn CollisionCollector<RayCastResult>,
        ) {
            self.queries.fetch_add(1, Ordering::Relaxed);
            self.sphere.cast_ray_collect(ray, settings, id_creator, collector);
        }

        fn collide_point(
            &self,
            point: Vec3,
            id_creator: &SubShapeIdCreator,
            collector: &mut dyn CollisionCollector<CollidePointResult>,
        ) {
            self.queries.fetch_add(1, Ordering::Relaxed);
            self.sphere.collide_point(point, id_creator, collector);
        }
    }

    fn counting_spheres(xs: &[f32], queries: &Arc<AtomicUsize>) -> MutableCompoundShape {
        let mut compound = MutableCompoundShape::empty();
        for &x in xs {
            let shape: ShapeRef = Arc::new(CountingSphere {
                sphere: SphereShape::new(1.0),
                queries: queries.clone(),
            });
            compound.add_shape(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, shape, 0);
        }
        compound
    }

    #[test]
    fn closest_hit_collector_skips_children_behind_first_hit() {
        let queries = Arc::new(AtomicUsize::new(0));
        let compound = counting_spheres(&[0.0, 2.0, 4.0, 6.0, 10.0], &queries);

        // All of the first block passes the block test; once the first child is hit the rest are behind it.
        let ray = RayCast::new(Vec3::new(-20.0, 0.0, 0.0), Vec3::new(40.0, 0.0, 0.0));
        let mut collector = ClosestHitCollector::new();
        compound.cast_ray_collect(&ray, &RayCastSettings::default(), &SubShapeIdCreator::default(), &mut collector);

        let hit = collector.hit.unwrap();
        assert_relative_eq!(hit.fraction, 19.0 / 40.0, epsilon = 1e-6);
        assert_eq!(compound.sub_shape_index_from_id(hit.sub_shape_id).0, 0);
        assert_eq!(queries.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn any_hit_collector_stops_point_query_after_first_hit() {
        let queries = Arc::new(AtomicUsize::new(0));
        let compound = counting_spheres(&[0.0, 0.1, 0.2, 0.3, 0.4], &queries);

        let mut collector = AnyHitCollector::new();
        compound.collide_point(Vec3::new(0.2, 0.0, 0.0), &SubShapeIdCreator::default(), &mut collector);

        let hit = collector.hit.unwrap();
        assert_eq!(compound.sub_shape_index_from_id(hit.sub_shape_id).0, 0);
        assert_eq!(queries.load(Ordering::Relaxed), 1);

        let mut all = AllHitCollector::new();
        compound.collide_point(Vec3::new(0.2, 0.0, 0.0), &SubShapeIdCreator::default(), &mut all);
        assert_eq!(all.hits.len(), 5);
    }

    #[test]
    fn failed_restore_leaves_compound_untouched() {
        let saved = box_compound(7);
        let mut bytes = Vec::new();
        saved.save_binary_state(&mut bytes).unwrap();
        let shapes = saved.sub_shape_refs();

        let mut compound = five_spheres();
        let before = compound.clone();
        for cut in [8, 6 * 16] {
            let truncated = &bytes[..bytes.len() - cut];
            assert!(matches!(
                compound.restore_binary_state(&mut &truncated[..], &shapes),
                Err(ShapeError::Io(_))
            ));
            assert_eq!(compound.num_sub_shapes(), before.num_sub_shapes());
            assert_eq!(compound.center_of_mass(), before.center_of_mass());
            assert_eq!(compound.local_bounds(), before.local_bounds());
            assert_eq!(compound.inner_radius(), before.inner_radius());
            assert_eq!(all_blocks(&compound), all_blocks(&before));
        }

        compound.restore_binary_state(&mut bytes.as_slice(), &shapes).unwrap();
        assert_eq!(all_blocks(&compound), all_blocks(&saved));
    }

    #[test]
    fn zero_stride_broadcasts_one_transform() {
        let position = Vec3::new(1.0, -2.0, 0.5);
        let rotation = Quat::from_rotation_x(0.4);

        let mut bulk = box_compound(6);
        let mut single = bulk.clone();
        bulk.modify_shapes(
            1,
            4,
            StridedSlice::new(bytemuck::bytes_of(&position), 0),
            StridedSlice::new(bytemuck::bytes_of(&rotation), 0),
        )
        .unwrap();
        for index in 1..5 {
            single.modify_shape(index, position, rotation).unwrap();
        }

        assert_eq!(bulk.local_bounds(), single.local_bounds());
        assert_eq!(all_blocks(&bulk), all_blocks(&single));

        assert!(matches!(
            bulk.modify_shapes(0, 1, StridedSlice::new(&[], 0), StridedSlice::new(bytemuck::bytes_of(&rotation), 0)),
            Err(ShapeError::StridedBufferTooShort { required: 1, available: 0 })
        ));
    }

    proptest! {
        #[test]
        fn local_bounds_are_the_union_of_children(
            children in prop::collection::vec(
                (-50.0f32..50.0, -50.0f32..50.0, -50.0f32..50.0, 0.1f32..5.0, -3.0f32..3.0),
                1..20,
            ),
            removals in prop::collection::vec(0usize..20, 0..5),
        ) {
            let mut compound = MutableCompoundShape::empty();
            for (x, y, z, size, angle) in children {
                compound.add_shape(
                    Vec3::new(x, y, z),
                    Quat::from_rotation_y(angle),
                    cuboid(Vec3::new(size, 0.5 * size, 2.0 * size)),
                    0,
                );
            }
            prop_assert_eq!(compound.local_bounds(), brute_force_union(&compound));

            for removal in removals {
                if compound.num_sub_shapes() > 1 {
                    compound.remove_shape(removal % compound.num_sub_shapes()).unwrap();
                    prop_assert_eq!(compound.local_bounds(), brute_force_union(&compound));
                }
            }
        }
    }
}
