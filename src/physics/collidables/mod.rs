pub mod shape;
pub mod ray;

// Leaf shapes
pub mod sphere;
pub mod box_shape;

// Compound shapes
pub mod compound;
pub mod sub_shape_bounds;
pub mod compound_visitors;
pub mod mutable_compound;
