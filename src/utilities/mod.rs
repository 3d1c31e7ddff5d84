pub mod bounding_box;
pub mod bounding_box_wide;
pub mod oriented_box;
pub mod memory;
pub mod stream;

pub use self::bounding_box::BoundingBox;
pub use self::oriented_box::OrientedBox;
