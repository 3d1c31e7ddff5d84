pub mod collision_collector;
pub mod shape_queries;
pub mod collision_dispatch;
