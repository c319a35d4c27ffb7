pub mod assignment;
pub mod audit;
pub mod lifecycle;
pub mod registry;
