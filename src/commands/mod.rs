pub mod build;
pub mod segments;
