pub mod entity;
pub mod payload;
