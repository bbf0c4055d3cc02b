pub mod identity;
pub mod problem;
