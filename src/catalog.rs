pub mod column;
pub mod ty;
