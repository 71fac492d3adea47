pub mod downselect;
pub mod engine;
pub mod expr;
pub mod filter;
pub mod manifest;
pub mod naming;
pub mod space;

pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
