//! Domain model module declarations.

pub mod intervention;
pub mod liveness;
pub mod project;
pub mod signal;
pub mod summary;
