//! File-system layer: path values, enumeration, metadata and the
//! primitive operations the engine is built on.

pub mod metadata;
pub mod ops;
pub mod path;
pub mod volume;
pub mod walker;
