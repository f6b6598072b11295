//! CLI command implementations.
//!
//! - [`find`] - Produce one rendition
//! - [`cache`] - Cache statistics and culling

pub mod cache;
pub mod find;
