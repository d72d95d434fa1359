//! Database record structures matching the store schema.

pub mod files;
