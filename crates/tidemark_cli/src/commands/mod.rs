//! CLI command implementations.

pub mod cursor;
