//! CLI command implementations

pub mod entries;
pub mod status;
