//! CLI command implementations.

pub mod analysis;
pub mod config;
pub mod counterexample;
pub mod index;
pub mod serve;
pub mod version;
