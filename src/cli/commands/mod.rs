//! CLI command implementations

pub mod build;
pub mod builder;
pub mod config;
pub mod version;

pub use build::execute as build;
pub use builder::execute as builder;
pub use config::execute as config;
pub use version::execute as version;
