//! fnplane - function data plane primitives
//!
//! Coalesces concurrent cold starts per function ([`throttler`]), caches live
//! function endpoints ([`cache`]), wires the two together ([`resolver`]) and
//! runs package builds in a shared volume ([`builder`]).

pub mod builder;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod info;
pub mod resolver;
pub mod throttler;
pub mod ui;

pub use error::{ErrorKind, FnplaneError, FnplaneResult};
