//! CLI command implementations.

pub mod common;
pub mod get;
pub mod post;
