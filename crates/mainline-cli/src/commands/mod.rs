//! Subcommand implementations.

pub mod delta;
pub mod demo;
