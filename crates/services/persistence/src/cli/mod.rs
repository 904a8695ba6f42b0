//! CLI module - Operator commands for the persistence layer.
//!
//! Provides commands for:
//! - `ping` - Store and cache connectivity check

pub mod args;

pub use args::{Cli, Commands};
