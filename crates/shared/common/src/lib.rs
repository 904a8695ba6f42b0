//! Common utilities shared across the persistence crates.
//!
//! This crate provides:
//! - The error taxonomy every repository call resolves to
//! - Configuration structures loaded from the environment

pub mod config;
pub mod error;

pub use config::*;
pub use error::{AppError, AppResult, NotFoundExt, OptionExt};
