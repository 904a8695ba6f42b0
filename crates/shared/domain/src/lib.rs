//! Domain layer - Stored entities and value objects.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.
//! It defines the document contract every persisted entity follows and the
//! example entities built on it.

pub mod constants;
pub mod coupon;
pub mod entity;
pub mod error;
pub mod user;

pub use constants::*;
pub use coupon::Coupon;
pub use entity::{DocumentId, Entity, IntoDocumentId, Metadata};
pub use error::{DomainError, DomainResult};
pub use user::{CreateUser, UpdateUser, User, UserRole};
