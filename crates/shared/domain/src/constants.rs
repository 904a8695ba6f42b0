//! Domain-level constants.
//!
//! Persisted field names, webhook verbs and business rules shared by every
//! entity collection.

// =============================================================================
// Persisted Document Fields
// =============================================================================

/// Primary key field of every stored document
pub const FIELD_ID: &str = "_id";

/// Creation timestamp, set once at insert
pub const FIELD_CREATED_AT: &str = "createdAt";

/// Refreshed on every replace
pub const FIELD_UPDATED_AT: &str = "updatedAt";

/// Soft-delete tombstone (presence means deleted)
pub const FIELD_DELETED_AT: &str = "deletedAt";

// =============================================================================
// Webhook Event Verbs
// =============================================================================

pub const VERB_CREATED: &str = "created";

pub const VERB_UPDATED: &str = "updated";

pub const VERB_DELETED: &str = "deleted";

// =============================================================================
// User Roles
// =============================================================================

/// Default role assigned to new users
pub const ROLE_USER: &str = "user";

/// Administrator role with elevated privileges
pub const ROLE_ADMIN: &str = "admin";

/// Service provider offering services on the marketplace
pub const ROLE_PROVIDER: &str = "provider";

/// All valid role values
pub const VALID_ROLES: &[&str] = &[ROLE_USER, ROLE_ADMIN, ROLE_PROVIDER];

/// Check if a role value is valid
pub fn is_valid_role(role: &str) -> bool {
    VALID_ROLES.contains(&role)
}

// =============================================================================
// Validation
// =============================================================================

/// Maximum coupon discount
pub const MAX_DISCOUNT_PERCENT: u8 = 100;
