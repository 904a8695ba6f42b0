//! User domain entity and related types.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::constants::{ROLE_ADMIN, ROLE_PROVIDER, ROLE_USER};
use crate::entity::{Entity, Metadata};

/// User roles enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Provider,
    Admin,
}

impl UserRole {
    /// Check if this role has admin privileges
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// Check if this role can access a required role
    pub fn can_access(&self, required: &UserRole) -> bool {
        match self {
            UserRole::Admin => true,
            UserRole::Provider => matches!(required, UserRole::User | UserRole::Provider),
            UserRole::User => matches!(required, UserRole::User),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => ROLE_ADMIN,
            UserRole::Provider => ROLE_PROVIDER,
            UserRole::User => ROLE_USER,
        }
    }
}

impl From<&str> for UserRole {
    fn from(s: &str) -> Self {
        match s {
            ROLE_ADMIN => UserRole::Admin,
            ROLE_PROVIDER => UserRole::Provider,
            _ => UserRole::User,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User domain entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(flatten)]
    pub meta: Metadata,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl User {
    /// Create a new, not yet persisted user with default role
    pub fn new(email: String, name: String) -> Self {
        Self {
            meta: Metadata::pending(),
            email,
            name,
            role: UserRole::User,
            phone: None,
        }
    }

    /// Check if user has admin role
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Check if user is active (not deleted)
    pub fn is_active(&self) -> bool {
        self.meta.deleted_at.is_none()
    }
}

impl Entity for User {
    const COLLECTION: &'static str = "users";
    const ENTITY_NAME: &'static str = "user";

    fn metadata(&self) -> &Metadata {
        &self.meta
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.meta
    }
}

/// User creation data transfer object
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    /// User email address
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    /// User display name
    #[validate(length(min = 1, message = "must not be empty"))]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl From<CreateUser> for User {
    fn from(dto: CreateUser) -> Self {
        let mut user = User::new(dto.email.to_lowercase(), dto.name);
        user.phone = dto.phone;
        user
    }
}

/// User update data transfer object
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    /// New display name
    pub name: Option<String>,
    /// New role (admin only)
    pub role: Option<UserRole>,
}

impl UpdateUser {
    /// Apply the present fields onto an existing user.
    pub fn apply(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
    }
}
