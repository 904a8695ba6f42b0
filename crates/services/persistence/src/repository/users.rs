//! User repository built on the generic cache-through [`Repository`].

use async_trait::async_trait;
use validator::Validate;

use common::{AppError, AppResult, NotFoundExt};
use domain::{CreateUser, DocumentId, Entity, UpdateUser, User, UserRole};

use super::Repository;
use crate::pagination::{Page, PageArgs};
use crate::store::Filter;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

const FIELD_EMAIL: &str = "email";
const FIELD_ROLE: &str = "role";

/// User repository trait for dependency injection.
///
/// By default, all query methods exclude soft-deleted records.
/// Use `*_with_deleted` variants to include them.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find active user by ID (excludes soft-deleted)
    async fn find_by_id(&self, id: DocumentId) -> AppResult<Option<User>>;

    /// Find user by ID including soft-deleted
    async fn find_by_id_with_deleted(&self, id: DocumentId) -> AppResult<Option<User>>;

    /// Find active user by email address (case-insensitive)
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Validate and create a new user
    async fn create(&self, input: CreateUser) -> AppResult<User>;

    /// Update name and/or role of an active user
    async fn update(&self, id: DocumentId, changes: UpdateUser) -> AppResult<User>;

    /// Soft delete user by ID; `false` if already deleted or unknown
    async fn delete(&self, id: DocumentId) -> AppResult<bool>;

    /// Page through active users, optionally restricted to one role
    async fn list(&self, role: Option<UserRole>, page: PageArgs) -> AppResult<Page<User>>;
}

/// Concrete implementation of UserRepository
#[derive(Clone)]
pub struct UserStore {
    users: Repository<User>,
}

impl UserStore {
    pub fn new(users: Repository<User>) -> Self {
        Self { users }
    }

    fn email_filter(email: &str) -> Filter {
        Filter::new().eq(FIELD_EMAIL, email.trim().to_lowercase())
    }

    /// Clear the cached email lookup of a user whose row just changed.
    async fn forget_email(&self, user: &User) {
        self.users.invalidate_lookup(Self::email_filter(&user.email)).await;
    }
}

#[async_trait]
impl UserRepository for UserStore {
    async fn find_by_id(&self, id: DocumentId) -> AppResult<Option<User>> {
        self.users.get_by_id(id).await.optional()
    }

    async fn find_by_id_with_deleted(&self, id: DocumentId) -> AppResult<Option<User>> {
        self.users.get_by_id_with_deleted(id).await.optional()
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.users.find_one(Self::email_filter(email)).await.optional()
    }

    async fn create(&self, input: CreateUser) -> AppResult<User> {
        input.validate()?;

        if self.find_by_email(&input.email).await?.is_some() {
            return Err(AppError::validation("email is already registered"));
        }

        let user = self.users.insert(User::from(input)).await?;
        tracing::info!(user_id = %user.id(), "User created");
        Ok(user)
    }

    async fn update(&self, id: DocumentId, changes: UpdateUser) -> AppResult<User> {
        let mut user = self.users.get_by_id(id).await?;
        changes.apply(&mut user);

        let user = self.users.replace(user).await?;
        self.forget_email(&user).await;
        Ok(user)
    }

    async fn delete(&self, id: DocumentId) -> AppResult<bool> {
        let Some(user) = self.find_by_id(id).await? else {
            return Ok(false);
        };

        let deleted = self.users.soft_delete(id).await?;
        self.forget_email(&user).await;
        if deleted {
            tracing::info!(user_id = %id, "User deleted");
        }
        Ok(deleted)
    }

    async fn list(&self, role: Option<UserRole>, page: PageArgs) -> AppResult<Page<User>> {
        let filter = match role {
            Some(role) => Filter::new().eq(FIELD_ROLE, role.as_str()),
            None => Filter::new(),
        };
        self.users.list(filter, &page).await
    }
}
