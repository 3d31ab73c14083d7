use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::user::{UserMetadata, UserRecord, UserRow};

/// Storage for `users` and `user_metadata`.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts the user and its metadata in one transaction. Fails with
    /// `ERR_CONFLICT` if the display name or email hash is taken.
    async fn insert(&self, row: &UserRow, metadata: &UserMetadata) -> Result<()>;

    /// Finds a user whose id or display name equals `identifier`, or whose
    /// email hash equals `email_hash`.
    async fn find(&self, identifier: &str, email_hash: &str) -> Result<Option<UserRecord>>;

    /// Finds a user by primary key only.
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>>;

    async fn exists(&self, display_name: &str, email_hash: &str) -> Result<bool>;

    /// Replaces the user's metadata and bumps `updated_at`.
    async fn save_metadata(
        &self,
        user_id: &str,
        metadata: &UserMetadata,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;
}
