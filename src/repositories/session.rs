use async_trait::async_trait;

use crate::error::Result;
use crate::models::session::SessionRow;

/// Storage for `sessions` rows.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, row: &SessionRow) -> Result<()>;

    /// Looks a row up by internal id or public id.
    async fn find(&self, id: &str) -> Result<Option<SessionRow>>;

    /// Deletes by internal id, returning the number of rows removed.
    async fn delete(&self, session_id: &str) -> Result<u64>;

    /// Deletes by internal id, only when the row belongs to `user_id`.
    async fn delete_owned(&self, session_id: &str, user_id: Option<&str>) -> Result<u64>;

    /// Atomically replaces `old_session_id` with `new_row`.
    ///
    /// The insert only happens when the delete removed exactly one row; a
    /// lost race fails with `ERR_RESOURCE_EXPIRED` and leaves nothing behind.
    async fn rotate(&self, old_session_id: &str, new_row: &SessionRow) -> Result<()>;
}
