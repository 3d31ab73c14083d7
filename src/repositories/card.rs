use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::card::{CardRow, CardStatus, ChunkRow};

/// Storage for `cards` and `card_chunks`.
#[async_trait]
pub trait CardRepository: Send + Sync {
    /// Writes the card and all of its chunks in one transaction.
    async fn insert(&self, card: &CardRow, chunks: &[ChunkRow]) -> Result<()>;

    /// Fetches a card by card id or short code, chunks ordered by index.
    async fn find(&self, id_or_code: &str) -> Result<Option<(CardRow, Vec<ChunkRow>)>>;

    /// Returns `false` when no such card exists.
    async fn set_status(
        &self,
        card_id: &str,
        status: CardStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;
}
