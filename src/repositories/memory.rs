//! In-process storage used by the `memory` backend and the test suites.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{AppError, Result},
    models::{
        card::{CardRow, CardStatus, ChunkRow},
        session::SessionRow,
        user::{metadata_to_text, UserMetadata, UserRecord, UserRow},
    },
    repositories::{card::CardRepository, session::SessionRepository, user::UserRepository},
};

#[derive(Clone, Default)]
pub struct MemorySessionRepository {
    rows: Arc<RwLock<HashMap<String, SessionRow>>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn insert(&self, row: &SessionRow) -> Result<()> {
        let mut rows = self.rows.write().await;

        if rows.contains_key(&row.session_id)
            || rows.values().any(|r| r.public_id == row.public_id)
        {
            return Err(AppError::Conflict("Session already exists".to_string()));
        }

        rows.insert(row.session_id.clone(), row.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<SessionRow>> {
        let rows = self.rows.read().await;
        let mut hits = rows
            .values()
            .filter(|r| r.session_id == id || r.public_id == id);

        match (hits.next(), hits.next()) {
            (Some(row), None) => Ok(Some(row.clone())),
            _ => Ok(None),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<u64> {
        Ok(self.rows.write().await.remove(session_id).map_or(0, |_| 1))
    }

    async fn delete_owned(&self, session_id: &str, user_id: Option<&str>) -> Result<u64> {
        let mut rows = self.rows.write().await;

        match rows.get(session_id) {
            Some(row) if row.user_id.as_deref() == user_id => {
                rows.remove(session_id);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn rotate(&self, old_session_id: &str, new_row: &SessionRow) -> Result<()> {
        // One write guard for both steps.
        let mut rows = self.rows.write().await;

        if rows.remove(old_session_id).is_none() {
            return Err(AppError::ResourceExpired(
                "This session was already rotated".to_string(),
            ));
        }

        rows.insert(new_row.session_id.clone(), new_row.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryCardRepository {
    cards: Arc<RwLock<HashMap<String, (CardRow, Vec<ChunkRow>)>>>,
}

impl MemoryCardRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CardRepository for MemoryCardRepository {
    async fn insert(&self, card: &CardRow, chunks: &[ChunkRow]) -> Result<()> {
        let mut cards = self.cards.write().await;

        if cards.contains_key(&card.card_id)
            || cards.values().any(|(c, _)| c.short_code == card.short_code)
        {
            return Err(AppError::Conflict("Card already exists".to_string()));
        }

        let mut chunks = chunks.to_vec();
        chunks.sort_by_key(|c| c.c_idx);
        cards.insert(card.card_id.clone(), (card.clone(), chunks));
        Ok(())
    }

    async fn find(&self, id_or_code: &str) -> Result<Option<(CardRow, Vec<ChunkRow>)>> {
        let cards = self.cards.read().await;
        Ok(cards
            .values()
            .find(|(c, _)| c.card_id == id_or_code || c.short_code == id_or_code)
            .cloned())
    }

    async fn set_status(
        &self,
        card_id: &str,
        status: CardStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut cards = self.cards.write().await;

        match cards.get_mut(card_id) {
            Some((card, _)) => {
                card.status = status;
                card.updated_at = updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryUserRepository {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `nuked_at`, banning the user. There is no HTTP surface for this.
    pub async fn ban(&self, user_id: &str) -> bool {
        match self.users.write().await.get_mut(user_id) {
            Some(user) => {
                user.row.nuked_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }
}

/// Mirrors what survives a trip through `user_metadata`.
fn stored_metadata(metadata: &UserMetadata) -> UserMetadata {
    metadata
        .iter()
        .filter(|(k, v)| !k.trim().is_empty() && !metadata_to_text(v).trim().is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn insert(&self, row: &UserRow, metadata: &UserMetadata) -> Result<()> {
        let mut users = self.users.write().await;

        if users.contains_key(&row.user_id)
            || users.values().any(|u| {
                u.row.display_name == row.display_name || u.row.email_hash == row.email_hash
            })
        {
            return Err(AppError::Conflict("User already exists".to_string()));
        }

        users.insert(
            row.user_id.clone(),
            UserRecord {
                row: row.clone(),
                metadata: stored_metadata(metadata),
            },
        );
        Ok(())
    }

    async fn find(&self, identifier: &str, email_hash: &str) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        let mut hits = users.values().filter(|u| {
            u.row.user_id == identifier
                || u.row.display_name == identifier
                || u.row.email_hash == email_hash
        });

        match (hits.next(), hits.next()) {
            (Some(user), None) => Ok(Some(user.clone())),
            _ => Ok(None),
        }
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn exists(&self, display_name: &str, email_hash: &str) -> Result<bool> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .any(|u| u.row.display_name == display_name || u.row.email_hash == email_hash))
    }

    async fn save_metadata(
        &self,
        user_id: &str,
        metadata: &UserMetadata,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(user_id).ok_or(AppError::NotFound)?;

        user.metadata = stored_metadata(metadata);
        user.row.updated_at = updated_at;
        Ok(())
    }
}
