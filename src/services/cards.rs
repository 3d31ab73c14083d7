use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use chrono::Utc;
use serde_json::Value;

use crate::{
    crypto::{ids::{generate_id, IdKind}, keyring::Keyring},
    error::{AppError, Result},
    models::card::{Card, CardRow, CardStatus, ChunkRow},
    repositories::card::CardRepository,
};

/// Longest stored card name.
const MAX_NAME_LEN: usize = 128;

/// Stores card properties as independently signed and encrypted chunks.
#[derive(Clone)]
pub struct CardStore {
    repo: Arc<dyn CardRepository>,
    keys: Arc<Keyring>,
    chunk_size: usize,
}

impl CardStore {
    pub fn new(repo: Arc<dyn CardRepository>, keys: Arc<Keyring>, chunk_size: usize) -> Self {
        Self {
            repo,
            keys,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Splits `bytes` into chunk rows. Always yields at least one chunk.
    fn seal_chunks(&self, card_id: &str, bytes: &[u8]) -> Result<Vec<ChunkRow>> {
        let mut pieces: Vec<&[u8]> = bytes.chunks(self.chunk_size).collect();
        if pieces.is_empty() {
            pieces.push(bytes);
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(idx, piece)| {
                let c_idx = i32::try_from(idx)
                    .map_err(|_| AppError::InvalidArgument("Card is too large".to_string()))?;

                Ok(ChunkRow {
                    card_id: card_id.to_string(),
                    c_idx,
                    c_hash: self.keys.signer.sign_base64(piece),
                    c_data: B64.encode(self.keys.envelope.redact(piece)?),
                })
            })
            .collect()
    }

    /// Verifies and concatenates chunks in strict index order.
    ///
    /// # Returns
    ///
    /// The parsed card properties, or `ChunkIntegrity` naming the first
    /// chunk that is missing or fails verification.
    fn open_chunks(&self, chunks: &[ChunkRow]) -> Result<Value> {
        let mut bytes = Vec::new();

        for index in 0..chunks.len() {
            let chunk = chunks
                .iter()
                .find(|c| usize::try_from(c.c_idx).ok() == Some(index))
                .ok_or(AppError::ChunkIntegrity { index })?;

            let plain = B64
                .decode(&chunk.c_data)
                .ok()
                .and_then(|ct| self.keys.envelope.unwrap_redacted(&ct).ok())
                .ok_or(AppError::ChunkIntegrity { index })?;

            let tag = B64
                .decode(&chunk.c_hash)
                .map_err(|_| AppError::ChunkIntegrity { index })?;

            if !self.keys.signer.verify(&plain, &tag) {
                return Err(AppError::ChunkIntegrity { index });
            }

            bytes.extend_from_slice(&plain);
        }

        if bytes.is_empty() {
            return Ok(Value::Object(Default::default()));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::InvalidArgument(format!("Card properties are not valid JSON: {}", e)))
    }

    /// Creates a DRAFT card owned by `owner_id`.
    ///
    /// # Arguments
    ///
    /// * `owner_id` - The user creating the card.
    /// * `name` - Optional display name, trimmed.
    /// * `card_props` - The rendering configuration.
    ///
    /// # Returns
    ///
    /// The stored `Card`. The card row and every chunk are written in one
    /// transaction.
    pub async fn create(&self, owner_id: &str, name: Option<String>, card_props: Value) -> Result<Card> {
        let serialized = serde_json::to_vec(&card_props)
            .map_err(|e| AppError::Internal(format!("Card serialization failed: {}", e)))?;

        let now = Utc::now();
        let row = CardRow {
            card_id: generate_id(IdKind::Long),
            short_code: generate_id(IdKind::Short),
            owner_id: owner_id.to_string(),
            card_name: name
                .map(|n| n.trim().chars().take(MAX_NAME_LEN).collect::<String>())
                .filter(|n| !n.is_empty()),
            status: CardStatus::Draft,
            created_at: now,
            updated_at: now,
        };

        let chunks = self.seal_chunks(&row.card_id, &serialized)?;
        self.repo.insert(&row, &chunks).await?;

        tracing::info!("🃏 Card {} created with {} chunk(s)", row.card_id, chunks.len());

        // Read back through the verifying path.
        let props = self.open_chunks(&chunks)?;
        Ok(Card::from_row(row, props))
    }

    /// Fetches a card by id or short code, verifying every chunk.
    pub async fn find(&self, id_or_code: &str) -> Result<Option<Card>> {
        let Some((row, chunks)) = self.repo.find(id_or_code).await? else {
            return Ok(None);
        };

        let props = self.open_chunks(&chunks).inspect_err(|e| {
            tracing::error!("❌ Card {} failed reconstruction: {}", row.card_id, e);
        })?;

        Ok(Some(Card::from_row(row, props)))
    }

    /// Publishes a card. Only its owner may do so.
    pub async fn publish(&self, card_id: &str, actor_id: &str) -> Result<Card> {
        let (row, _) = self.repo.find(card_id).await?.ok_or(AppError::NotFound)?;

        if row.owner_id != actor_id {
            return Err(AppError::Forbidden("Only the owner can publish this card".to_string()));
        }

        if row.status == CardStatus::Banned {
            return Err(AppError::NotFound);
        }

        if !self
            .repo
            .set_status(&row.card_id, CardStatus::Published, Utc::now())
            .await?
        {
            return Err(AppError::NotFound);
        }

        tracing::info!("📬 Card {} published", row.card_id);

        self.find(&row.card_id).await?.ok_or(AppError::NotFound)
    }
}
