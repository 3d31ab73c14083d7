use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// Default size of one stored card chunk in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Publication state of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardStatus {
    Draft,
    Published,
    Banned,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Draft => "DRAFT",
            CardStatus::Published => "PUBLISHED",
            CardStatus::Banned => "BANNED",
        }
    }
}

impl std::str::FromStr for CardStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(CardStatus::Draft),
            "PUBLISHED" => Ok(CardStatus::Published),
            "BANNED" => Ok(CardStatus::Banned),
            other => Err(AppError::InvalidArgument(format!("Unknown card status '{}'", other))),
        }
    }
}

/// A `cards` row.
#[derive(Debug, Clone, PartialEq)]
pub struct CardRow {
    pub card_id: String,
    pub short_code: String,
    pub owner_id: String,
    pub card_name: Option<String>,
    pub status: CardStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A `card_chunks` row. `c_hash` is the base64 MAC of the plaintext chunk,
/// `c_data` the base64 envelope ciphertext.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRow {
    pub card_id: String,
    pub c_idx: i32,
    pub c_hash: String,
    pub c_data: String,
}

/// A card with its verified, reassembled properties.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub card_id: String,
    pub short_code: String,
    pub name: Option<String>,
    pub owner_id: String,
    pub status: CardStatus,
    pub card_props: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn from_row(row: CardRow, card_props: Value) -> Self {
        Self {
            card_id: row.card_id,
            short_code: row.short_code,
            name: row.card_name,
            owner_id: row.owner_id,
            status: row.status,
            card_props,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
