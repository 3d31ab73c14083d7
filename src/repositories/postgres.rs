use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Client, Pool};
use tokio_postgres::{error::SqlState, Row};

use crate::{
    error::{AppError, Result},
    models::{
        card::{CardRow, CardStatus, ChunkRow},
        session::SessionRow,
        user::{metadata_from_text, metadata_to_text, UserMetadata, UserRecord, UserRow},
    },
    repositories::{card::CardRepository, session::SessionRepository, user::UserRepository},
};

/// A helper function to map a `tokio_postgres::Row` to a `SessionRow`.
fn row_to_session(row: &Row) -> Result<SessionRow> {
    Ok(SessionRow {
        session_id: row.try_get("session_id")?,
        public_id: row.try_get("public_id")?,
        user_id: row.try_get("user_id")?,
        payload: row.try_get("payload")?,
        kind: row.try_get("kind")?,
        tdi: row.try_get("tdi")?,
        headers: row.try_get("headers")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        signature: row.try_get("signature")?,
    })
}

fn row_to_card(row: &Row) -> Result<CardRow> {
    let status: String = row.try_get("status")?;

    Ok(CardRow {
        card_id: row.try_get("card_id")?,
        short_code: row.try_get("short_code")?,
        owner_id: row.try_get("owner_id")?,
        card_name: row.try_get("card_name")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_chunk(row: &Row) -> Result<ChunkRow> {
    Ok(ChunkRow {
        card_id: row.try_get("card_id")?,
        c_idx: row.try_get("c_idx")?,
        c_hash: row.try_get("c_hash")?,
        c_data: row.try_get("c_data")?,
    })
}

fn row_to_user(row: &Row) -> Result<UserRow> {
    Ok(UserRow {
        user_id: row.try_get("user_id")?,
        display_name: row.try_get("display_name")?,
        email_address: row.try_get("email_address")?,
        email_hash: row.try_get("email_hash")?,
        password_digest: row.try_get("password_digest")?,
        salt: row.try_get("salt")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        nuked_at: row.try_get("nuked_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn unique_violation(e: tokio_postgres::Error, what: &str) -> AppError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        AppError::Conflict(format!("{} already exists", what))
    } else {
        AppError::Database(e)
    }
}

const INSERT_SESSION: &str = r#"
    INSERT INTO sessions
        (session_id, public_id, user_id, payload, kind, tdi, headers, created_at, expires_at, signature)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

/// Sessions stored in PostgreSQL.
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: Pool,
}

impl PgSessionRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn insert(&self, row: &SessionRow) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                INSERT_SESSION,
                &[
                    &row.session_id,
                    &row.public_id,
                    &row.user_id,
                    &row.payload,
                    &row.kind,
                    &row.tdi,
                    &row.headers,
                    &row.created_at,
                    &row.expires_at,
                    &row.signature,
                ],
            )
            .await?;
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<SessionRow>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT *
                FROM sessions
                WHERE session_id = $1::TEXT OR public_id = $1::TEXT
                "#,
                &[&id],
            )
            .await?;

        // Ambiguous matches are treated as misses.
        if rows.len() != 1 {
            return Ok(None);
        }

        row_to_session(&rows[0]).map(Some)
    }

    async fn delete(&self, session_id: &str) -> Result<u64> {
        let client = self.pool.get().await?;
        let n = client
            .execute("DELETE FROM sessions WHERE session_id = $1", &[&session_id])
            .await?;
        Ok(n)
    }

    async fn delete_owned(&self, session_id: &str, user_id: Option<&str>) -> Result<u64> {
        let client = self.pool.get().await?;
        let n = client
            .execute(
                "DELETE FROM sessions WHERE session_id = $1 AND user_id IS NOT DISTINCT FROM $2",
                &[&session_id, &user_id],
            )
            .await?;
        Ok(n)
    }

    async fn rotate(&self, old_session_id: &str, new_row: &SessionRow) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let deleted = tx
            .execute(
                "DELETE FROM sessions WHERE session_id = $1",
                &[&old_session_id],
            )
            .await?;

        if deleted != 1 {
            tx.rollback().await?;
            return Err(AppError::ResourceExpired(
                "This session was already rotated".to_string(),
            ));
        }

        tx.execute(
            INSERT_SESSION,
            &[
                &new_row.session_id,
                &new_row.public_id,
                &new_row.user_id,
                &new_row.payload,
                &new_row.kind,
                &new_row.tdi,
                &new_row.headers,
                &new_row.created_at,
                &new_row.expires_at,
                &new_row.signature,
            ],
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Cards stored in PostgreSQL.
#[derive(Clone)]
pub struct PgCardRepository {
    pool: Pool,
}

impl PgCardRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CardRepository for PgCardRepository {
    async fn insert(&self, card: &CardRow, chunks: &[ChunkRow]) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            r#"
            INSERT INTO cards (card_id, short_code, owner_id, card_name, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
            &[
                &card.card_id,
                &card.short_code,
                &card.owner_id,
                &card.card_name,
                &card.status.as_str(),
                &card.created_at,
                &card.updated_at,
            ],
        )
        .await
        .map_err(|e| unique_violation(e, "Card"))?;

        let stmt = tx
            .prepare("INSERT INTO card_chunks (card_id, c_idx, c_hash, c_data) VALUES ($1, $2, $3, $4)")
            .await?;

        for chunk in chunks {
            tx.execute(&stmt, &[&chunk.card_id, &chunk.c_idx, &chunk.c_hash, &chunk.c_data])
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, id_or_code: &str) -> Result<Option<(CardRow, Vec<ChunkRow>)>> {
        let client = self.pool.get().await?;

        let Some(row) = client
            .query_opt(
                "SELECT * FROM cards WHERE card_id = $1::TEXT OR short_code = $1::TEXT LIMIT 1",
                &[&id_or_code],
            )
            .await?
        else {
            return Ok(None);
        };

        let card = row_to_card(&row)?;

        let chunks = client
            .query(
                "SELECT * FROM card_chunks WHERE card_id = $1 ORDER BY c_idx ASC",
                &[&card.card_id],
            )
            .await?
            .iter()
            .map(row_to_chunk)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some((card, chunks)))
    }

    async fn set_status(
        &self,
        card_id: &str,
        status: CardStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let client = self.pool.get().await?;
        let n = client
            .execute(
                "UPDATE cards SET status = $1, updated_at = $2 WHERE card_id = $3",
                &[&status.as_str(), &updated_at, &card_id],
            )
            .await?;
        Ok(n == 1)
    }
}

/// Users stored in PostgreSQL.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool,
}

impl PgUserRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

async fn write_metadata(
    tx: &deadpool_postgres::Transaction<'_>,
    user_id: &str,
    metadata: &UserMetadata,
) -> Result<()> {
    for (key, value) in metadata {
        let text = metadata_to_text(value);
        if key.trim().is_empty() || text.trim().is_empty() {
            continue;
        }

        tx.execute(
            "INSERT INTO user_metadata (user_id, metadata_key, metadata_value) VALUES ($1, $2, $3)",
            &[&user_id, key, &text],
        )
        .await?;
    }

    Ok(())
}

async fn read_metadata(client: &Client, user_id: &str) -> Result<UserMetadata> {
    client
        .query(
            "SELECT metadata_key, metadata_value FROM user_metadata WHERE user_id = $1",
            &[&user_id],
        )
        .await?
        .iter()
        .map(|r| -> Result<(String, serde_json::Value)> {
            let key: String = r.try_get("metadata_key")?;
            let value: String = r.try_get("metadata_value")?;
            Ok((key, metadata_from_text(&value)))
        })
        .collect()
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, row: &UserRow, metadata: &UserMetadata) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            r#"
            INSERT INTO users
                (user_id, display_name, email_address, email_hash, password_digest, salt, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
            &[
                &row.user_id,
                &row.display_name,
                &row.email_address,
                &row.email_hash,
                &row.password_digest,
                &row.salt,
                &row.created_at,
                &row.updated_at,
            ],
        )
        .await
        .map_err(|e| unique_violation(e, "User"))?;

        write_metadata(&tx, &row.user_id, metadata).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, identifier: &str, email_hash: &str) -> Result<Option<UserRecord>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT *
                FROM users
                WHERE user_id = $1::TEXT OR display_name = $1::TEXT OR email_hash = $2::TEXT
                "#,
                &[&identifier, &email_hash],
            )
            .await?;

        if rows.len() != 1 {
            return Ok(None);
        }

        let row = row_to_user(&rows[0])?;
        let metadata = read_metadata(&client, &row.user_id).await?;

        Ok(Some(UserRecord { row, metadata }))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let client = self.pool.get().await?;
        let Some(row) = client
            .query_opt("SELECT * FROM users WHERE user_id = $1", &[&user_id])
            .await?
        else {
            return Ok(None);
        };

        let row = row_to_user(&row)?;
        let metadata = read_metadata(&client, &row.user_id).await?;

        Ok(Some(UserRecord { row, metadata }))
    }

    async fn exists(&self, display_name: &str, email_hash: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM users WHERE display_name = $1 OR email_hash = $2)",
                &[&display_name, &email_hash],
            )
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn save_metadata(
        &self,
        user_id: &str,
        metadata: &UserMetadata,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            "UPDATE users SET updated_at = $1 WHERE user_id = $2",
            &[&updated_at, &user_id],
        )
        .await?;
        tx.execute("DELETE FROM user_metadata WHERE user_id = $1", &[&user_id])
            .await?;
        write_metadata(&tx, user_id, metadata).await?;

        tx.commit().await?;
        Ok(())
    }
}
