use std::sync::Arc;

use crate::{
    codec::packet::ZOptions,
    config::{Config, StoreBackend},
    crypto::keyring::Keyring,
    error::{AppError, Result},
    repositories::{
        card::CardRepository,
        memory::{MemoryCardRepository, MemorySessionRepository, MemoryUserRepository},
        postgres::{PgCardRepository, PgSessionRepository, PgUserRepository},
        session::SessionRepository,
        user::UserRepository,
    },
    services::{cards::CardStore, sessions::SessionStore},
    transport::Transport,
};

/// The storage seams the services are built on.
#[derive(Clone)]
pub struct Repositories {
    pub sessions: Arc<dyn SessionRepository>,
    pub cards: Arc<dyn CardRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Repositories {
    pub fn memory() -> Self {
        Self {
            sessions: Arc::new(MemorySessionRepository::new()),
            cards: Arc::new(MemoryCardRepository::new()),
            users: Arc::new(MemoryUserRepository::new()),
        }
    }

    pub fn postgres(pool: deadpool_postgres::Pool) -> Self {
        Self {
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            cards: Arc::new(PgCardRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool)),
        }
    }
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    pub keys: Arc<Keyring>,
    pub sessions: SessionStore,
    pub cards: CardStore,
    pub users: Arc<dyn UserRepository>,
    /// Seals request and response bodies.
    pub transport: Transport,
}

impl AppState {
    /// Creates a new `AppState`, opening the configured backend.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let repos = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    AppError::InvalidArgument("DATABASE_URL must be set".to_string())
                })?;
                let pool = crate::db::create_pool(url)?;
                tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");
                Repositories::postgres(pool)
            }
            StoreBackend::Memory => {
                tracing::warn!("⚠️  Using the in-memory store, nothing survives a restart");
                Repositories::memory()
            }
        };

        Self::with_repositories(config, repos)
    }

    /// Builds the state over explicit repositories.
    pub fn with_repositories(config: &Config, repos: Repositories) -> Result<Self> {
        let keys = Arc::new(Keyring::new(
            &config.enc_key,
            &config.sign_key,
            &config.token_key,
            config.envelope_scheme,
        )?);
        tracing::info!("✅ Keyring derived ({:?} envelope)", config.envelope_scheme);

        let packets = ZOptions::with_threshold(config.compression_threshold);

        Ok(AppState {
            config: Arc::new(config.clone()),
            sessions: SessionStore::new(repos.sessions, keys.clone(), packets.clone()),
            cards: CardStore::new(repos.cards, keys.clone(), config.card_chunk_size),
            users: repos.users,
            transport: Transport::new(keys.transport.clone(), keys.tokens.clone(), packets),
            keys,
        })
    }
}
