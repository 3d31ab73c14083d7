#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use zeroize::Zeroizing;

use code_letters::{
    build_router,
    config::StoreBackend,
    crypto::envelope::EnvelopeScheme,
    repositories::memory::{MemoryCardRepository, MemorySessionRepository, MemoryUserRepository},
    state::Repositories,
    AppState, Config,
};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub sessions: MemorySessionRepository,
    pub cards: MemoryCardRepository,
    pub users: MemoryUserRepository,
}

pub fn test_config() -> Config {
    Config {
        database_url: None,
        store_backend: StoreBackend::Memory,
        app_env: "test".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        session_ttl: "15m".to_string(),
        card_chunk_size: 1024,
        compression_threshold: 384,
        envelope_scheme: EnvelopeScheme::Aes256Cbc,
        enc_key: Zeroizing::new((0u8..48).collect()),
        sign_key: Zeroizing::new(b"integration-sign-key".to_vec()),
        token_key: Zeroizing::new((64u8..96).collect()),
    }
}

pub fn spawn_app() -> TestApp {
    let sessions = MemorySessionRepository::new();
    let cards = MemoryCardRepository::new();
    let users = MemoryUserRepository::new();

    let repos = Repositories {
        sessions: Arc::new(sessions.clone()),
        cards: Arc::new(cards.clone()),
        users: Arc::new(users.clone()),
    };

    let state = AppState::with_repositories(&test_config(), repos).unwrap();

    TestApp {
        router: build_router(state.clone()),
        state,
        sessions,
        cards,
        users,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(value) = cookie {
            builder = builder.header(header::COOKIE, format!("_CSID={}", value));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::get(uri);
        if let Some(value) = cookie {
            builder = builder.header(header::COOKIE, format!("_CSID={}", value));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Opens a sealed response body.
    pub async fn open_body(&self, response: Response<Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        self.state.transport.open(&bytes).await.unwrap()
    }

    /// Signs a fresh user up and returns its cookie and user id.
    pub async fn sign_up(&self, name: &str) -> (String, String) {
        let response = self
            .post_json(
                "/api/v1/auth/signup",
                serde_json::json!({
                    "displayName": name,
                    "emailAddress": format!("{}@example.com", name),
                    "password": "correct-horse",
                }),
                None,
            )
            .await;
        assert_eq!(response.status(), 201);

        let cookie = session_cookie(&response).unwrap();
        let user = self.open_body(response).await;
        (cookie, user["userId"].as_str().unwrap().to_string())
    }
}

/// The `_CSID` value set by a response, if any.
pub fn session_cookie<B>(response: &Response<B>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("_CSID="))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
