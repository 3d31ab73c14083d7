use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    middleware_layer::session::AuthContext,
    models::card::CardStatus,
    state::AppState,
    transport::Sealed,
    validation::auth::{validate_request, CreateCardRequest},
};

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response> {
    let body = sonic_rs::to_string(value)
        .map_err(|e| AppError::Internal(format!("Response serialization failed: {}", e)))?;

    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Creates a draft card owned by the caller.
#[axum::debug_handler(state = AppState)]
pub async fn create_card(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Sealed(req): Sealed<CreateCardRequest>,
) -> Result<Response> {
    validate_request(&req)?;

    let card = state
        .cards
        .create(auth.user_id()?, req.name, req.card_props)
        .await?;

    json_response(StatusCode::CREATED, &card)
}

/// Fetches a card by short code or id. Banned cards do not exist to callers.
#[axum::debug_handler]
pub async fn get_card(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response> {
    let card = state
        .cards
        .find(&code)
        .await?
        .filter(|c| c.status != CardStatus::Banned)
        .ok_or(AppError::NotFound)?;

    json_response(StatusCode::OK, &card)
}

/// Publishes one of the caller's cards.
#[axum::debug_handler]
pub async fn publish_card(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(card_id): Path<String>,
) -> Result<Response> {
    let card = state.cards.publish(&card_id, auth.user_id()?).await?;
    json_response(StatusCode::OK, &card)
}
