use axum::{extract::State, http::StatusCode, response::Response, Extension};

use crate::{
    error::Result, middleware_layer::session::AuthContext, services::auth as auth_service,
    state::AppState,
};

/// Returns the signed-in user as a sealed document.
#[axum::debug_handler]
pub async fn current_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response> {
    let user = auth_service::current_user(&state, auth.user_id()?).await?;
    state.transport.respond(StatusCode::OK, &user).await
}
