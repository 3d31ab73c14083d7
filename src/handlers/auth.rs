use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension,
};
use tower_cookies::{Cookie, Cookies};

use crate::{
    error::Result,
    middleware_layer::{
        request::RequestContext,
        session::{session_cookie, AuthContext, SESSION_COOKIE},
    },
    services::auth as auth_service,
    state::AppState,
    transport::Sealed,
    validation::auth::{normalize_email, validate_request, SignInRequest, SignUpRequest},
};

/// Registers a user and signs them in.
#[axum::debug_handler(state = AppState)]
pub async fn signup(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    cookies: Cookies,
    Sealed(mut req): Sealed<SignUpRequest>,
) -> Result<Response> {
    req.email_address = normalize_email(&req.email_address);
    validate_request(&req)?;

    let (user, session) = auth_service::sign_up(
        &state,
        &req.display_name,
        &req.email_address,
        &req.password,
        ctx.inet.as_deref(),
    )
    .await?;

    cookies.add(session_cookie(&state, session.session_id())?);

    state.transport.respond(StatusCode::CREATED, &user).await
}

/// Verifies credentials and opens a session.
#[axum::debug_handler(state = AppState)]
pub async fn signin(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    cookies: Cookies,
    Sealed(req): Sealed<SignInRequest>,
) -> Result<Response> {
    validate_request(&req)?;

    let (user, session) =
        auth_service::sign_in(&state, &req.identifier, &req.password, ctx.inet.as_deref()).await?;

    cookies.add(session_cookie(&state, session.session_id())?);

    state.transport.respond(StatusCode::OK, &user).await
}

/// Erases the caller's session and expires the cookie.
#[axum::debug_handler]
pub async fn signout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    cookies: Cookies,
) -> Result<Response> {
    auth_service::sign_out(&state, &auth.session).await?;

    cookies.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());

    Ok(StatusCode::NO_CONTENT.into_response())
}
