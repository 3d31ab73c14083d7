use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_cookies::CookieManagerLayer;

use crate::{
    handlers,
    middleware_layer::{request::request_context, session::refresh_session},
    state::AppState,
};

/// Routes reachable without a session.
pub fn public_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/auth/signup", post(handlers::auth::signup))
        .route("/api/v1/auth/signin", post(handlers::auth::signin))
        .route("/api/v1/cards/{code}", get(handlers::cards::get_card))
        .with_state(state)
}

/// Routes behind the session-refresh middleware. Every hit rotates the
/// caller's session.
pub fn session_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/users/cs", get(handlers::users::current_user))
        .route("/api/v1/auth/signout", post(handlers::auth::signout))
        .route("/api/v1/cards", post(handlers::cards::create_card))
        .route(
            "/api/v1/cards/{card_id}/publish",
            post(handlers::cards::publish_card),
        )
        .route_layer(from_fn_with_state(state.clone(), refresh_session))
        .with_state(state)
}

/// Wraps merged routes with the request context and the cookie jar.
pub fn finish(routes: Router) -> Router {
    routes
        .layer(from_fn(request_context))
        .layer(CookieManagerLayer::new())
}

/// Assembles every route of the service.
///
/// # Arguments
///
/// * `state` - The application state.
///
/// # Returns
///
/// The complete `Router`, without throttling or transport-level layers.
pub fn build_router(state: AppState) -> Router {
    finish(public_routes(state.clone()).merge(session_routes(state)))
}
