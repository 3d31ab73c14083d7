mod common;

use axum::http::StatusCode;
use code_letters::middleware_layer::session::{session_cookie as build_cookie, session_id_from_cookie};
use code_letters::models::session::{NewSession, HEADER_AUDIENCE, KIND_AUTH};
use common::{json_body, session_cookie, spawn_app};
use serde_json::json;

#[tokio::test]
async fn signup_sets_cookie_and_returns_sealed_user() {
    let app = spawn_app();
    let response = app
        .post_json(
            "/api/v1/auth/signup",
            json!({ "displayName": "ana", "emailAddress": " Ana@Example.com", "password": "correct-horse" }),
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["content-type"], "application/octet-stream");

    let set_cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Strict"));
    assert!(set_cookie.contains("Path=/"));
    assert!(!set_cookie.contains("Secure"));

    let user = app.open_body(response).await;
    assert_eq!(user["displayName"], "ana");
    assert_eq!(user["emailAddress"], "ana@example.com");
    assert!(user.get("passwordDigest").is_none());
    assert_eq!(app.sessions.len().await, 1);
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let app = spawn_app();
    app.sign_up("ana").await;

    let response = app
        .post_json(
            "/api/v1/auth/signup",
            json!({ "displayName": "ana", "emailAddress": "other@example.com", "password": "correct-horse" }),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn display_name_shaped_like_a_user_id_is_rejected() {
    let app = spawn_app();
    let (cookie, user_id) = app.sign_up("ana").await;

    let response = app
        .post_json(
            "/api/v1/auth/signup",
            json!({ "displayName": user_id, "emailAddress": "mallory@example.com", "password": "correct-horse" }),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/api/v1/users/cs", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let user = app.open_body(response).await;
    assert_eq!(user["userId"], user_id.as_str());
}

#[tokio::test]
async fn every_authenticated_request_rotates_the_session() {
    let app = spawn_app();
    let (first, user_id) = app.sign_up("ana").await;

    let response = app.get("/api/v1/users/cs", Some(&first)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let second = session_cookie(&response).expect("rotated cookie");
    assert_ne!(first, second);

    let old_id = session_id_from_cookie(&app.state, &first).unwrap();
    let new_id = session_id_from_cookie(&app.state, &second).unwrap();
    assert_ne!(old_id, new_id);
    assert!(app.state.sessions.find_by_id(&old_id).await.unwrap().is_none());

    let user = app.open_body(response).await;
    assert_eq!(user["userId"], user_id.as_str());

    // The replaced cookie is dead.
    let replay = app.get("/api/v1/users/cs", Some(&first)).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.sessions.len().await, 1);
}

#[tokio::test]
async fn missing_cookie_is_unauthorized() {
    let app = spawn_app();
    let response = app.get("/api/v1/users/cs", None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["httpStatusCode"], 401);
    assert_eq!(body["code"], "ERR_UNAUTHORIZED");
    assert_eq!(body["message"], "Unable to find your session");

    let rid = body["requestId"].as_str().unwrap();
    assert_eq!(rid, rid.to_uppercase());
    assert_eq!(rid.len(), 36);
}

#[tokio::test]
async fn garbage_cookie_is_unauthorized() {
    let app = spawn_app();
    let response = app.get("/api/v1/users/cs", Some("not-a-session")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn foreign_audience_is_forbidden() {
    let app = spawn_app();
    let session = app
        .state
        .sessions
        .create(
            NewSession::new(KIND_AUTH, json!({}))
                .header(HEADER_AUDIENCE, "svc")
                .user("someone")
                .expires("5m"),
        )
        .await
        .unwrap();
    let cookie = build_cookie(&app.state, session.session_id()).unwrap();

    let response = app.get("/api/v1/users/cs", Some(cookie.value())).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], "ERR_FORBIDDEN");
}

#[tokio::test]
async fn signin_checks_credentials_and_locks_out() {
    let app = spawn_app();
    app.sign_up("ana").await;

    let ok = app
        .post_json(
            "/api/v1/auth/signin",
            json!({ "identifier": "ANA@example.com", "password": "correct-horse" }),
            None,
        )
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    assert!(session_cookie(&ok).is_some());

    for _ in 0..3 {
        let wrong = app
            .post_json(
                "/api/v1/auth/signin",
                json!({ "identifier": "ana", "password": "wrong-horse" }),
                None,
            )
            .await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(wrong).await["message"], "The provided credentials are wrong");
    }

    let locked = app
        .post_json(
            "/api/v1/auth/signin",
            json!({ "identifier": "ana", "password": "correct-horse" }),
            None,
        )
        .await;
    assert_eq!(locked.status(), StatusCode::FORBIDDEN);
    let body = json_body(locked).await;
    assert!(body["message"].as_str().unwrap().starts_with("Too many failed login attempts"));
}

#[tokio::test]
async fn invalid_payload_is_rejected() {
    let app = spawn_app();
    let response = app
        .post_json(
            "/api/v1/auth/signup",
            json!({ "displayName": "a b", "emailAddress": "nope", "password": "1" }),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "ERR_INVALID_ARGUMENT");
}

#[tokio::test]
async fn sealed_request_bodies_are_accepted() {
    let app = spawn_app();
    app.sign_up("ana").await;

    let sealed = app
        .state
        .transport
        .seal(&json!({ "identifier": "ana", "password": "correct-horse" }))
        .await
        .unwrap();

    let request = axum::http::Request::post("/api/v1/auth/signin")
        .header("content-type", "application/octet-stream")
        .body(axum::body::Body::from(sealed))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn token_wrapped_json_bodies_are_accepted() {
    let app = spawn_app();
    app.sign_up("ana").await;

    let token = app
        .state
        .transport
        .sign_token(&json!({ "identifier": "ana", "password": "correct-horse" }), None)
        .unwrap();

    let response = app.post_json("/api/v1/auth/signin", json!(token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_some());

    // A string that is not a valid token falls back to plain JSON.
    let response = app
        .post_json("/api/v1/auth/signin", json!(format!("{}x", token)), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signout_erases_the_session_and_expires_the_cookie() {
    let app = spawn_app();
    let (cookie, _) = app.sign_up("ana").await;

    let response = app.post_json("/api/v1/auth/signout", json!({}), Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let set_cookie = response.headers()["set-cookie"].to_str().unwrap();
    assert!(set_cookie.starts_with("_CSID=;"));
    assert!(set_cookie.contains("Max-Age=0"));

    assert!(app.sessions.is_empty().await);
}
