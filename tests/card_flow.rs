mod common;

use axum::http::StatusCode;
use chrono::Utc;
use code_letters::models::card::CardStatus;
use code_letters::repositories::card::CardRepository;
use common::{json_body, session_cookie, spawn_app};
use serde_json::json;

fn props() -> serde_json::Value {
    json!({ "title": "Happy birthday", "body": "x".repeat(3000), "theme": { "dark": true } })
}

#[tokio::test]
async fn create_fetch_and_publish() {
    let app = spawn_app();
    let (cookie, owner) = app.sign_up("ana").await;

    let created = app
        .post_json(
            "/api/v1/cards",
            json!({ "name": "  Birthday  ", "cardProps": props() }),
            Some(&cookie),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let cookie = session_cookie(&created).unwrap();

    let card = json_body(created).await;
    assert_eq!(card["status"], "DRAFT");
    assert_eq!(card["name"], "Birthday");
    assert_eq!(card["ownerId"], owner.as_str());
    assert_eq!(card["cardProps"], props());

    let code = card["shortCode"].as_str().unwrap();
    let card_id = card["cardId"].as_str().unwrap();

    // Reads are public and accept either identifier.
    for id in [code, card_id] {
        let fetched = app.get(&format!("/api/v1/cards/{}", id), None).await;
        assert_eq!(fetched.status(), StatusCode::OK);
        assert_eq!(json_body(fetched).await["cardProps"], props());
    }

    let published = app
        .post_json(&format!("/api/v1/cards/{}/publish", card_id), json!({}), Some(&cookie))
        .await;
    assert_eq!(published.status(), StatusCode::OK);
    assert_eq!(json_body(published).await["status"], "PUBLISHED");
}

#[tokio::test]
async fn only_the_owner_publishes() {
    let app = spawn_app();
    let (owner_cookie, _) = app.sign_up("ana").await;
    let (other_cookie, _) = app.sign_up("bob").await;

    let created = app
        .post_json("/api/v1/cards", json!({ "cardProps": props() }), Some(&owner_cookie))
        .await;
    let card = json_body(created).await;
    let card_id = card["cardId"].as_str().unwrap();

    let response = app
        .post_json(&format!("/api/v1/cards/{}/publish", card_id), json!({}), Some(&other_cookie))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn banned_and_unknown_cards_are_not_found() {
    let app = spawn_app();
    let (cookie, _) = app.sign_up("ana").await;

    let created = app
        .post_json("/api/v1/cards", json!({ "cardProps": { "a": 1 } }), Some(&cookie))
        .await;
    let card = json_body(created).await;
    let card_id = card["cardId"].as_str().unwrap();

    app.cards
        .set_status(card_id, CardStatus::Banned, Utc::now())
        .await
        .unwrap();

    let response = app.get(&format!("/api/v1/cards/{}", card_id), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "ERR_NOT_FOUND");

    let response = app.get("/api/v1/cards/nothing-here", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn card_creation_requires_a_session_and_an_object() {
    let app = spawn_app();

    let response = app
        .post_json("/api/v1/cards", json!({ "cardProps": { "a": 1 } }), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (cookie, _) = app.sign_up("ana").await;
    let response = app
        .post_json("/api/v1/cards", json!({ "cardProps": [1, 2] }), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
