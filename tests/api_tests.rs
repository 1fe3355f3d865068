use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use bounty_ledger::db::MemoryStore;
use bounty_ledger::ledger::SimulatedSettlement;
use bounty_ledger::{routes::build_router, AppState, Settings};

const PASSWORD: &str = "Str0ng!Pass";

fn app() -> Router {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(SimulatedSettlement),
        Settings::default(),
    );
    build_router(state)
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(text) => text.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

/// Registers a user and returns `(user_id, access_token)`.
async fn register(app: &Router, email: &str) -> (Uuid, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({ "email": email, "password": PASSWORD, "full_name": "Test Hunter" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let user_id = body["user_uid"].as_str().unwrap().parse().unwrap();
    let token = body["access_token"].as_str().unwrap().to_string();
    (user_id, token)
}

#[tokio::test]
async fn register_login_and_refresh() {
    let app = app();
    register(&app, "hunter@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({ "email": "hunter@example.com", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "USER_EXISTS");

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({ "email": "hunter@example.com", "password": "Wr0ng!Pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = send(
        &app,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({ "email": "hunter@example.com", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, refreshed) = send(
        &app,
        Method::POST,
        "/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": login["refresh_token"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["user_uid"], login["user_uid"]);
}

#[tokio::test]
async fn weak_passwords_are_rejected() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({ "email": "weak@example.com", "password": "password" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn wallet_requires_a_token() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/v1/wallet", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, Method::GET, "/v1/wallet", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wallet_flow_over_http() {
    let app = app();
    let (alice, alice_token) = register(&app, "alice@example.com").await;
    let (bob, bob_token) = register(&app, "bob@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/wallet/top-up",
        Some(&alice_token),
        Some(json!({ "amount": "1000.00", "method": "alipay" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["kind"], "deposit");

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/wallet/withdraw",
        Some(&alice_token),
        Some(json!({ "amount": "1200.00", "account": "6222-0000" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/wallet/transfer",
        Some(&alice_token),
        Some(json!({ "target_user_id": bob, "amount": "300.00", "description": "bounty share" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let transfer_id = body["id"].as_str().unwrap().to_string();

    let (_, wallet) = send(&app, Method::GET, "/v1/wallet", Some(&alice_token), None).await;
    assert_eq!(decimal(&wallet["balance"]), dec!(700.00));
    assert_eq!(wallet["transaction_count"], 2);

    let (_, wallet) = send(&app, Method::GET, "/v1/wallet", Some(&bob_token), None).await;
    assert_eq!(decimal(&wallet["balance"]), dec!(300.00));

    let (status, tx) = send(
        &app,
        Method::GET,
        &format!("/v1/wallet/transactions/{transfer_id}"),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tx["account_id"], json!(alice));

    let (status, page) = send(
        &app,
        Method::GET,
        "/v1/wallet/transactions?page=1&limit=10&kind=transfer",
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/wallet/transfer",
        Some(&alice_token),
        Some(json!({ "target_user_id": alice, "amount": "1.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SELF_TRANSFER_NOT_ALLOWED");

    // only the payee may hand the payment back
    let refund_uri = format!("/v1/wallet/transactions/{transfer_id}/refund");
    let (status, _) = send(&app, Method::POST, &refund_uri, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, refund) = send(&app, Method::POST, &refund_uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(refund["kind"], "refund");

    let (_, wallet) = send(&app, Method::GET, "/v1/wallet", Some(&alice_token), None).await;
    assert_eq!(decimal(&wallet["balance"]), dec!(1000.00));
}

#[tokio::test]
async fn validate_is_a_dry_run() {
    let app = app();
    let (_, token) = register(&app, "dry@example.com").await;
    send(
        &app,
        Method::POST,
        "/v1/wallet/top-up",
        Some(&token),
        Some(json!({ "amount": "50.00", "method": "alipay" })),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/wallet/validate",
        Some(&token),
        Some(json!({ "amount": "20.00", "kind": "withdrawal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(decimal(&body["total_debit"]), dec!(20.00));

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/wallet/validate",
        Some(&token),
        Some(json!({ "amount": "-1", "kind": "withdrawal" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_AMOUNT");

    let (_, wallet) = send(&app, Method::GET, "/v1/wallet", Some(&token), None).await;
    assert_eq!(decimal(&wallet["balance"]), dec!(50.00));
}

#[tokio::test]
async fn profile_includes_wallet() {
    let app = app();
    let (user_id, token) = register(&app, "me@example.com").await;
    let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(user_id));
    assert_eq!(body["email"], "me@example.com");
    assert!(body.get("password_hash").is_none());
    assert_eq!(body["wallet"]["currency"], "CNY");
}

#[tokio::test]
async fn transaction_stream_negotiates_event_stream() {
    let app = app();
    let (_, token) = register(&app, "stream@example.com").await;

    let request = Request::builder()
        .uri("/v1/wallet/transactions/stream")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

    let request = Request::builder()
        .uri("/v1/wallet/transactions/stream")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::ACCEPT, "text/event-stream")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
}

#[tokio::test]
async fn reviews_drive_reputation() {
    let app = app();
    let (publisher, publisher_token) = register(&app, "publisher@example.com").await;
    let (hunter, hunter_token) = register(&app, "hunter2@example.com").await;
    let task_id = Uuid::new_v4();

    let review = json!({
        "task_id": task_id,
        "target_id": hunter,
        "review_type": "publisher_to_hunter",
        "rating": 5,
        "quality_rating": 5,
        "comment": "fast and clean"
    });
    let (status, body) = send(&app, Method::POST, "/v1/reviews", Some(&publisher_token), Some(review.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["review"]["quality_rating"], 5);
    assert_eq!(body["reputation"]["total_reviews"], 1);
    let review_id = body["review"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::POST, "/v1/reviews", Some(&publisher_token), Some(review)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_REVIEW");

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/reviews",
        Some(&hunter_token),
        Some(json!({
            "task_id": task_id,
            "target_id": publisher,
            "review_type": "hunter_to_publisher",
            "rating": 9
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "RATING_OUT_OF_RANGE");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/v1/reviews/{review_id}"),
        Some(&hunter_token),
        Some(json!({ "rating": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_REVIEW_AUTHOR");

    let (status, record) = send(&app, Method::GET, &format!("/v1/users/{hunter}/reputation"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["score"], 100.0);
    assert_eq!(record["badges"][0]["code"], "first_review");

    let (_, stats) = send(&app, Method::GET, &format!("/v1/users/{hunter}/reviews/stats"), None, None).await;
    assert_eq!(stats["five_star"], 1);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/v1/reviews/{review_id}"),
        Some(&publisher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, page) = send(&app, Method::GET, &format!("/v1/users/{hunter}/reviews"), None, None).await;
    assert_eq!(page["total"], 0);

    let (_, badges) = send(&app, Method::GET, "/v1/reputation/badges", None, None).await;
    assert!(badges.as_array().unwrap().iter().any(|badge| badge["code"] == "veteran"));
}

#[tokio::test]
async fn rejected_bodies_keep_the_error_shape() {
    let app = app();
    let (_, token) = register(&app, "shape@example.com").await;
    let (hunter, _) = register(&app, "shape-hunter@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/wallet/top-up",
        Some(&token),
        Some(json!({ "amount": "lots", "method": "alipay" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/wallet/top-up",
        Some(&token),
        Some(json!({ "amount": "79228162514264337593543950335", "method": "alipay" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_AMOUNT");

    for rating in [300, -1] {
        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/reviews",
            Some(&token),
            Some(json!({
                "task_id": Uuid::new_v4(),
                "target_id": hunter,
                "review_type": "publisher_to_hunter",
                "rating": rating
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["code"], "RATING_OUT_OF_RANGE");
    }

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/reviews",
        Some(&token),
        Some(json!({ "rating": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(body["details"].is_string());
}
