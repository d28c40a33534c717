mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use common::{get, test_app};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;
use vroomvault::{
    auth::{AuthError, Claims, TokenService},
    config::LOCAL_JWT_SECRET,
    models::{Role, UserStatus},
    repository::Repository,
};

fn token_with_claims(secret: &str, sub: Uuid, iat: i64, exp: i64) -> String {
    let claims = Claims {
        sub,
        iat: iat as usize,
        exp: exp as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_valid_token_reaches_handler() {
    let app = test_app();
    let (user, token) = app.seed_user("Valid", Role::Buyer).await;

    let (status, body): (_, serde_json::Value) =
        app.send_json(get("/api/users/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], user.id.to_string());
}

#[tokio::test]
async fn test_missing_token_is_rejected_with_json_body() {
    let app = test_app();
    let (status, msg) = app.send_for_msg(get("/api/users/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(msg, "No valid token, authorization denied");
}

#[tokio::test]
async fn test_malformed_header_is_rejected() {
    let app = test_app();
    let (_, token) = app.seed_user("Raw", Role::Buyer).await;

    // Token without the Bearer scheme.
    let request = Request::builder()
        .uri("/api/users/me")
        .header(header::AUTHORIZATION, token)
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.0, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send_for_msg(get("/api/users/me", Some("not.a.jwt")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let app = test_app();
    let (user, _) = app.seed_user("Forged", Role::Admin).await;

    let now = Utc::now().timestamp();
    let forged = token_with_claims("attacker-secret", user.id, now, now + 3600);

    let (status, _) = app.send_for_msg(get("/api/users", Some(&forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = test_app();
    let (user, _) = app.seed_user("Expired", Role::Buyer).await;

    let now = Utc::now().timestamp();
    let expired = token_with_claims(LOCAL_JWT_SECRET, user.id, now - 7200, now - 3600);

    let (status, _) = app
        .send_for_msg(get("/api/users/me", Some(&expired)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_for_unknown_user_is_rejected() {
    let app = test_app();
    let token = app.tokens.issue(Uuid::new_v4()).unwrap();

    let (status, _) = app.send_for_msg(get("/api/users/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_suspended_user_token_is_rejected_and_restored_on_reactivation() {
    let app = test_app();
    let (user, token) = app.seed_user("Toggle", Role::Seller).await;

    app.repo
        .set_user_status(user.id, UserStatus::Suspended)
        .await
        .unwrap();
    let (status, _) = app.send_for_msg(get("/api/users/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.repo
        .set_user_status(user.id, UserStatus::Active)
        .await
        .unwrap();
    let (status, _) = app.send_for_msg(get("/api/users/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_role_is_read_from_store_not_token() {
    // The token only names the user; the role comes from the current record.
    let app = test_app();
    let (buyer, token) = app.seed_user("Climber", Role::Buyer).await;

    let (status, _) = app.send_for_msg(get("/api/cars/seller", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.repo.find_user_by_id(buyer.id).await.unwrap().unwrap().role, Role::Buyer);
}

#[test]
fn test_token_service_rejects_garbage() {
    let tokens = TokenService::new("secret", 24);
    assert!(matches!(tokens.verify("garbage"), Err(AuthError::InvalidToken(_))));
}

#[test]
fn test_token_lifetime_follows_ttl() {
    let tokens = TokenService::new("secret", 2);
    let token = tokens.issue(Uuid::new_v4()).unwrap();

    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = false;
    let data = jsonwebtoken::decode::<Claims>(
        &token,
        &jsonwebtoken::DecodingKey::from_secret(b"secret"),
        &validation,
    )
    .unwrap();
    assert_eq!(data.claims.exp - data.claims.iat, 2 * 3600);
}
