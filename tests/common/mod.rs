#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde::de::DeserializeOwned;
use tower::ServiceExt;
use uuid::Uuid;
use vroomvault::{
    AppState, InMemoryRepository, MockStorageService, RepositoryState, StorageState,
    TokenService,
    config::AppConfig,
    create_router,
    models::{Car, CarCondition, NewCar, Role, User},
    repository::{NewUser, Repository},
};

pub const BOUNDARY: &str = "vroomvault-test-boundary";

/// A router over in-memory doubles, plus handles on those doubles for assertions.
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
    pub tokens: TokenService,
}

pub fn test_app() -> TestApp {
    test_app_with_storage(MockStorageService::new())
}

pub fn test_app_with_storage(storage: MockStorageService) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let config = AppConfig::default();
    let state = AppState::new(
        repo.clone() as RepositoryState,
        Arc::new(storage.clone()) as StorageState,
        config,
    );
    let tokens = state.tokens.clone();

    TestApp {
        router: create_router(state),
        repo,
        storage,
        tokens,
    }
}

impl TestApp {
    /// Inserts a user directly and issues a token for it. Skips password hashing.
    pub async fn seed_user(&self, name: &str, role: Role) -> (User, String) {
        let user = self
            .repo
            .create_user(NewUser {
                name: name.to_string(),
                email: format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4()),
                password_hash: "not-a-phc-string".to_string(),
                role,
            })
            .await
            .unwrap();
        let token = self.tokens.issue(user.id).unwrap();
        (user, token)
    }

    pub async fn seed_car(&self, seller_id: Uuid, brand: &str, year: i32, price: f64) -> Car {
        self.repo
            .create_car(
                seller_id,
                NewCar {
                    brand: brand.to_string(),
                    model: "Model".to_string(),
                    year,
                    mileage: 10_000,
                    price,
                    condition: CarCondition::Used,
                    description: None,
                },
                vec![],
            )
            .await
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: Request<Body>) -> (StatusCode, T) {
        let (status, body) = self.send(request).await;
        let parsed = serde_json::from_slice(&body).unwrap_or_else(|e| {
            panic!(
                "status {status}: body is not the expected JSON ({e}): {}",
                String::from_utf8_lossy(&body)
            )
        });
        (status, parsed)
    }

    /// The `msg` field of an error body.
    pub async fn send_for_msg(&self, request: Request<Body>) -> (StatusCode, String) {
        let (status, body) = self.send_json::<serde_json::Value>(request).await;
        let msg = body["msg"].as_str().unwrap_or_default().to_string();
        (status, msg)
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    with_token(Request::builder().method(Method::GET).uri(uri), token)
        .body(Body::empty())
        .unwrap()
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    with_token(Request::builder().method(Method::DELETE).uri(uri), token)
        .body(Body::empty())
        .unwrap()
}

pub fn json(method: Method, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    with_token(Request::builder().method(method).uri(uri), token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn multipart(method: Method, uri: &str, token: Option<&str>, form: FormBuilder) -> Request<Body> {
    with_token(Request::builder().method(method).uri(uri), token)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(form.finish()))
        .unwrap()
}

fn with_token(
    builder: axum::http::request::Builder,
    token: Option<&str>,
) -> axum::http::request::Builder {
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

/// Hand-rolled multipart/form-data body.
#[derive(Default)]
pub struct FormBuilder {
    body: Vec<u8>,
}

impl FormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn image(self, file_name: &str) -> Self {
        self.file("images", file_name, "image/jpeg", b"\xFF\xD8\xFF fake jpeg")
    }

    /// A complete, valid listing form without images.
    pub fn listing(brand: &str, model: &str) -> Self {
        Self::new()
            .text("brand", brand)
            .text("model", model)
            .text("year", "2019")
            .text("mileage", "42000")
            .text("price", "12500")
            .text("condition", "Used")
            .text("description", "One careful owner")
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}
