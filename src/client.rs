//! Typed HTTP client holding a browser-style session.
//!
//! `SessionContext` is what a front end keeps for the lifetime of a tab: the
//! current token and user, persisted through a pluggable `TokenStore`, plus one
//! typed method per API endpoint. Failures surface as `ClientError` and never
//! disturb the session that was in place before the call.

use std::sync::{Arc, Mutex};

use reqwest::{Method, RequestBuilder, StatusCode, multipart};
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AuthResponse, Car, CarCondition, CarFilter, CarStatus, LoginRequest, MessageResponse,
    RegisterUserRequest, Role, UpdateCarStatusRequest, UpdateUserStatusRequest, UserProfile,
    UserStatus,
};

#[derive(Debug, Error)]
pub enum ClientError {
    /// The API answered with a non-success status. `message` is its `msg` field.
    #[error("{message}")]
    Api { status: StatusCode, message: String },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("You need to sign in first")]
    NotSignedIn,
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
            ClientError::NotSignedIn => None,
        }
    }
}

/// Where the session token survives between runs (the browser's localStorage).
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str);
    fn clear(&self);
}

/// A `TokenStore` that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().ok().and_then(|token| token.clone())
    }

    fn save(&self, token: &str) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token.to_string());
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
    }
}

/// An image attached to a listing form.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// CarDraft
///
/// Client-side listing form. For creation every field but `description` must
/// be set; for an edit, unset fields are left out of the request and images
/// are appended.
#[derive(Debug, Clone, Default)]
pub struct CarDraft {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub mileage: Option<i32>,
    pub price: Option<f64>,
    pub condition: Option<CarCondition>,
    pub description: Option<String>,
    pub images: Vec<ImageFile>,
}

impl CarDraft {
    fn into_form(self) -> Result<multipart::Form, ClientError> {
        let texts = [
            ("brand", self.brand),
            ("model", self.model),
            ("year", self.year.map(|v| v.to_string())),
            ("mileage", self.mileage.map(|v| v.to_string())),
            ("price", self.price.map(|v| v.to_string())),
            ("condition", self.condition.map(|c| c.as_str().to_string())),
            ("description", self.description),
        ];

        let mut form = multipart::Form::new();
        for (name, value) in texts {
            if let Some(value) = value {
                form = form.text(name, value);
            }
        }
        for image in self.images {
            let part = multipart::Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(&image.content_type)?;
            form = form.part("images", part);
        }
        Ok(form)
    }
}

/// SessionContext
///
/// The signed-in state of one client. Not global: create one per user session.
pub struct SessionContext {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    token: Option<String>,
    user: Option<UserProfile>,
}

impl SessionContext {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn TokenStore>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, store)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            token: None,
            user: None,
        }
    }

    /// init
    ///
    /// Restores a persisted session. The stored token is only trusted once
    /// `/api/users/me` accepts it; any failure clears it.
    pub async fn init(&mut self) -> Option<&UserProfile> {
        let token = self.store.load()?;

        let request = self
            .http
            .get(self.url("/api/users/me"))
            .bearer_auth(&token);
        match Self::send::<UserProfile>(request).await {
            Ok(user) => {
                self.token = Some(token);
                self.user = Some(user);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Discarding stored session token");
                self.store.clear();
                self.token = None;
                self.user = None;
            }
        }
        self.user.as_ref()
    }

    pub async fn register(
        &mut self,
        request: &RegisterUserRequest,
    ) -> Result<&UserProfile, ClientError> {
        let builder = self.http.post(self.url("/api/users/register")).json(request);
        let auth = Self::send::<AuthResponse>(builder).await?;
        Ok(self.establish(auth))
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<&UserProfile, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let builder = self.http.post(self.url("/api/users/login")).json(&body);
        let auth = Self::send::<AuthResponse>(builder).await?;
        Ok(self.establish(auth))
    }

    fn establish(&mut self, auth: AuthResponse) -> &UserProfile {
        self.store.save(&auth.token);
        self.token = Some(auth.token);
        self.user.insert(auth.user)
    }

    pub fn logout(&mut self) {
        self.store.clear();
        self.token = None;
        self.user = None;
    }

    pub fn current_user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Landing page for the current identity.
    pub fn dashboard_path(&self) -> &'static str {
        match self.user.as_ref().map(|user| user.role) {
            Some(Role::Admin) => "/admin-dashboard",
            Some(Role::Seller) => "/seller-dashboard",
            Some(Role::Buyer) => "/buyer-dashboard",
            None => "/login",
        }
    }

    /// Route guard: signed in and holding exactly `required`.
    pub fn can_access(&self, required: Role) -> bool {
        self.user.as_ref().is_some_and(|user| user.role == required)
    }

    // --- Listings ---

    pub async fn list_cars(&self, filter: &CarFilter) -> Result<Vec<Car>, ClientError> {
        Self::send(self.http.get(self.url("/api/cars")).query(filter)).await
    }

    pub async fn get_car(&self, id: Uuid) -> Result<Car, ClientError> {
        Self::send(self.http.get(self.url(&format!("/api/cars/{id}")))).await
    }

    pub async fn my_cars(&self) -> Result<Vec<Car>, ClientError> {
        Self::send(self.authorized(Method::GET, "/api/cars/seller")?).await
    }

    pub async fn create_car(&self, draft: CarDraft) -> Result<Car, ClientError> {
        let form = draft.into_form()?;
        Self::send(self.authorized(Method::POST, "/api/cars")?.multipart(form)).await
    }

    pub async fn update_car(&self, id: Uuid, draft: CarDraft) -> Result<Car, ClientError> {
        let form = draft.into_form()?;
        Self::send(
            self.authorized(Method::PUT, &format!("/api/cars/{id}"))?
                .multipart(form),
        )
        .await
    }

    pub async fn set_car_status(&self, id: Uuid, status: CarStatus) -> Result<Car, ClientError> {
        Self::send(
            self.authorized(Method::PUT, &format!("/api/cars/{id}/status"))?
                .json(&UpdateCarStatusRequest { status }),
        )
        .await
    }

    pub async fn delete_car(&self, id: Uuid) -> Result<MessageResponse, ClientError> {
        Self::send(self.authorized(Method::DELETE, &format!("/api/cars/{id}"))?).await
    }

    // --- Admin ---

    pub async fn list_users(&self) -> Result<Vec<UserProfile>, ClientError> {
        Self::send(self.authorized(Method::GET, "/api/users")?).await
    }

    pub async fn set_user_status(
        &self,
        id: Uuid,
        status: UserStatus,
    ) -> Result<UserProfile, ClientError> {
        Self::send(
            self.authorized(Method::PUT, &format!("/api/users/{id}"))?
                .json(&UpdateUserStatusRequest { status }),
        )
        .await
    }

    pub async fn admin_cars(&self) -> Result<Vec<Car>, ClientError> {
        Self::send(self.authorized(Method::GET, "/api/admin/cars")?).await
    }

    // --- Plumbing ---

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotSignedIn)?;
        Ok(self.http.request(method, self.url(path)).bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = match response.json::<MessageResponse>().await {
            Ok(body) => body.msg,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
        };
        tracing::debug!(%status, %message, "API request failed");
        Err(ClientError::Api { status, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session_as(role: Option<Role>) -> SessionContext {
        let mut session =
            SessionContext::new("http://localhost:5000/", Arc::new(MemoryTokenStore::default()));
        session.user = role.map(|role| UserProfile {
            id: Uuid::new_v4(),
            name: "Test".into(),
            email: "test@example.com".into(),
            role,
            status: UserStatus::Active,
            created_at: Utc::now(),
        });
        session
    }

    #[test]
    fn test_dashboard_path_by_role() {
        assert_eq!(session_as(Some(Role::Admin)).dashboard_path(), "/admin-dashboard");
        assert_eq!(session_as(Some(Role::Seller)).dashboard_path(), "/seller-dashboard");
        assert_eq!(session_as(Some(Role::Buyer)).dashboard_path(), "/buyer-dashboard");
        assert_eq!(session_as(None).dashboard_path(), "/login");
    }

    #[test]
    fn test_can_access_requires_exact_role() {
        let seller = session_as(Some(Role::Seller));
        assert!(seller.can_access(Role::Seller));
        assert!(!seller.can_access(Role::Admin));
        assert!(!session_as(None).can_access(Role::Buyer));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let session = session_as(None);
        assert_eq!(session.url("/api/cars"), "http://localhost:5000/api/cars");
    }

    #[tokio::test]
    async fn test_protected_call_without_token_fails_locally() {
        let session = session_as(None);
        assert!(matches!(session.my_cars().await, Err(ClientError::NotSignedIn)));
    }

    #[test]
    fn test_memory_token_store() {
        let store = MemoryTokenStore::with_token("abc");
        assert_eq!(store.load().as_deref(), Some("abc"));
        store.clear();
        assert_eq!(store.load(), None);
        store.save("def");
        assert_eq!(store.load().as_deref(), Some("def"));
    }
}
