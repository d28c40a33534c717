use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// --- Closed Enumerations (Mapped to Postgres enum types) ---

/// Role
///
/// The RBAC field. Every guard site matches on it exhaustively.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Buyer,
    Seller,
    Admin,
}

/// UserStatus
///
/// Suspended accounts cannot sign in and their outstanding tokens stop resolving.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[ts(export)]
pub enum UserStatus {
    #[default]
    Active,
    Suspended,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "car_condition")]
#[ts(export)]
pub enum CarCondition {
    #[serde(rename = "New")]
    #[sqlx(rename = "New")]
    New,
    #[default]
    #[serde(rename = "Used")]
    #[sqlx(rename = "Used")]
    Used,
    #[serde(rename = "Certified Pre-Owned")]
    #[sqlx(rename = "Certified Pre-Owned")]
    CertifiedPreOwned,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "car_status", rename_all = "lowercase")]
#[ts(export)]
pub enum CarStatus {
    #[default]
    Available,
    Sold,
    Pending,
}

/// Raised when a string does not name a variant of one of the enumerations above.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {kind}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
        }
    }
}

impl CarCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarCondition::New => "New",
            CarCondition::Used => "Used",
            CarCondition::CertifiedPreOwned => "Certified Pre-Owned",
        }
    }
}

impl CarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarStatus::Available => "available",
            CarStatus::Sold => "sold",
            CarStatus::Pending => "pending",
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            "admin" => Ok(Role::Admin),
            other => Err(ParseEnumError { kind: "role", value: other.to_string() }),
        }
    }
}

impl FromStr for UserStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            other => Err(ParseEnumError { kind: "user status", value: other.to_string() }),
        }
    }
}

impl FromStr for CarCondition {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(CarCondition::New),
            "Used" => Ok(CarCondition::Used),
            "Certified Pre-Owned" => Ok(CarCondition::CertifiedPreOwned),
            other => Err(ParseEnumError { kind: "condition", value: other.to_string() }),
        }
    }
}

impl FromStr for CarStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(CarStatus::Available),
            "sold" => Ok(CarStatus::Sold),
            "pending" => Ok(CarStatus::Pending),
            other => Err(ParseEnumError { kind: "listing status", value: other.to_string() }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CarCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The canonical credential record from the `users` table. Carries the password
/// hash, so it never leaves the server: responses use `UserProfile`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    // Stored trimmed and lowercased; unique.
    pub email: String,
    // Argon2id PHC string.
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Car
///
/// A listing from the `cars` table, joined with its seller's name and email.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Car {
    pub id: Uuid,
    // FK to users.id. Written once at insert.
    #[serde(rename = "seller")]
    pub seller_id: Uuid,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub mileage: i32,
    pub price: f64,
    pub condition: CarCondition,
    pub description: Option<String>,
    // Public URLs of the stored images, in upload order.
    pub images: Vec<String>,
    pub status: CarStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,

    // Loaded via a JOIN on users in the repository queries.
    #[sqlx(default)]
    pub seller_name: Option<String>,
    #[sqlx(default)]
    pub seller_email: Option<String>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input payload for `POST /api/users/register`. The password is hashed before
/// it reaches the repository and is never logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// UpdateUserStatusRequest
///
/// Admin moderation payload for `PUT /api/users/{id}`. Status is the only mutable field.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateUserStatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateCarStatusRequest {
    pub status: CarStatus,
}

/// CarUploadForm
///
/// Documents the multipart body accepted by `POST /api/cars` and `PUT /api/cars/{id}`.
/// Parsing happens in `upload::CarForm`; this type only feeds the OpenAPI schema.
#[derive(Debug, ToSchema)]
pub struct CarUploadForm {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub mileage: i32,
    pub price: f64,
    pub condition: CarCondition,
    pub description: Option<String>,
    /// Up to 5 jpg, jpeg, png or gif files.
    #[schema(value_type = Vec<String>)]
    pub images: Vec<Vec<u8>>,
}

/// NewCar
///
/// Validated text fields of a listing about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCar {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub mileage: i32,
    pub price: f64,
    pub condition: CarCondition,
    pub description: Option<String>,
}

/// CarUpdate
///
/// Partial update of a listing. `None` leaves the stored value untouched,
/// `images` are appended after the existing ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarUpdate {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub mileage: Option<i32>,
    pub price: Option<f64>,
    pub condition: Option<CarCondition>,
    // `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub images: Vec<String>,
}

// --- Output Schemas ---

/// UserProfile
///
/// The public view of a user. Returned by `/api/users/me`, the admin user list
/// and alongside every issued token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            status: user.status,
            created_at: user.created_at,
        }
    }
}

/// AuthResponse
///
/// Returned by register and login: the session token plus the resolved identity.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Human-readable outcome or error message, e.g. `{"msg": "Car not found"}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

// --- Listing Filter ---

/// CarFilter
///
/// Query parameters accepted by `GET /api/cars`. Every supplied predicate must
/// hold (conjunction); bounds are inclusive. Empty values are treated as absent,
/// so a form that submits `brand=` does not filter on brand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CarFilter {
    /// Case-insensitive substring match on brand or model.
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Case-insensitive exact brand.
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub condition: Option<CarCondition>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub status: Option<CarStatus>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub min_year: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub max_year: Option<i32>,
}

impl CarFilter {
    /// In-process evaluation of the filter. Kept in lockstep with the SQL built
    /// by `PostgresRepository::list_cars`.
    pub fn matches(&self, car: &Car) -> bool {
        let search_ok = self.search.as_ref().is_none_or(|term| {
            let term = term.to_lowercase();
            car.brand.to_lowercase().contains(&term) || car.model.to_lowercase().contains(&term)
        });
        let brand_ok = self
            .brand
            .as_ref()
            .is_none_or(|brand| car.brand.to_lowercase() == brand.to_lowercase());

        search_ok
            && brand_ok
            && self.condition.is_none_or(|c| car.condition == c)
            && self.status.is_none_or(|s| car.status == s)
            && self.min_price.is_none_or(|min| car.price >= min)
            && self.max_price.is_none_or(|max| car.price <= max)
            && self.min_year.is_none_or(|min| car.year >= min)
            && self.max_year.is_none_or(|max| car.year <= max)
    }
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<T>().map(Some).map_err(de::Error::custom),
    }
}
