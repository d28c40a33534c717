use crate::{
    AppState,
    access::{Capability, authorize, require_role},
    auth::{AuthUser, hash_password, verify_password},
    error::AppError,
    models::{
        AuthResponse, Car, CarFilter, CarUploadForm, LoginRequest, MessageResponse,
        RegisterUserRequest, Role, UpdateCarStatusRequest, UpdateUserStatusRequest, UserProfile,
        UserStatus,
    },
    repository::NewUser,
    upload::{CarForm, discard_images, store_images},
};
use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use uuid::Uuid;

fn car_not_found() -> AppError {
    AppError::NotFound("Car not found".to_string())
}

/// An id that is not a UUID cannot name a stored record, so it reads as a miss.
fn car_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id).map_err(|_| car_not_found())
}

/// Emails are compared and stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// --- Users ---

/// register_user
///
/// [Public Route] Creates an active account with the requested role and signs
/// the caller in immediately. A taken email is a validation failure.
#[utoipa::path(
    post,
    path = "/api/users/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 400, description = "Missing field or email already registered", body = MessageResponse)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;

    let name = payload.name.trim();
    let email = normalize_email(&payload.email);
    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::Validation(
            "Please include name, email and password".to_string(),
        ));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .repo
        .create_user(NewUser {
            name: name.to_string(),
            email,
            password_hash,
            role: payload.role,
        })
        .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "User registered");

    let token = state.tokens.issue(user.id)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// login_user
///
/// [Public Route] Exchanges email and password for a session token. Unknown
/// emails and wrong passwords are indistinguishable to the caller.
#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials or suspended account", body = MessageResponse)
    )
)]
pub async fn login_user(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;

    let user = state
        .repo
        .find_user_by_email(&normalize_email(&payload.email))
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    verify_password(&payload.password, &user.password_hash)?;

    match user.status {
        UserStatus::Active => {}
        UserStatus::Suspended => {
            tracing::info!(user_id = %user.id, "Login refused for suspended account");
            return Err(AppError::Forbidden("Account suspended".to_string()));
        }
    }

    let token = state.tokens.issue(user.id)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "No valid token", body = MessageResponse)
    )
)]
pub async fn get_me(
    identity: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let user = state
        .repo
        .find_user_by_id(identity.id)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    Ok(Json(user.into()))
}

/// list_users
///
/// [Admin Route] Every account, newest first.
#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "All users", body = [UserProfile]))
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserProfile>>, AppError> {
    let users = state.repo.list_users().await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

/// update_user_status
///
/// [Admin Route] Activates or suspends an account. Status is the only field
/// this route changes; anything else in the body is ignored.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserStatusRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 404, description = "User not found", body = MessageResponse)
    )
)]
pub async fn update_user_status(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateUserStatusRequest>, JsonRejection>,
) -> Result<Json<UserProfile>, AppError> {
    let not_found = || AppError::NotFound("User not found".to_string());
    let Path(id) = id.map_err(|_| not_found())?;
    let Json(payload) = payload?;

    let user = state
        .repo
        .set_user_status(id, payload.status)
        .await?
        .ok_or_else(not_found)?;

    tracing::info!(user_id = %user.id, status = user.status.as_str(), "User status changed");
    Ok(Json(user.into()))
}

// --- Listings ---

/// list_cars
///
/// [Public Route] Listings matching every supplied filter, newest first.
#[utoipa::path(
    get,
    path = "/api/cars",
    params(CarFilter),
    responses((status = 200, description = "Filtered listings", body = [Car]))
)]
pub async fn list_cars(
    State(state): State<AppState>,
    filter: Result<Query<CarFilter>, QueryRejection>,
) -> Result<Json<Vec<Car>>, AppError> {
    let Query(filter) = filter?;
    Ok(Json(state.repo.list_cars(&filter).await?))
}

/// get_car
///
/// [Public Route] A single listing with its seller's name and email.
#[utoipa::path(
    get,
    path = "/api/cars/{id}",
    params(("id" = Uuid, Path, description = "Listing ID")),
    responses(
        (status = 200, description = "Found", body = Car),
        (status = 404, description = "Car not found", body = MessageResponse)
    )
)]
pub async fn get_car(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Car>, AppError> {
    let id = car_id(id)?;
    let car = state.repo.get_car(id).await?.ok_or_else(car_not_found)?;
    Ok(Json(car))
}

/// get_seller_cars
///
/// [Authenticated Route] The calling seller's own listings, whatever their status.
#[utoipa::path(
    get,
    path = "/api/cars/seller",
    responses(
        (status = 200, description = "My listings", body = [Car]),
        (status = 401, description = "Not a seller", body = MessageResponse)
    )
)]
pub async fn get_seller_cars(
    identity: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Car>>, AppError> {
    require_role(&identity, Role::Seller)?;
    Ok(Json(state.repo.list_cars_by_seller(identity.id).await?))
}

/// create_car
///
/// [Authenticated Route] Creates a listing owned by the calling seller.
///
/// The form is validated in full before any image is uploaded. If the insert
/// fails afterwards, the freshly uploaded images are discarded.
#[utoipa::path(
    post,
    path = "/api/cars",
    request_body(content = CarUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Created", body = Car),
        (status = 400, description = "Invalid form", body = MessageResponse),
        (status = 401, description = "Not a seller", body = MessageResponse)
    )
)]
pub async fn create_car(
    identity: AuthUser,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Car>), AppError> {
    require_role(&identity, Role::Seller)?;

    let form = CarForm::from_multipart(multipart?).await?;
    let new_car = form.new_car()?;
    let images = store_images(&state.storage, form.images).await?;

    match state
        .repo
        .create_car(identity.id, new_car, images.clone())
        .await
    {
        Ok(car) => {
            tracing::info!(car_id = %car.id, seller_id = %identity.id, images = car.images.len(), "Listing created");
            Ok((StatusCode::CREATED, Json(car)))
        }
        Err(e) => {
            discard_images(&state.storage, &images).await;
            Err(e.into())
        }
    }
}

/// update_car
///
/// [Authenticated Route] Owner-only edit. Supplied text fields replace the
/// stored values and uploaded images are appended after the existing ones.
#[utoipa::path(
    put,
    path = "/api/cars/{id}",
    params(("id" = Uuid, Path, description = "Listing ID")),
    request_body(content = CarUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Updated", body = Car),
        (status = 401, description = "User not authorized", body = MessageResponse),
        (status = 404, description = "Car not found", body = MessageResponse)
    )
)]
pub async fn update_car(
    identity: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Car>, AppError> {
    let id = car_id(id)?;
    let existing = state.repo.get_car(id).await?.ok_or_else(car_not_found)?;
    authorize(&identity, Capability::Edit, &existing)?;

    let form = CarForm::from_multipart(multipart?).await?;
    let mut update = form.update()?;
    update.images = store_images(&state.storage, form.images).await?;
    let appended = update.images.clone();

    match state.repo.update_car(id, update).await {
        Ok(Some(car)) => Ok(Json(car)),
        // Deleted between the ownership check and the write.
        Ok(None) => {
            discard_images(&state.storage, &appended).await;
            Err(car_not_found())
        }
        Err(e) => {
            discard_images(&state.storage, &appended).await;
            Err(e.into())
        }
    }
}

/// update_car_status
///
/// [Authenticated Route] Marks a listing available, pending or sold. Allowed
/// for the owning seller and for admins.
#[utoipa::path(
    put,
    path = "/api/cars/{id}/status",
    params(("id" = Uuid, Path, description = "Listing ID")),
    request_body = UpdateCarStatusRequest,
    responses(
        (status = 200, description = "Updated", body = Car),
        (status = 401, description = "User not authorized", body = MessageResponse),
        (status = 404, description = "Car not found", body = MessageResponse)
    )
)]
pub async fn update_car_status(
    identity: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateCarStatusRequest>, JsonRejection>,
) -> Result<Json<Car>, AppError> {
    let id = car_id(id)?;
    let existing = state.repo.get_car(id).await?.ok_or_else(car_not_found)?;
    authorize(&identity, Capability::ModerateStatus, &existing)?;
    let Json(payload) = payload?;

    let car = state
        .repo
        .set_car_status(id, payload.status)
        .await?
        .ok_or_else(car_not_found)?;

    tracing::info!(car_id = %car.id, status = %car.status, by = %identity.id, "Listing status changed");
    Ok(Json(car))
}

/// delete_car
///
/// [Authenticated Route] Removes a listing (owning seller only). The record goes
/// first; its images are then removed best-effort and a storage failure never
/// brings the record back.
#[utoipa::path(
    delete,
    path = "/api/cars/{id}",
    params(("id" = Uuid, Path, description = "Listing ID")),
    responses(
        (status = 200, description = "Removed", body = MessageResponse),
        (status = 401, description = "User not authorized", body = MessageResponse),
        (status = 404, description = "Car not found", body = MessageResponse)
    )
)]
pub async fn delete_car(
    identity: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = car_id(id)?;
    let existing = state.repo.get_car(id).await?.ok_or_else(car_not_found)?;
    authorize(&identity, Capability::Delete, &existing)?;

    let removed = state.repo.delete_car(id).await?.ok_or_else(car_not_found)?;
    discard_images(&state.storage, &removed.images).await;

    tracing::info!(car_id = %id, by = %identity.id, "Listing removed");
    Ok(Json(MessageResponse::new("Car listing removed")))
}

/// list_admin_cars
///
/// [Admin Route] Every listing regardless of status, newest first.
#[utoipa::path(
    get,
    path = "/api/admin/cars",
    responses((status = 200, description = "All listings", body = [Car]))
)]
pub async fn list_admin_cars(State(state): State<AppState>) -> Result<Json<Vec<Car>>, AppError> {
    Ok(Json(state.repo.list_cars(&CarFilter::default()).await?))
}
