use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Moderation endpoints. The whole router sits behind `admin_middleware`,
/// which authenticates the caller and requires `role == admin` before any
/// handler runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(handlers::list_users))
        // PUT /api/users/{id}
        // Only `status` is accepted; suspending an account also invalidates its outstanding tokens.
        .route("/api/users/{id}", put(handlers::update_user_status))
        .route("/api/admin/cars", get(handlers::list_admin_cars))
}
