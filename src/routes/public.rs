use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no token. Listing reads are open to every visitor;
/// registration and login are how a visitor obtains a token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .route("/api/users/register", post(handlers::register_user))
        .route("/api/users/login", post(handlers::login_user))
        // GET /api/cars?search=&brand=&condition=&status=&minPrice=&maxPrice=&minYear=&maxYear=
        .route("/api/cars", get(handlers::list_cars))
        .route("/api/cars/{id}", get(handlers::get_car))
}
