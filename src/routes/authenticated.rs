use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Listing forms carry up to five images.
pub const LISTING_BODY_LIMIT: usize = 25 * 1024 * 1024;

/// Authenticated Router Module
///
/// Every handler here receives a verified `AuthUser`. Seller-only routes call
/// `require_role`; routes on an existing listing resolve it first (404) and
/// then call `authorize` for the owner or admin check.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/api/users/me", get(handlers::get_me))
        // GET /api/cars/seller
        // The static segment takes priority over `/api/cars/{id}` in the public router.
        .route("/api/cars/seller", get(handlers::get_seller_cars))
        .route("/api/cars", post(handlers::create_car))
        // PUT appends images; DELETE removes the record, then its images.
        .route(
            "/api/cars/{id}",
            put(handlers::update_car).delete(handlers::delete_car),
        )
        .route("/api/cars/{id}/status", put(handlers::update_car_status))
        .layer(DefaultBodyLimit::max(LISTING_BODY_LIMIT))
}
