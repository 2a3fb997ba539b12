//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Product listing (newest first)
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database ping)
//!
//! # Products
//! GET  /products?page=N        - Product listing
//! GET  /products/{id}          - Product detail
//! POST /add-product            - Create a product (requires auth)
//!
//! # Cart
//! GET  /cart                   - Cart view
//! GET  /cart/count             - Units in cart (badge)
//! POST /cart/quantity          - Set a product's quantity (0 removes)
//! POST /cart/add               - Add one unit of a product
//!
//! # Auth
//! POST /auth/register          - Create an account and sign in
//! POST /auth/login             - Sign in (merges the anonymous cart)
//! POST /auth/logout            - Sign out
//! ```

pub mod auth;
pub mod cart;
pub mod products;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/count", get(cart::count))
        .route("/quantity", post(cart::set_quantity))
        .route("/add", post(cart::add))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/add-product", post(products::add_product))
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/auth", auth_routes())
}
