//! Integration tests for Flowmazon.
//!
//! These tests drive a running storefront over HTTP.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database and apply migrations
//! fm-cli migrate
//!
//! # Start the storefront
//! cargo run -p flowmazon-storefront
//!
//! # Run the ignored integration tests
//! cargo test -p flowmazon-integration-tests -- --ignored
//! ```
//!
//! `STOREFRONT_BASE_URL` overrides the default `http://localhost:3000`.

#![allow(clippy::expect_used, clippy::missing_panics_doc)]

use reqwest::{Client, StatusCode, redirect::Policy};
use serde_json::Value;
use uuid::Uuid;

/// Password used for every test account.
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Base URL for the storefront (configurable via environment).
#[must_use]
pub fn storefront_base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// A client with its own cookie jar, standing in for one browser.
///
/// Redirects are not followed so tests can inspect them.
#[must_use]
pub fn browser() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

/// A unique email address for a fresh account.
#[must_use]
pub fn unique_email() -> String {
    format!("it-{}@example.com", Uuid::new_v4().simple())
}

/// Register (and thereby sign in) a new account.
pub async fn register(client: &Client, email: &str) {
    let resp = client
        .post(format!("{}/auth/register", storefront_base_url()))
        .form(&[
            ("email", email),
            ("password", TEST_PASSWORD),
            ("password_confirm", TEST_PASSWORD),
        ])
        .send()
        .await
        .expect("Failed to register");

    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "register should redirect");
}

/// Sign in to an existing account.
pub async fn login(client: &Client, email: &str) -> StatusCode {
    client
        .post(format!("{}/auth/login", storefront_base_url()))
        .form(&[("email", email), ("password", TEST_PASSWORD)])
        .send()
        .await
        .expect("Failed to log in")
        .status()
}

/// Sign out.
pub async fn logout(client: &Client) {
    client
        .post(format!("{}/auth/logout", storefront_base_url()))
        .send()
        .await
        .expect("Failed to log out");
}

/// Create a product as a signed-in client and return its id.
///
/// The listing is newest first, so the product is looked up by its
/// unique name on the first page.
pub async fn create_product(client: &Client, price: &str) -> i64 {
    let base_url = storefront_base_url();
    let name = format!("IT product {}", Uuid::new_v4().simple());

    let resp = client
        .post(format!("{base_url}/add-product"))
        .form(&[
            ("name", name.as_str()),
            ("description", "Created by an integration test"),
            ("image_url", "https://images.example.com/it.png"),
            ("price", price),
        ])
        .send()
        .await
        .expect("Failed to add product");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "add-product should redirect");

    let page: Value = client
        .get(format!("{base_url}/products"))
        .send()
        .await
        .expect("Failed to list products")
        .json()
        .await
        .expect("Product page should be JSON");

    page["products"]
        .as_array()
        .and_then(|products| products.iter().find(|p| p["name"] == name.as_str()))
        .and_then(|p| p["id"].as_i64())
        .expect("Created product should be on the first page")
}

/// Set the quantity of a product in the client's cart.
pub async fn set_quantity(client: &Client, product_id: i64, quantity: i32) -> reqwest::Response {
    client
        .post(format!("{}/cart/quantity", storefront_base_url()))
        .form(&[
            ("product_id", product_id.to_string()),
            ("quantity", quantity.to_string()),
        ])
        .send()
        .await
        .expect("Failed to set quantity")
}

/// Fetch the client's cart as JSON.
pub async fn cart(client: &Client) -> Value {
    client
        .get(format!("{}/cart", storefront_base_url()))
        .send()
        .await
        .expect("Failed to get cart")
        .json()
        .await
        .expect("Cart should be JSON")
}

/// Quantity of `product_id` in a cart JSON, if present.
#[must_use]
pub fn quantity_of(cart: &Value, product_id: i64) -> Option<i64> {
    cart["items"]
        .as_array()?
        .iter()
        .find(|item| item["product"]["id"].as_i64() == Some(product_id))
        .and_then(|item| item["quantity"].as_i64())
}
