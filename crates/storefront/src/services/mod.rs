//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Email and password accounts
//! - `cart` - Cart resolution, quantity updates and the login merge
//! - `catalog` - Product listing and creation

pub mod auth;
pub mod cart;
pub mod catalog;

pub use auth::{AuthError, AuthService};
pub use cart::{CartError, CartService};
pub use catalog::{CatalogService, ProductError};
