//! Domain models for storefront.
//!
//! These types represent validated domain objects, separate from the
//! database row types in [`crate::db`].

pub mod cart;
pub mod product;
pub mod session;
pub mod user;

pub use cart::{Cart, CartItem, CartLine, ShoppingCart};
pub use product::{NewProduct, Product};
pub use session::{CurrentUser, keys as session_keys};
pub use user::User;
