//! Storage seam for the cart service.
//!
//! [`crate::db::CartRepository`] is the `PostgreSQL` implementation; tests
//! use an in-memory store with failure injection.

use std::future::Future;

use flowmazon_core::{CartId, CartItemId, ProductId, Quantity, UserId};

use crate::db::RepositoryError;
use crate::models::{Cart, CartLine, ShoppingCart};

/// Where merged lines end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeTarget {
    /// Replace the lines of the user's existing cart.
    Existing(CartId),
    /// Create a new cart owned by the user.
    NewCart,
}

/// Everything [`CartStore::apply_merge`] writes, computed up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub anonymous_cart_id: CartId,
    pub user_id: UserId,
    pub target: MergeTarget,
    pub lines: Vec<CartLine>,
}

/// Cart persistence operations used by [`super::CartService`].
///
/// Every method is a single unit of work: item writes also bump the owning
/// cart's `updated_at`, and [`CartStore::apply_merge`] is all-or-nothing.
pub trait CartStore: Send + Sync {
    /// Load a cart with its items and products by id, regardless of owner.
    fn find_by_id(
        &self,
        cart_id: CartId,
    ) -> impl Future<Output = Result<Option<ShoppingCart>, RepositoryError>> + Send;

    /// Load the cart owned by `user_id`.
    fn find_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<ShoppingCart>, RepositoryError>> + Send;

    /// Create an empty cart. Fails with `Conflict` if `owner` already has one.
    fn create(
        &self,
        owner: Option<UserId>,
    ) -> impl Future<Output = Result<Cart, RepositoryError>> + Send;

    /// Add a line, or replace the quantity of the product's existing line.
    ///
    /// Fails with `NotFound` if the product does not exist and with
    /// `Conflict` if the cart no longer exists.
    fn insert_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Replace the quantity of an existing line.
    fn update_item_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Remove a line. Returns whether a row was deleted.
    fn delete_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Apply a merge atomically and return the id of the user's cart.
    ///
    /// Fails with `NotFound` (and writes nothing) if the anonymous cart is
    /// gone or has been claimed by a user in the meantime.
    fn apply_merge(
        &self,
        plan: &MergePlan,
    ) -> impl Future<Output = Result<CartId, RepositoryError>> + Send;
}
