//! Cart domain types.
//!
//! A [`Cart`] is the persisted entity; a [`ShoppingCart`] is the read model
//! handed to callers, with `size` and `subtotal` derived from the items each
//! time it is built.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use flowmazon_core::{CartId, CartItemId, ProductId, Quantity, UserId};

use super::Product;

/// A persisted cart.
///
/// `user_id` is `None` for anonymous carts, which are only reachable through
/// the `localCartId` cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line joined with its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product: Product,
    pub quantity: Quantity,
}

impl CartItem {
    /// Price of this line (`quantity * price`).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price.times(self.quantity)
    }
}

/// A product/quantity pair without identity, as written by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

impl From<&CartItem> for CartLine {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product.id,
            quantity: item.quantity,
        }
    }
}

/// A cart with its items and derived totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingCart {
    #[serde(flatten)]
    cart: Cart,
    items: Vec<CartItem>,
    size: u64,
    subtotal: Decimal,
}

impl ShoppingCart {
    /// Build the read model, computing `size` and `subtotal` from `items`.
    #[must_use]
    pub fn new(cart: Cart, items: Vec<CartItem>) -> Self {
        let size = items
            .iter()
            .map(|item| u64::from(item.quantity.get().unsigned_abs()))
            .sum();
        let subtotal = items.iter().map(CartItem::line_total).sum();

        Self {
            cart,
            items,
            size,
            subtotal,
        }
    }

    /// A freshly created cart with no items.
    #[must_use]
    pub fn empty(cart: Cart) -> Self {
        Self::new(cart, Vec::new())
    }

    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    #[must_use]
    pub const fn id(&self) -> CartId {
        self.cart.id
    }

    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        self.cart.user_id
    }

    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.cart.user_id.is_none()
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Total number of units across all lines.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Sum of `quantity * price` across all lines.
    #[must_use]
    pub const fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    /// The line for `product_id`, if the product is in the cart.
    #[must_use]
    pub fn item_for(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product.id == product_id)
    }

    /// The cart contents as product/quantity pairs.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.items.iter().map(CartLine::from).collect()
    }
}
