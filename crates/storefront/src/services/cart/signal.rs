//! Cart view invalidation signal.
//!
//! Cart reads always go to the store and derive `size` and `subtotal` from
//! the rows they load; nothing here holds cart data. Every write publishes
//! the key of the cart it touched so whatever renders a cart view can mark
//! it stale.

use tokio::sync::broadcast;

use flowmazon_core::{CartId, UserId};

use crate::models::ShoppingCart;

/// Invalidations buffered per subscriber before the oldest are dropped.
const SIGNAL_CAPACITY: usize = 256;

/// Which cart view went stale.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CartKey {
    /// The cart owned by a user.
    User(UserId),
    /// An anonymous cart reached through the cookie.
    Anonymous(CartId),
}

impl CartKey {
    /// The key naming `cart`.
    #[must_use]
    pub const fn for_cart(cart: &ShoppingCart) -> Self {
        match cart.user_id() {
            Some(user_id) => Self::User(user_id),
            None => Self::Anonymous(cart.id()),
        }
    }
}

/// Broadcasts the keys of carts whose views are stale.
#[derive(Debug, Clone)]
pub struct CartViewSignal {
    sender: broadcast::Sender<CartKey>,
}

impl CartViewSignal {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { sender }
    }

    /// Receive every key invalidated from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartKey> {
        self.sender.subscribe()
    }

    /// Mark the view for `key` stale.
    pub fn invalidate(&self, key: CartKey) {
        tracing::debug!(?key, "Cart view invalidated");
        // Having no subscribers is not an error.
        let _ = self.sender.send(key);
    }
}

impl Default for CartViewSignal {
    fn default() -> Self {
        Self::new()
    }
}
