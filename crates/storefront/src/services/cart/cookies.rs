//! Cookie seam for anonymous cart identity.

use flowmazon_core::CartId;

/// Name of the cookie holding the anonymous cart id.
pub const LOCAL_CART_COOKIE: &str = "localCartId";

/// Access to the client-held anonymous cart id.
///
/// Implemented over request/response headers by
/// [`crate::middleware::LocalCartCookie`].
pub trait CartCookies: Send + Sync {
    /// The anonymous cart id sent by the client, if any and well-formed.
    fn local_cart_id(&self) -> Option<CartId>;

    /// Remember `cart_id` as the client's anonymous cart.
    fn set_local_cart_id(&mut self, cart_id: CartId);

    /// Forget the anonymous cart.
    fn clear_local_cart_id(&mut self);
}
