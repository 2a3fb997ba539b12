//! Cart route handlers.
//!
//! Cart responses are JSON views of the caller's cart. Mutations send an
//! `HX-Trigger: cart-updated` header so badges and other fragments refresh,
//! and carry a `Set-Cookie` when an anonymous cart is created.

use axum::{
    Form, Json,
    extract::State,
    response::{AppendHeaders, IntoResponse},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use flowmazon_core::ProductId;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::{LocalCartCookie, OptionalAuth};
use crate::models::{CartItem, ShoppingCart};
use crate::services::cart::{CartContext, Caller};
use crate::state::AppState;

/// Event name announced after every cart change.
const CART_UPDATED_TRIGGER: (&str, &str) = ("HX-Trigger", "cart-updated");

/// Set quantity form data.
#[derive(Debug, Deserialize)]
pub struct SetQuantityForm {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
}

/// JSON view of a cart; callers without a cart see an empty one.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CartView {
    Cart(ShoppingCart),
    Empty {
        items: [CartItem; 0],
        size: u64,
        subtotal: Decimal,
    },
}

impl From<Option<ShoppingCart>> for CartView {
    fn from(cart: Option<ShoppingCart>) -> Self {
        cart.map_or(
            Self::Empty {
                items: [],
                size: 0,
                subtotal: Decimal::ZERO,
            },
            Self::Cart,
        )
    }
}

/// Show the caller's cart.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    mut cookie: LocalCartCookie,
) -> Result<Json<CartView>> {
    let ctx = CartContext::new(Caller::from(user.as_ref()), &mut cookie);
    let cart = state.carts().get_cart(&ctx).await?;
    Ok(Json(cart.into()))
}

/// Number of units in the caller's cart (badge).
#[instrument(skip_all)]
pub async fn count(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    mut cookie: LocalCartCookie,
) -> Result<impl IntoResponse> {
    let ctx = CartContext::new(Caller::from(user.as_ref()), &mut cookie);
    let size = state
        .carts()
        .get_cart(&ctx)
        .await?
        .map_or(0, |cart| cart.size());
    Ok(Json(json!({ "count": size })))
}

/// Set the quantity of a product; `0` removes it.
#[instrument(skip(state, user, cookie))]
pub async fn set_quantity(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    mut cookie: LocalCartCookie,
    Form(form): Form<SetQuantityForm>,
) -> Result<impl IntoResponse> {
    let cart = {
        let mut ctx = CartContext::new(Caller::from(user.as_ref()), &mut cookie);
        state
            .carts()
            .set_product_quantity(&mut ctx, form.product_id, form.quantity)
            .await?
    };

    add_breadcrumb(
        "cart",
        "Set product quantity",
        &[
            ("product_id", form.product_id.to_string()),
            ("quantity", form.quantity.to_string()),
        ],
    );

    Ok((
        cookie,
        AppendHeaders([CART_UPDATED_TRIGGER]),
        Json(CartView::Cart(cart)),
    ))
}

/// Add one unit of a product (the product page button).
#[instrument(skip(state, user, cookie))]
pub async fn add(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    mut cookie: LocalCartCookie,
    Form(form): Form<AddToCartForm>,
) -> Result<impl IntoResponse> {
    let cart = {
        let carts = state.carts();
        let mut ctx = CartContext::new(Caller::from(user.as_ref()), &mut cookie);
        let current = carts
            .get_cart(&ctx)
            .await?
            .and_then(|cart| cart.item_for(form.product_id).map(|item| item.quantity.get()))
            .unwrap_or(0);
        carts
            .set_product_quantity(&mut ctx, form.product_id, current.saturating_add(1))
            .await?
    };

    Ok((
        cookie,
        AppendHeaders([CART_UPDATED_TRIGGER]),
        Json(CartView::Cart(cart)),
    ))
}
