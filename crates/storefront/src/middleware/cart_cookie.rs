//! The `localCartId` cookie.
//!
//! [`LocalCartCookie`] is extracted from the request, handed to the cart
//! service as its [`CartCookies`], and returned as a response part so any
//! change becomes a `Set-Cookie` header.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderValue,
        header::{COOKIE, SET_COOKIE},
        request::Parts,
    },
    response::{IntoResponseParts, ResponseParts},
};
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};

use flowmazon_core::CartId;

use crate::services::cart::{CartCookies, LOCAL_CART_COOKIE};
use crate::state::AppState;

/// Lifetime of the anonymous cart cookie.
const LOCAL_CART_MAX_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Set(CartId),
    Clear,
}

/// Request view of the anonymous cart cookie, plus any pending change.
#[derive(Debug, Clone)]
pub struct LocalCartCookie {
    current: Option<CartId>,
    change: Option<Change>,
    secure: bool,
}

impl LocalCartCookie {
    /// Read the cookie from request headers. Malformed ids are ignored.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, secure: bool) -> Self {
        let current = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| Cookie::split_parse(value))
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == LOCAL_CART_COOKIE)
            .and_then(|cookie| CartId::parse(cookie.value()));

        Self {
            current,
            change: None,
            secure,
        }
    }

    /// The `Set-Cookie` value for the pending change, if any.
    fn set_cookie(&self) -> Option<Cookie<'static>> {
        let (value, max_age) = match self.change? {
            Change::Set(cart_id) => (
                cart_id.to_string(),
                Duration::days(LOCAL_CART_MAX_AGE_DAYS),
            ),
            Change::Clear => (String::new(), Duration::ZERO),
        };

        Some(
            Cookie::build((LOCAL_CART_COOKIE, value))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(self.secure)
                .max_age(max_age)
                .build(),
        )
    }
}

impl CartCookies for LocalCartCookie {
    fn local_cart_id(&self) -> Option<CartId> {
        match self.change {
            Some(Change::Set(cart_id)) => Some(cart_id),
            Some(Change::Clear) => None,
            None => self.current,
        }
    }

    fn set_local_cart_id(&mut self, cart_id: CartId) {
        self.change = Some(Change::Set(cart_id));
    }

    fn clear_local_cart_id(&mut self) {
        self.change = Some(Change::Clear);
    }
}

impl FromRequestParts<AppState> for LocalCartCookie {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(
            &parts.headers,
            state.config().secure_cookies(),
        ))
    }
}

impl IntoResponseParts for LocalCartCookie {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        if let Some(cookie) = self.set_cookie() {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    res.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => tracing::error!(error = %e, "Invalid cart cookie header"),
            }
        }
        Ok(res)
    }
}
