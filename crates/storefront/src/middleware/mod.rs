//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded in the span and Sentry scope)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)
//!
//! Extractors: [`OptionalAuth`] / [`RequireAuth`] read the signed-in user
//! from the session; [`LocalCartCookie`] reads and writes the anonymous cart
//! cookie.

pub mod auth;
pub mod cart_cookie;
pub mod request_id;
pub mod session;

pub use auth::{OptionalAuth, RequireAuth, clear_current_user, set_current_user};
pub use cart_cookie::LocalCartCookie;
pub use request_id::{RequestId, make_request_span, request_id_middleware};
pub use session::create_session_layer;
