//! User domain types.

use chrono::{DateTime, Utc};

use flowmazon_core::{Email, UserId};

/// A storefront user (domain type).
///
/// Users are created on registration. An account does not own a cart until
/// the user first changes a quantity or logs in with an anonymous cart.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}
