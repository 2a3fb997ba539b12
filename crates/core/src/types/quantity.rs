//! Cart line quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A strictly positive item quantity.
///
/// A cart line with quantity zero does not exist: setting a line to zero
/// removes it. `Quantity::new` therefore returns `None` for anything below one.
///
/// ```
/// use flowmazon_core::Quantity;
///
/// assert!(Quantity::new(0).is_none());
/// assert_eq!(Quantity::new(2).map(Quantity::get), Some(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Quantity(i32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Create a quantity, or `None` if `value < 1`.
    #[must_use]
    pub const fn new(value: i32) -> Option<Self> {
        if value >= 1 { Some(Self(value)) } else { None }
    }

    /// The raw value (always >= 1).
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Add two quantities, clamping at `i32::MAX`.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i32> for Quantity {
    type Error = &'static str;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or("quantity must be at least 1")
    }
}

impl From<Quantity> for i32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}
