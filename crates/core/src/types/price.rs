//! Type-safe product price using decimal arithmetic.
//!
//! The shop sells in a single currency, so a [`Price`] is just a validated
//! positive amount with at most two decimal places.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Quantity;

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input is not a decimal number.
    #[error("price must be a number")]
    NotANumber,
    /// The amount is zero or negative.
    #[error("price must be greater than zero")]
    NotPositive,
    /// The amount has sub-cent precision.
    #[error("price must have at most {max} decimal places")]
    TooPrecise {
        /// Maximum allowed scale.
        max: u32,
    },
    /// The amount does not fit the stored `NUMERIC(12, 2)` column.
    #[error("price must be at most {}", Price::MAX_AMOUNT)]
    TooLarge,
}

/// A positive price in the shop currency.
///
/// ## Examples
///
/// ```
/// use flowmazon_core::Price;
///
/// assert!(Price::parse("19.99").is_ok());
/// assert!(Price::parse("0").is_err());
/// assert!(Price::parse("-5").is_err());
/// assert!(Price::parse("1.999").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Maximum number of decimal places.
    pub const MAX_SCALE: u32 = 2;

    /// Largest accepted amount, 9 999 999 999.99.
    pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is not positive, exceeds
    /// [`Price::MAX_AMOUNT`], or has more than two decimal places.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount <= Decimal::ZERO {
            return Err(PriceError::NotPositive);
        }
        if amount > Self::MAX_AMOUNT {
            return Err(PriceError::TooLarge);
        }
        if amount.normalize().scale() > Self::MAX_SCALE {
            return Err(PriceError::TooPrecise {
                max: Self::MAX_SCALE,
            });
        }
        Ok(Self(amount))
    }

    /// Parse a price from user input such as `"12.50"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a number or fails [`Price::new`].
    pub fn parse(s: &str) -> Result<Self, PriceError> {
        let amount = Decimal::from_str(s.trim()).map_err(|_| PriceError::NotANumber)?;
        Self::new(amount)
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units.
    #[must_use]
    pub fn times(&self, quantity: Quantity) -> Decimal {
        self.0 * Decimal::from(quantity.get())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}
