//! Product domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use flowmazon_core::{Price, PriceError, ProductId};

/// Maximum length of a product name.
const MAX_NAME_LENGTH: usize = 200;

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub price: Price,
    pub created_at: DateTime<Utc>,
}

/// Reasons a submitted product is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductValidationError {
    /// A required field is missing or blank.
    #[error("{0} is required")]
    Missing(&'static str),

    /// The name exceeds the maximum length.
    #[error("name must be at most {MAX_NAME_LENGTH} characters")]
    NameTooLong,

    /// The image reference is not an absolute http(s) URL.
    #[error("image URL must be an absolute http(s) URL")]
    InvalidImageUrl,

    /// The price is missing, malformed, or not positive.
    #[error("invalid price: {0}")]
    Price(#[from] PriceError),
}

/// A validated product ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub image_url: Url,
    pub price: Price,
}

impl NewProduct {
    /// Validate raw form input.
    ///
    /// All fields are required; the name and description are trimmed, the
    /// image reference must be an absolute http(s) URL and the price must
    /// parse as a positive amount.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProductValidationError`] encountered.
    pub fn parse(
        name: Option<&str>,
        description: Option<&str>,
        image_url: Option<&str>,
        price: Option<&str>,
    ) -> Result<Self, ProductValidationError> {
        let name = required("name", name)?;
        let description = required("description", description)?;
        let image_url = required("image URL", image_url)?;
        let price = required("price", price)?;

        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(ProductValidationError::NameTooLong);
        }

        let image_url = Url::parse(image_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or(ProductValidationError::InvalidImageUrl)?;

        Ok(Self {
            name: name.to_owned(),
            description: description.to_owned(),
            image_url,
            price: Price::parse(price)?,
        })
    }
}

fn required<'a>(
    field: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, ProductValidationError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ProductValidationError::Missing(field))
}
