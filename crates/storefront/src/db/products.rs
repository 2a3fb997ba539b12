//! Product repository for database operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use flowmazon_core::{Price, ProductId};

use super::RepositoryError;
use crate::models::{NewProduct, Product};

/// Columns selected for a [`ProductRow`].
const PRODUCT_COLUMNS: &str = "id, name, description, image_url, price, created_at";

#[derive(sqlx::FromRow)]
pub(super) struct ProductRow {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let price = Price::new(row.price).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid price for product {}: {e}", row.id))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            image_url: row.image_url,
            price,
            created_at: row.created_at,
        })
    }
}

/// Repository for catalog products.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Total number of products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storefront.product")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// A page of products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored price is invalid.
    pub async fn list_newest(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, RepositoryError> {
        let query = format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product \
             ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, ProductRow>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(Product::try_from)
            .collect()
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let query = format!("SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = $1");
        sqlx::query_as::<_, ProductRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    /// Insert a validated product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let query = format!(
            "INSERT INTO storefront.product (name, description, image_url, price) \
             VALUES ($1, $2, $3, $4) RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProductRow>(&query)
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.image_url.as_str())
            .bind(product.price.amount())
            .fetch_one(self.pool)
            .await?;

        Product::try_from(row)
    }
}
