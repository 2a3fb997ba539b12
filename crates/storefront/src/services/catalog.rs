//! Product catalog service.
//!
//! Newest-first paginated listing, product lookup, and product creation
//! from the add-product form.

use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use flowmazon_core::ProductId;

use crate::db::{ProductRepository, RepositoryError};
use crate::models::product::ProductValidationError;
use crate::models::{NewProduct, Product};

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum ProductError {
    #[error(transparent)]
    Validation(#[from] ProductValidationError),

    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One page of the product listing.
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub current_page: u32,
    pub total_pages: u32,
    pub products: Vec<Product>,
}

/// Page arithmetic for a listing of `total` products.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub current_page: u32,
    pub total_pages: u32,
    pub limit: i64,
    pub offset: i64,
}

impl PageWindow {
    /// Compute the window for `requested` (1-based, clamped to at least 1).
    #[must_use]
    pub fn new(requested: Option<u32>, per_page: u32, total: i64) -> Self {
        let per_page = per_page.max(1);
        let current_page = requested.unwrap_or(1).max(1);
        let total = u64::try_from(total).unwrap_or(0);
        let total_pages = u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX);

        Self {
            current_page,
            total_pages,
            limit: i64::from(per_page),
            offset: i64::from(current_page - 1) * i64::from(per_page),
        }
    }
}

/// Maximum number of cached products.
const MAX_CACHED_PRODUCTS: u64 = 10_000;

/// Product lookups by id.
///
/// Products are never edited after creation, so an entry only leaves the
/// cache by TTL or capacity.
#[derive(Clone)]
pub struct ProductCache {
    inner: Cache<ProductId, Product>,
}

impl ProductCache {
    /// Create a cache whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(MAX_CACHED_PRODUCTS)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, id: ProductId) -> Option<Product> {
        self.inner.get(&id).await
    }

    pub async fn insert(&self, product: Product) {
        self.inner.insert(product.id, product).await;
    }
}

/// Catalog operations.
pub struct CatalogService<'a> {
    products: ProductRepository<'a>,
    cache: &'a ProductCache,
    per_page: u32,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, cache: &'a ProductCache, per_page: u32) -> Self {
        Self {
            products: ProductRepository::new(pool),
            cache,
            per_page,
        }
    }

    /// A page of products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Repository` if the database fails.
    pub async fn list_page(&self, page: Option<u32>) -> Result<ProductPage, ProductError> {
        let total = self.products.count().await?;
        let window = PageWindow::new(page, self.per_page, total);
        let products = self
            .products
            .list_newest(window.limit, window.offset)
            .await?;

        Ok(ProductPage {
            current_page: window.current_page,
            total_pages: window.total_pages,
            products,
        })
    }

    /// A single product.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::NotFound` if no product has this id.
    pub async fn get(&self, id: ProductId) -> Result<Product, ProductError> {
        if let Some(product) = self.cache.get(id).await {
            return Ok(product);
        }

        let product = self
            .products
            .get_by_id(id)
            .await?
            .ok_or(ProductError::NotFound(id))?;
        self.cache.insert(product.clone()).await;
        Ok(product)
    }

    /// Create a product from validated input.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Repository` if the insert fails.
    pub async fn add_product(&self, product: &NewProduct) -> Result<Product, ProductError> {
        let product = self.products.create(product).await?;
        info!(product_id = %product.id, name = %product.name, "Created product");
        self.cache.insert(product.clone()).await;
        Ok(product)
    }
}
