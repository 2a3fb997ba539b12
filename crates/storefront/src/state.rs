//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::CartRepository;
use crate::services::cart::CartViewSignal;
use crate::services::catalog::ProductCache;
use crate::services::{AuthService, CartService, CatalogService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    cart_views: CartViewSignal,
    products: ProductCache,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let products = ProductCache::new(config.product_cache_ttl);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                cart_views: CartViewSignal::new(),
                products,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Cart service backed by `PostgreSQL` and the shared view signal.
    #[must_use]
    pub fn carts(&self) -> CartService<'_, CartRepository<'_>> {
        CartService::new(CartRepository::new(&self.inner.pool), &self.inner.cart_views)
    }

    #[must_use]
    pub fn catalog(&self) -> CatalogService<'_> {
        CatalogService::new(
            &self.inner.pool,
            &self.inner.products,
            self.inner.config.products_per_page,
        )
    }

    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(&self.inner.pool)
    }
}
