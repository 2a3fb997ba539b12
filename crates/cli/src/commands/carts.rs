//! Cart maintenance commands.
//!
//! Anonymous carts are created on a visitor's first add and only go away
//! when merged at login, so abandoned ones accumulate. `prune` removes
//! those whose last item write is older than the cutoff.

use chrono::{Duration, Utc};
use tracing::info;

use flowmazon_storefront::db::{self, CartRepository};

/// Default age, in days, after which an anonymous cart is pruned.
pub const DEFAULT_PRUNE_DAYS: u32 = 30;

/// Delete anonymous carts not modified in the last `older_than_days` days.
///
/// # Errors
///
/// Returns an error if the database URL is missing or the delete fails.
pub async fn prune(older_than_days: u32) -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url()?;
    let pool = db::create_pool(&database_url).await?;

    let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
    info!(%cutoff, "Pruning anonymous carts");

    let deleted = CartRepository::new(&pool).prune_anonymous(cutoff).await?;
    info!(deleted, "Prune complete");

    Ok(())
}
