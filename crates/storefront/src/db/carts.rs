//! Cart repository for database operations.
//!
//! Item writes run in a transaction with a bump of the owning cart's
//! `updated_at`, which is what anonymous cart pruning keys on.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use flowmazon_core::{CartId, CartItemId, ProductId, Quantity, UserId};

use super::RepositoryError;
use super::products::ProductRow;
use crate::models::{Cart, CartItem, Product, ShoppingCart};
use crate::services::cart::{CartStore, MergePlan, MergeTarget};

/// Foreign key from `cart_item` to `cart`; violated when the cart was
/// deleted (merged or pruned) after the caller resolved it.
const CART_ITEM_CART_FK: &str = "cart_item_cart_id_fkey";

#[derive(sqlx::FromRow)]
struct CartRow {
    id: CartId,
    user_id: Option<UserId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    item_id: CartItemId,
    quantity: i32,
    #[sqlx(flatten)]
    product: ProductRow,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(row.quantity).ok_or_else(|| {
            RepositoryError::DataCorruption(format!(
                "non-positive quantity {} for cart item {}",
                row.quantity, row.item_id
            ))
        })?;

        Ok(Self {
            id: row.item_id,
            product: Product::try_from(row.product)?,
            quantity,
        })
    }
}

/// Repository for carts and cart items.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Delete anonymous carts not modified since `older_than`.
    ///
    /// Returns the number of carts deleted; their items go with them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn prune_anonymous(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM storefront.cart
            WHERE user_id IS NULL AND updated_at < $1
            ",
        )
        .bind(older_than)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn with_items(&self, row: CartRow) -> Result<ShoppingCart, RepositoryError> {
        let items = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT ci.id AS item_id, ci.quantity,
                   p.id, p.name, p.description, p.image_url, p.price, p.created_at
            FROM storefront.cart_item ci
            JOIN storefront.product p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.id
            ",
        )
        .bind(row.id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(CartItem::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(ShoppingCart::new(row.into(), items))
    }
}

/// A missing cart is a `Conflict` (the caller should retry); a missing
/// product stays `NotFound`.
fn classify_item_insert(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.constraint() == Some(CART_ITEM_CART_FK) {
            return RepositoryError::Conflict("cart no longer exists".to_owned());
        }
    }
    RepositoryError::classify(err, "duplicate cart item")
}

async fn touch(conn: &mut PgConnection, cart_id: CartId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE storefront.cart SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(())
}

impl CartStore for CartRepository<'_> {
    async fn find_by_id(&self, cart_id: CartId) -> Result<Option<ShoppingCart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            SELECT id, user_id, created_at, updated_at
            FROM storefront.cart
            WHERE id = $1
            ",
        )
        .bind(cart_id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.with_items(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Option<ShoppingCart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            SELECT id, user_id, created_at, updated_at
            FROM storefront.cart
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.with_items(row).await?)),
            None => Ok(None),
        }
    }

    async fn create(&self, owner: Option<UserId>) -> Result<Cart, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            INSERT INTO storefront.cart (id, user_id)
            VALUES ($1, $2)
            RETURNING id, user_id, created_at, updated_at
            ",
        )
        .bind(CartId::generate())
        .bind(owner)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::classify(e, "user already has a cart"))?;

        Ok(row.into())
    }

    async fn insert_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO storefront.cart_item (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity.get())
        .execute(&mut *tx)
        .await
        .map_err(classify_item_insert)?;

        touch(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_item_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"
            UPDATE storefront.cart_item
            SET quantity = $3
            WHERE cart_id = $1 AND id = $2
            ",
        )
        .bind(cart_id)
        .bind(item_id)
        .bind(quantity.get())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        touch(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM storefront.cart_item WHERE cart_id = $1 AND id = $2")
            .bind(cart_id)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        touch(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_merge(&self, plan: &MergePlan) -> Result<CartId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let cart_id = match plan.target {
            MergeTarget::Existing(cart_id) => {
                sqlx::query("DELETE FROM storefront.cart_item WHERE cart_id = $1")
                    .bind(cart_id)
                    .execute(&mut *tx)
                    .await?;
                touch(&mut tx, cart_id).await?;
                cart_id
            }
            MergeTarget::NewCart => {
                let cart_id = CartId::generate();
                sqlx::query("INSERT INTO storefront.cart (id, user_id) VALUES ($1, $2)")
                    .bind(cart_id)
                    .bind(plan.user_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| RepositoryError::classify(e, "user already has a cart"))?;
                cart_id
            }
        };

        let (product_ids, quantities): (Vec<i32>, Vec<i32>) = plan
            .lines
            .iter()
            .map(|line| (line.product_id.as_i32(), line.quantity.get()))
            .unzip();

        sqlx::query(
            r"
            INSERT INTO storefront.cart_item (cart_id, product_id, quantity)
            SELECT $1, product_id, quantity
            FROM UNNEST($2::int4[], $3::int4[]) AS merged(product_id, quantity)
            ",
        )
        .bind(cart_id)
        .bind(&product_ids)
        .bind(&quantities)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::classify(e, "duplicate cart item"))?;

        // Only an unclaimed cart may be consumed; a concurrent merge or a
        // claimed cart rolls the whole transaction back.
        let deleted = sqlx::query("DELETE FROM storefront.cart WHERE id = $1 AND user_id IS NULL")
            .bind(plan.anonymous_cart_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(cart_id)
    }
}
