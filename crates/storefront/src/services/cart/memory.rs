//! In-memory [`CartStore`] for service tests.
//!
//! Mirrors the `PostgreSQL` constraints that matter to the service (one cart
//! per user, one line per product, foreign keys) and can be told to fail a
//! merge at a given step to exercise rollback.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use flowmazon_core::{CartId, CartItemId, ProductId, Quantity, UserId};

use super::store::{CartStore, MergePlan, MergeTarget};
use crate::db::RepositoryError;
use crate::models::{Cart, CartItem, Product, ShoppingCart};

/// Merge step after which an injected failure is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeFailPoint {
    AfterDeletingUserItems,
    AfterInsertingMergedItems,
    AfterDeletingAnonymousCart,
}

#[derive(Debug, Clone)]
struct ItemRow {
    id: CartItemId,
    cart_id: CartId,
    product_id: ProductId,
    quantity: Quantity,
}

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    items: Vec<ItemRow>,
    next_item_id: i32,
    writes: usize,
    fail_merge_at: Option<MergeFailPoint>,
}

impl State {
    fn shopping_cart(&self, cart: &Cart) -> ShoppingCart {
        let items = self
            .items
            .iter()
            .filter(|row| row.cart_id == cart.id)
            .map(|row| CartItem {
                id: row.id,
                product: self.products[&row.product_id].clone(),
                quantity: row.quantity,
            })
            .collect();
        ShoppingCart::new(cart.clone(), items)
    }

    fn create_cart(&mut self, owner: Option<UserId>) -> Result<Cart, RepositoryError> {
        if owner.is_some() && self.carts.values().any(|c| c.user_id == owner) {
            return Err(RepositoryError::Conflict("user already has a cart".to_owned()));
        }
        let now = Utc::now();
        let cart = Cart {
            id: CartId::generate(),
            user_id: owner,
            created_at: now,
            updated_at: now,
        };
        self.carts.insert(cart.id, cart.clone());
        self.writes += 1;
        Ok(cart)
    }

    fn insert_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        if !self.carts.contains_key(&cart_id) {
            return Err(RepositoryError::Conflict("cart no longer exists".to_owned()));
        }
        if !self.products.contains_key(&product_id) {
            return Err(RepositoryError::NotFound);
        }
        self.writes += 1;

        // ON CONFLICT (cart_id, product_id) DO UPDATE
        if let Some(row) = self
            .items
            .iter_mut()
            .find(|row| row.cart_id == cart_id && row.product_id == product_id)
        {
            row.quantity = quantity;
            return Ok(());
        }

        self.next_item_id += 1;
        self.items.push(ItemRow {
            id: CartItemId::new(self.next_item_id),
            cart_id,
            product_id,
            quantity,
        });
        Ok(())
    }

    fn check(&self, step: MergeFailPoint) -> Result<(), RepositoryError> {
        if self.fail_merge_at == Some(step) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCartStore {
    state: Arc<Mutex<State>>,
}

impl MemoryCartStore {
    pub fn add_product(&self, product: Product) {
        self.state
            .lock()
            .unwrap()
            .products
            .insert(product.id, product);
    }

    /// Create a cart with `(product_id, quantity)` lines, bypassing the write counter.
    pub fn seed_cart(&self, owner: Option<UserId>, lines: &[(i32, i32)]) -> CartId {
        let mut state = self.state.lock().unwrap();
        let cart = state.create_cart(owner).unwrap();
        for &(product_id, quantity) in lines {
            state
                .insert_item(
                    cart.id,
                    ProductId::new(product_id),
                    Quantity::new(quantity).unwrap(),
                )
                .unwrap();
        }
        state.writes = 0;
        cart.id
    }

    /// Number of mutating statements executed since seeding.
    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn fail_merge_at(&self, step: MergeFailPoint) {
        self.state.lock().unwrap().fail_merge_at = Some(step);
    }

    /// Delete a cart and its lines, as a concurrent merge or prune would.
    pub fn remove_cart(&self, cart_id: CartId) {
        let mut state = self.state.lock().unwrap();
        state.carts.remove(&cart_id);
        state.items.retain(|row| row.cart_id != cart_id);
    }

    pub fn cart_exists(&self, cart_id: CartId) -> bool {
        self.state.lock().unwrap().carts.contains_key(&cart_id)
    }

    pub fn cart_of(&self, user_id: UserId) -> Option<CartId> {
        let state = self.state.lock().unwrap();
        state
            .carts
            .values()
            .find(|c| c.user_id == Some(user_id))
            .map(|c| c.id)
    }

    /// `(product_id, quantity)` lines of a cart, sorted by product.
    pub fn lines_of(&self, cart_id: CartId) -> Vec<(i32, i32)> {
        let state = self.state.lock().unwrap();
        let mut lines: Vec<(i32, i32)> = state
            .items
            .iter()
            .filter(|row| row.cart_id == cart_id)
            .map(|row| (row.product_id.as_i32(), row.quantity.get()))
            .collect();
        lines.sort_unstable();
        lines
    }
}

impl CartStore for MemoryCartStore {
    async fn find_by_id(&self, cart_id: CartId) -> Result<Option<ShoppingCart>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.carts.get(&cart_id).map(|cart| state.shopping_cart(cart)))
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Option<ShoppingCart>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .carts
            .values()
            .find(|cart| cart.user_id == Some(user_id))
            .map(|cart| state.shopping_cart(cart)))
    }

    async fn create(&self, owner: Option<UserId>) -> Result<Cart, RepositoryError> {
        self.state.lock().unwrap().create_cart(owner)
    }

    async fn insert_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .unwrap()
            .insert_item(cart_id, product_id, quantity)
    }

    async fn update_item_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let row = state
            .items
            .iter_mut()
            .find(|row| row.id == item_id && row.cart_id == cart_id)
            .ok_or(RepositoryError::NotFound)?;
        row.quantity = quantity;
        state.writes += 1;
        Ok(())
    }

    async fn delete_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let before = state.items.len();
        state
            .items
            .retain(|row| !(row.id == item_id && row.cart_id == cart_id));
        state.writes += 1;
        Ok(state.items.len() < before)
    }

    async fn apply_merge(&self, plan: &MergePlan) -> Result<CartId, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        // Work on a copy and swap it in only when every step succeeded.
        let mut tx = state.clone();

        let cart_id = match plan.target {
            MergeTarget::Existing(cart_id) => {
                tx.items.retain(|row| row.cart_id != cart_id);
                tx.writes += 1;
                cart_id
            }
            MergeTarget::NewCart => tx.create_cart(Some(plan.user_id))?.id,
        };
        tx.check(MergeFailPoint::AfterDeletingUserItems)?;

        for line in &plan.lines {
            tx.insert_item(cart_id, line.product_id, line.quantity)?;
        }
        tx.check(MergeFailPoint::AfterInsertingMergedItems)?;

        let anonymous = tx
            .carts
            .get(&plan.anonymous_cart_id)
            .filter(|cart| cart.user_id.is_none())
            .ok_or(RepositoryError::NotFound)?
            .id;
        tx.carts.remove(&anonymous);
        tx.items.retain(|row| row.cart_id != anonymous);
        tx.writes += 1;
        tx.check(MergeFailPoint::AfterDeletingAnonymousCart)?;

        *state = tx;
        Ok(cart_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cart::fixtures::product;

    #[tokio::test]
    async fn test_insert_existing_product_replaces_line() {
        let store = MemoryCartStore::default();
        store.add_product(product(1, "3"));
        let cart_id = store.seed_cart(None, &[(1, 2)]);

        store
            .insert_item(cart_id, ProductId::new(1), Quantity::new(7).unwrap())
            .await
            .unwrap();

        assert_eq!(store.lines_of(cart_id), vec![(1, 7)]);
    }

    #[tokio::test]
    async fn test_insert_reports_missing_cart_and_product_apart() {
        let store = MemoryCartStore::default();
        store.add_product(product(1, "3"));
        let cart_id = store.seed_cart(None, &[]);

        let missing_product = store
            .insert_item(cart_id, ProductId::new(9), Quantity::ONE)
            .await;
        assert!(matches!(missing_product, Err(RepositoryError::NotFound)));

        let missing_cart = store
            .insert_item(CartId::generate(), ProductId::new(1), Quantity::ONE)
            .await;
        assert!(matches!(missing_cart, Err(RepositoryError::Conflict(_))));
    }
}
