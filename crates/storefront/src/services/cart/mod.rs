//! Cart service.
//!
//! Resolves the caller's cart (user-owned for signed-in users, cookie-bound
//! for anonymous visitors), sets line quantities, and merges an anonymous
//! cart into the user's cart when they sign in.
//!
//! # Merge
//!
//! On login the anonymous cart named by the `localCartId` cookie is folded
//! into the user's cart: quantities of shared products are added, the
//! anonymous cart is deleted and the cookie is cleared. The writes happen in
//! one transaction ([`CartStore::apply_merge`]); the cookie is only cleared
//! after the transaction commits.

mod cookies;
#[cfg(test)]
mod memory;
mod signal;
mod store;

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use thiserror::Error;
use tracing::{debug, info, instrument};

use flowmazon_core::{CartId, ProductId, Quantity, UserId};

use crate::db::RepositoryError;
use crate::models::{CartLine, CurrentUser, ShoppingCart};

pub use signal::{CartKey, CartViewSignal};
pub use cookies::{CartCookies, LOCAL_CART_COOKIE};
pub use store::{CartStore, MergePlan, MergeTarget};

/// Who is asking for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(UserId),
}

impl From<Option<&CurrentUser>> for Caller {
    fn from(user: Option<&CurrentUser>) -> Self {
        user.map_or(Self::Anonymous, |user| Self::User(user.id))
    }
}

/// Per-request cart context: the caller plus access to the cart cookie.
pub struct CartContext<'c> {
    caller: Caller,
    cookies: &'c mut dyn CartCookies,
}

impl<'c> CartContext<'c> {
    pub fn new(caller: Caller, cookies: &'c mut dyn CartCookies) -> Self {
        Self { caller, cookies }
    }

    #[must_use]
    pub const fn caller(&self) -> Caller {
        self.caller
    }

    fn local_cart_id(&self) -> Option<CartId> {
        self.cookies.local_cart_id()
    }
}

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantities below zero are rejected.
    #[error("quantity must not be negative, got {0}")]
    InvalidQuantity(i32),

    /// The product does not exist.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of [`CartService::merge_anonymous_cart_into_user_cart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No cookie, or the cookie did not name an anonymous cart.
    NothingToMerge,
    /// The anonymous cart was folded into `cart_id`.
    Merged { cart_id: CartId, lines: usize },
}

/// Combine line lists into one line per product.
///
/// Quantities of the same product are added (saturating at `i32::MAX`).
/// Products keep the position of their first occurrence.
#[must_use]
pub fn merge_cart_items<'l>(sources: impl IntoIterator<Item = &'l [CartLine]>) -> Vec<CartLine> {
    let mut merged: Vec<CartLine> = Vec::new();
    let mut positions: HashMap<ProductId, usize> = HashMap::new();

    for line in sources.into_iter().flatten() {
        match positions.entry(line.product_id) {
            Entry::Occupied(entry) => {
                if let Some(existing) = merged.get_mut(*entry.get()) {
                    existing.quantity = existing.quantity.saturating_add(line.quantity);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(merged.len());
                merged.push(*line);
            }
        }
    }

    merged
}

/// Cart operations over a [`CartStore`], signalling stale views after writes.
///
/// Every read loads the cart from the store, so totals always reflect the
/// committed rows, including writes from other processes.
pub struct CartService<'a, S> {
    store: S,
    views: &'a CartViewSignal,
}

impl<'a, S: CartStore> CartService<'a, S> {
    #[must_use]
    pub const fn new(store: S, views: &'a CartViewSignal) -> Self {
        Self { store, views }
    }

    /// The caller's current cart, if they have one.
    ///
    /// Signed-in users get their own cart and the cookie is ignored.
    /// Anonymous callers get the cart named by the cookie, unless that cart
    /// has since been claimed by a user.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    #[instrument(skip_all, fields(caller = ?ctx.caller()))]
    pub async fn get_cart(&self, ctx: &CartContext<'_>) -> Result<Option<ShoppingCart>, CartError> {
        let key = match ctx.caller() {
            Caller::User(user_id) => CartKey::User(user_id),
            Caller::Anonymous => match ctx.local_cart_id() {
                Some(cart_id) => CartKey::Anonymous(cart_id),
                None => return Ok(None),
            },
        };
        self.load(key).await
    }

    /// Create an empty cart for the caller.
    ///
    /// Anonymous carts are remembered in the cookie. If a concurrent request
    /// already created the user's cart, that cart is returned.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    #[instrument(skip_all, fields(caller = ?ctx.caller()))]
    pub async fn create_cart(&self, ctx: &mut CartContext<'_>) -> Result<ShoppingCart, CartError> {
        match ctx.caller() {
            Caller::User(user_id) => match self.store.create(Some(user_id)).await {
                Ok(cart) => {
                    info!(cart_id = %cart.id, %user_id, "Created user cart");
                    Ok(ShoppingCart::empty(cart))
                }
                Err(RepositoryError::Conflict(reason)) => self
                    .store
                    .find_by_user(user_id)
                    .await?
                    .ok_or(CartError::Repository(RepositoryError::Conflict(reason))),
                Err(e) => Err(e.into()),
            },
            Caller::Anonymous => {
                let cart = self.store.create(None).await?;
                ctx.cookies.set_local_cart_id(cart.id);
                info!(cart_id = %cart.id, "Created anonymous cart");
                Ok(ShoppingCart::empty(cart))
            }
        }
    }

    /// The caller's cart, creating one if needed.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn resolve_or_create_cart(
        &self,
        ctx: &mut CartContext<'_>,
    ) -> Result<ShoppingCart, CartError> {
        match self.get_cart(ctx).await? {
            Some(cart) => Ok(cart),
            None => self.create_cart(ctx).await,
        }
    }

    /// Set the quantity of `product_id` in the caller's cart.
    ///
    /// The quantity replaces the current one; `0` removes the line. Setting
    /// `0` for a product not in the cart writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for negative quantities (before
    /// touching storage), `CartError::ProductNotFound` for unknown products,
    /// and `CartError::Repository` if the store fails, with `Conflict` when
    /// the cart was merged or pruned after it was resolved.
    #[instrument(skip(self, ctx), fields(caller = ?ctx.caller()))]
    pub async fn set_product_quantity(
        &self,
        ctx: &mut CartContext<'_>,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<ShoppingCart, CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }

        let cart = self.resolve_or_create_cart(ctx).await?;
        let existing = cart.item_for(product_id).map(|item| item.id);

        match (existing, Quantity::new(quantity)) {
            (Some(item_id), Some(quantity)) => {
                match self
                    .store
                    .update_item_quantity(cart.id(), item_id, quantity)
                    .await
                {
                    // The line was removed by another request since we read the cart.
                    Err(RepositoryError::NotFound) => {
                        self.insert_item(cart.id(), product_id, quantity).await?;
                    }
                    other => other?,
                }
            }
            (Some(item_id), None) => {
                self.store.delete_item(cart.id(), item_id).await?;
            }
            (None, Some(quantity)) => {
                self.insert_item(cart.id(), product_id, quantity).await?;
            }
            (None, None) => {
                debug!("Product not in cart, nothing to remove");
                return Ok(cart);
            }
        }

        let key = CartKey::for_cart(&cart);
        self.views.invalidate(key);
        Ok(self
            .load(key)
            .await?
            .unwrap_or_else(|| ShoppingCart::empty(cart.cart().clone())))
    }

    /// Fold the cookie's anonymous cart into `user_id`'s cart.
    ///
    /// Lines for the same product are combined by adding quantities. If the
    /// user has no cart, a new one is created with the anonymous lines. The
    /// anonymous cart is deleted and the cookie cleared only after all
    /// writes have committed; on failure nothing changes.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails, including
    /// `NotFound` when the anonymous cart was merged by a concurrent request.
    #[instrument(skip(self, ctx))]
    pub async fn merge_anonymous_cart_into_user_cart(
        &self,
        ctx: &mut CartContext<'_>,
        user_id: UserId,
    ) -> Result<MergeOutcome, CartError> {
        let Some(anonymous_cart_id) = ctx.local_cart_id() else {
            debug!("No anonymous cart cookie");
            return Ok(MergeOutcome::NothingToMerge);
        };

        let Some(anonymous) = self
            .store
            .find_by_id(anonymous_cart_id)
            .await?
            .filter(ShoppingCart::is_anonymous)
        else {
            debug!(%anonymous_cart_id, "Cookie does not name an anonymous cart");
            return Ok(MergeOutcome::NothingToMerge);
        };

        let user_cart = self.store.find_by_user(user_id).await?;
        let anonymous_lines = anonymous.lines();
        let user_lines = user_cart.as_ref().map(ShoppingCart::lines).unwrap_or_default();

        let plan = MergePlan {
            anonymous_cart_id,
            user_id,
            target: user_cart
                .as_ref()
                .map_or(MergeTarget::NewCart, |cart| MergeTarget::Existing(cart.id())),
            lines: merge_cart_items([anonymous_lines.as_slice(), user_lines.as_slice()]),
        };

        let cart_id = self.store.apply_merge(&plan).await?;

        ctx.cookies.clear_local_cart_id();
        self.views.invalidate(CartKey::Anonymous(anonymous_cart_id));
        self.views.invalidate(CartKey::User(user_id));

        info!(
            %user_id,
            %cart_id,
            %anonymous_cart_id,
            lines = plan.lines.len(),
            "Merged anonymous cart into user cart"
        );

        Ok(MergeOutcome::Merged {
            cart_id,
            lines: plan.lines.len(),
        })
    }

    async fn insert_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), CartError> {
        self.store
            .insert_item(cart_id, product_id, quantity)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => CartError::ProductNotFound(product_id),
                other => CartError::Repository(other),
            })
    }

    async fn load(&self, key: CartKey) -> Result<Option<ShoppingCart>, CartError> {
        let cart = match key {
            CartKey::User(user_id) => self.store.find_by_user(user_id).await?,
            CartKey::Anonymous(cart_id) => self
                .store
                .find_by_id(cart_id)
                .await?
                .filter(ShoppingCart::is_anonymous),
        };
        Ok(cart)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use flowmazon_core::CartItemId;
    use rust_decimal::Decimal;
    use tokio::sync::Notify;

    use super::memory::{MemoryCartStore, MergeFailPoint};
    use super::*;
    use crate::models::Cart;
    use crate::models::cart::fixtures::product;

    const A: i32 = 1;
    const B: i32 = 2;
    const C: i32 = 3;

    #[derive(Debug, Default)]
    struct TestCookies {
        value: Option<CartId>,
    }

    impl TestCookies {
        fn with(cart_id: CartId) -> Self {
            Self {
                value: Some(cart_id),
            }
        }
    }

    impl CartCookies for TestCookies {
        fn local_cart_id(&self) -> Option<CartId> {
            self.value
        }

        fn set_local_cart_id(&mut self, cart_id: CartId) {
            self.value = Some(cart_id);
        }

        fn clear_local_cart_id(&mut self) {
            self.value = None;
        }
    }

    fn store() -> MemoryCartStore {
        let store = MemoryCartStore::default();
        store.add_product(product(A, "10"));
        store.add_product(product(B, "5"));
        store.add_product(product(C, "2.50"));
        store
    }

    fn views() -> CartViewSignal {
        CartViewSignal::new()
    }

    fn user() -> UserId {
        UserId::new(42)
    }

    fn line(product_id: i32, quantity: i32) -> CartLine {
        CartLine {
            product_id: ProductId::new(product_id),
            quantity: Quantity::new(quantity).unwrap(),
        }
    }

    #[test]
    fn test_merge_cart_items_adds_shared_products() {
        let merged = merge_cart_items([
            [line(A, 2), line(C, 1)].as_slice(),
            [line(B, 3), line(A, 1)].as_slice(),
        ]);

        assert_eq!(merged, vec![line(A, 3), line(C, 1), line(B, 3)]);
    }

    #[test]
    fn test_merge_cart_items_saturates() {
        let merged = merge_cart_items([[line(A, i32::MAX)].as_slice(), [line(A, 5)].as_slice()]);
        assert_eq!(merged, vec![line(A, i32::MAX)]);
    }

    #[test]
    fn test_merge_cart_items_empty_inputs() {
        let none: &[CartLine] = &[];
        assert!(merge_cart_items([none, none]).is_empty());
        assert_eq!(
            merge_cart_items([none, [line(B, 1)].as_slice()]),
            vec![line(B, 1)]
        );
    }

    #[tokio::test]
    async fn test_anonymous_without_cookie_has_no_cart() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let mut cookies = TestCookies::default();
        let ctx = CartContext::new(Caller::Anonymous, &mut cookies);

        assert_eq!(service.get_cart(&ctx).await.unwrap(), None);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_cookie_for_missing_or_owned_cart_is_ignored() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);

        let mut cookies = TestCookies::with(CartId::generate());
        let ctx = CartContext::new(Caller::Anonymous, &mut cookies);
        assert_eq!(service.get_cart(&ctx).await.unwrap(), None);

        let owned = store.seed_cart(Some(user()), &[(A, 1)]);
        let mut cookies = TestCookies::with(owned);
        let ctx = CartContext::new(Caller::Anonymous, &mut cookies);
        assert_eq!(service.get_cart(&ctx).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_user_cart_ignores_cookie() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let anonymous = store.seed_cart(None, &[(A, 1)]);
        let owned = store.seed_cart(Some(user()), &[(B, 2)]);

        let mut cookies = TestCookies::with(anonymous);
        let ctx = CartContext::new(Caller::User(user()), &mut cookies);
        let cart = service.get_cart(&ctx).await.unwrap().unwrap();

        assert_eq!(cart.id(), owned);
        assert_eq!(cart.size(), 2);
    }

    #[tokio::test]
    async fn test_cart_totals_are_derived_from_items() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let cart_id = store.seed_cart(None, &[(A, 2), (B, 1)]);

        let mut cookies = TestCookies::with(cart_id);
        let ctx = CartContext::new(Caller::Anonymous, &mut cookies);
        let cart = service.get_cart(&ctx).await.unwrap().unwrap();

        assert_eq!(cart.size(), 3);
        assert_eq!(cart.subtotal(), Decimal::from(25));
    }

    #[tokio::test]
    async fn test_first_add_creates_anonymous_cart_and_sets_cookie() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let mut cookies = TestCookies::default();

        let cart = {
            let mut ctx = CartContext::new(Caller::Anonymous, &mut cookies);
            service
                .set_product_quantity(&mut ctx, ProductId::new(A), 2)
                .await
                .unwrap()
        };

        assert!(cart.is_anonymous());
        assert_eq!(cookies.value, Some(cart.id()));
        assert_eq!(store.lines_of(cart.id()), vec![(A, 2)]);
        assert_eq!(cart.size(), 2);
    }

    #[tokio::test]
    async fn test_user_first_add_creates_owned_cart_without_cookie() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let mut cookies = TestCookies::default();

        let cart = {
            let mut ctx = CartContext::new(Caller::User(user()), &mut cookies);
            service
                .set_product_quantity(&mut ctx, ProductId::new(B), 1)
                .await
                .unwrap()
        };

        assert_eq!(cart.user_id(), Some(user()));
        assert_eq!(store.cart_of(user()), Some(cart.id()));
        assert_eq!(cookies.value, None);
    }

    #[tokio::test]
    async fn test_set_quantity_replaces_and_zero_removes() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let cart_id = store.seed_cart(None, &[(A, 2), (B, 1)]);
        let mut cookies = TestCookies::with(cart_id);
        let mut ctx = CartContext::new(Caller::Anonymous, &mut cookies);

        let cart = service
            .set_product_quantity(&mut ctx, ProductId::new(A), 5)
            .await
            .unwrap();
        assert_eq!(store.lines_of(cart_id), vec![(A, 5), (B, 1)]);
        assert_eq!(cart.size(), 6);

        let cart = service
            .set_product_quantity(&mut ctx, ProductId::new(B), 0)
            .await
            .unwrap();
        assert_eq!(store.lines_of(cart_id), vec![(A, 5)]);
        assert_eq!(cart.subtotal(), Decimal::from(50));
    }

    #[tokio::test]
    async fn test_zero_for_absent_product_writes_nothing() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let cart_id = store.seed_cart(None, &[(A, 2)]);
        let mut cookies = TestCookies::with(cart_id);
        let mut ctx = CartContext::new(Caller::Anonymous, &mut cookies);

        let before = service.get_cart(&ctx).await.unwrap().unwrap();
        let after = service
            .set_product_quantity(&mut ctx, ProductId::new(C), 0)
            .await
            .unwrap();

        assert_eq!(store.writes(), 0);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_negative_quantity_rejected_before_storage() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let mut cookies = TestCookies::default();

        {
            let mut ctx = CartContext::new(Caller::Anonymous, &mut cookies);
            let err = service
                .set_product_quantity(&mut ctx, ProductId::new(A), -1)
                .await
                .unwrap_err();
            assert!(matches!(err, CartError::InvalidQuantity(-1)));
        }

        assert_eq!(store.writes(), 0);
        assert_eq!(cookies.value, None);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let mut cookies = TestCookies::default();
        let mut ctx = CartContext::new(Caller::Anonymous, &mut cookies);

        let err = service
            .set_product_quantity(&mut ctx, ProductId::new(999), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(id) if id == ProductId::new(999)));
    }

    #[tokio::test]
    async fn test_writes_signal_stale_view() {
        let store = store();
        let views = views();
        let mut stale = views.subscribe();
        let service = CartService::new(store.clone(), &views);
        let cart_id = store.seed_cart(None, &[(A, 1)]);
        let mut cookies = TestCookies::with(cart_id);
        let mut ctx = CartContext::new(Caller::Anonymous, &mut cookies);

        assert_eq!(service.get_cart(&ctx).await.unwrap().unwrap().size(), 1);
        service
            .set_product_quantity(&mut ctx, ProductId::new(A), 4)
            .await
            .unwrap();

        assert_eq!(stale.try_recv().unwrap(), CartKey::Anonymous(cart_id));
        assert_eq!(service.get_cart(&ctx).await.unwrap().unwrap().size(), 4);
    }

    #[tokio::test]
    async fn test_reads_see_writes_from_outside_the_service() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let cart_id = store.seed_cart(Some(user()), &[(A, 1)]);
        let mut cookies = TestCookies::default();
        let ctx = CartContext::new(Caller::User(user()), &mut cookies);

        assert_eq!(service.get_cart(&ctx).await.unwrap().unwrap().size(), 1);
        store
            .insert_item(cart_id, ProductId::new(B), Quantity::new(2).unwrap())
            .await
            .unwrap();
        assert_eq!(service.get_cart(&ctx).await.unwrap().unwrap().size(), 3);

        store.remove_cart(cart_id);
        assert_eq!(service.get_cart(&ctx).await.unwrap(), None);
    }

    /// Store whose next cart lookup, once armed, parks after reading until
    /// released, so a test can run a write in between.
    #[derive(Clone)]
    struct PausingStore {
        inner: MemoryCartStore,
        armed: Arc<AtomicBool>,
        loaded: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl PausingStore {
        fn new(inner: MemoryCartStore) -> Self {
            Self {
                inner,
                armed: Arc::new(AtomicBool::new(false)),
                loaded: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
            }
        }

        fn arm(&self) {
            self.armed.store(true, Ordering::SeqCst);
        }

        async fn pause_if_armed(&self) {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.loaded.notify_one();
                self.release.notified().await;
            }
        }
    }

    impl CartStore for PausingStore {
        async fn find_by_id(
            &self,
            cart_id: CartId,
        ) -> Result<Option<ShoppingCart>, RepositoryError> {
            let cart = self.inner.find_by_id(cart_id).await?;
            self.pause_if_armed().await;
            Ok(cart)
        }

        async fn find_by_user(
            &self,
            user_id: UserId,
        ) -> Result<Option<ShoppingCart>, RepositoryError> {
            let cart = self.inner.find_by_user(user_id).await?;
            self.pause_if_armed().await;
            Ok(cart)
        }

        async fn create(&self, owner: Option<UserId>) -> Result<Cart, RepositoryError> {
            self.inner.create(owner).await
        }

        async fn insert_item(
            &self,
            cart_id: CartId,
            product_id: ProductId,
            quantity: Quantity,
        ) -> Result<(), RepositoryError> {
            self.inner.insert_item(cart_id, product_id, quantity).await
        }

        async fn update_item_quantity(
            &self,
            cart_id: CartId,
            item_id: CartItemId,
            quantity: Quantity,
        ) -> Result<(), RepositoryError> {
            self.inner
                .update_item_quantity(cart_id, item_id, quantity)
                .await
        }

        async fn delete_item(
            &self,
            cart_id: CartId,
            item_id: CartItemId,
        ) -> Result<bool, RepositoryError> {
            self.inner.delete_item(cart_id, item_id).await
        }

        async fn apply_merge(&self, plan: &MergePlan) -> Result<CartId, RepositoryError> {
            self.inner.apply_merge(plan).await
        }
    }

    #[tokio::test]
    async fn test_read_overlapping_a_write_does_not_hide_it() {
        let memory = store();
        let cart_id = memory.seed_cart(Some(user()), &[(A, 1)]);
        let store = PausingStore::new(memory.clone());
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let mut reader_cookies = TestCookies::default();
        let mut writer_cookies = TestCookies::default();
        let reader = CartContext::new(Caller::User(user()), &mut reader_cookies);
        let mut writer = CartContext::new(Caller::User(user()), &mut writer_cookies);

        store.arm();
        let (in_flight, written) = tokio::join!(service.get_cart(&reader), async {
            store.loaded.notified().await;
            let written = service
                .set_product_quantity(&mut writer, ProductId::new(A), 5)
                .await;
            store.release.notify_one();
            written
        });

        assert_eq!(in_flight.unwrap().unwrap().size(), 1);
        assert_eq!(written.unwrap().size(), 5);
        assert_eq!(memory.lines_of(cart_id), vec![(A, 5)]);
        assert_eq!(service.get_cart(&reader).await.unwrap().unwrap().size(), 5);
    }

    #[tokio::test]
    async fn test_cart_removed_mid_request_is_a_conflict() {
        let memory = store();
        let cart_id = memory.seed_cart(None, &[(A, 1)]);
        let store = PausingStore::new(memory.clone());
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let mut cookies = TestCookies::with(cart_id);
        let mut ctx = CartContext::new(Caller::Anonymous, &mut cookies);

        store.arm();
        let (result, ()) = tokio::join!(
            service.set_product_quantity(&mut ctx, ProductId::new(B), 2),
            async {
                store.loaded.notified().await;
                memory.remove_cart(cart_id);
                store.release.notify_one();
            }
        );

        assert!(matches!(
            result,
            Err(CartError::Repository(RepositoryError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn test_merge_without_cookie_is_noop() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let owned = store.seed_cart(Some(user()), &[(A, 1)]);
        let mut cookies = TestCookies::default();
        let mut ctx = CartContext::new(Caller::User(user()), &mut cookies);

        let outcome = service
            .merge_anonymous_cart_into_user_cart(&mut ctx, user())
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome::NothingToMerge);
        assert_eq!(store.writes(), 0);
        assert_eq!(store.lines_of(owned), vec![(A, 1)]);
    }

    #[tokio::test]
    async fn test_merge_with_stale_cookie_is_noop() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let other_users_cart = store.seed_cart(Some(UserId::new(7)), &[(A, 1)]);

        for cookie in [CartId::generate(), other_users_cart] {
            let mut cookies = TestCookies::with(cookie);
            let mut ctx = CartContext::new(Caller::User(user()), &mut cookies);
            let outcome = service
                .merge_anonymous_cart_into_user_cart(&mut ctx, user())
                .await
                .unwrap();
            assert_eq!(outcome, MergeOutcome::NothingToMerge);
        }

        assert_eq!(store.writes(), 0);
        assert_eq!(store.lines_of(other_users_cart), vec![(A, 1)]);
    }

    #[tokio::test]
    async fn test_merge_adds_quantities_into_existing_user_cart() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let anonymous = store.seed_cart(None, &[(A, 2)]);
        let owned = store.seed_cart(Some(user()), &[(A, 1), (B, 3)]);
        let mut cookies = TestCookies::with(anonymous);

        let outcome = {
            let mut ctx = CartContext::new(Caller::User(user()), &mut cookies);
            service
                .merge_anonymous_cart_into_user_cart(&mut ctx, user())
                .await
                .unwrap()
        };

        assert_eq!(
            outcome,
            MergeOutcome::Merged {
                cart_id: owned,
                lines: 2
            }
        );
        assert_eq!(store.lines_of(owned), vec![(A, 3), (B, 3)]);
        assert!(!store.cart_exists(anonymous));
        assert_eq!(cookies.value, None);
    }

    #[tokio::test]
    async fn test_merge_preserves_totals_and_distinct_products() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let anonymous = store.seed_cart(None, &[(A, 2), (C, 4)]);
        store.seed_cart(Some(user()), &[(A, 1), (B, 3)]);
        let mut cookies = TestCookies::with(anonymous);
        let mut ctx = CartContext::new(Caller::User(user()), &mut cookies);

        service
            .merge_anonymous_cart_into_user_cart(&mut ctx, user())
            .await
            .unwrap();
        let cart = service.get_cart(&ctx).await.unwrap().unwrap();

        assert_eq!(cart.size(), 2 + 4 + 1 + 3);
        assert_eq!(cart.items().len(), 3);
        // 3 * 10 + 3 * 5 + 4 * 2.50
        assert_eq!(cart.subtotal(), Decimal::from(55));
    }

    #[tokio::test]
    async fn test_merge_promotes_anonymous_lines_when_user_has_no_cart() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        let anonymous = store.seed_cart(None, &[(A, 2), (B, 1)]);
        let mut cookies = TestCookies::with(anonymous);
        let mut ctx = CartContext::new(Caller::User(user()), &mut cookies);

        let outcome = service
            .merge_anonymous_cart_into_user_cart(&mut ctx, user())
            .await
            .unwrap();

        let owned = store.cart_of(user()).unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Merged {
                cart_id: owned,
                lines: 2
            }
        );
        assert_eq!(store.lines_of(owned), vec![(A, 2), (B, 1)]);
        assert!(!store.cart_exists(anonymous));
    }

    #[tokio::test]
    async fn test_failed_merge_changes_nothing() {
        for step in [
            MergeFailPoint::AfterDeletingUserItems,
            MergeFailPoint::AfterInsertingMergedItems,
            MergeFailPoint::AfterDeletingAnonymousCart,
        ] {
            let store = store();
            let views = views();
            let service = CartService::new(store.clone(), &views);
            let anonymous = store.seed_cart(None, &[(A, 2)]);
            let owned = store.seed_cart(Some(user()), &[(A, 1), (B, 3)]);
            store.fail_merge_at(step);
            let mut cookies = TestCookies::with(anonymous);

            let result = {
                let mut ctx = CartContext::new(Caller::User(user()), &mut cookies);
                service
                    .merge_anonymous_cart_into_user_cart(&mut ctx, user())
                    .await
            };

            assert!(matches!(result, Err(CartError::Repository(_))), "{step:?}");
            assert_eq!(store.lines_of(owned), vec![(A, 1), (B, 3)], "{step:?}");
            assert_eq!(store.lines_of(anonymous), vec![(A, 2)], "{step:?}");
            assert_eq!(cookies.value, Some(anonymous), "{step:?}");
        }
    }

    #[tokio::test]
    async fn test_merge_signals_both_views() {
        let store = store();
        let views = views();
        let mut stale = views.subscribe();
        let service = CartService::new(store.clone(), &views);
        let anonymous = store.seed_cart(None, &[(C, 2)]);
        store.seed_cart(Some(user()), &[(B, 1)]);
        let mut cookies = TestCookies::with(anonymous);
        let mut ctx = CartContext::new(Caller::User(user()), &mut cookies);

        assert_eq!(service.get_cart(&ctx).await.unwrap().unwrap().size(), 1);
        service
            .merge_anonymous_cart_into_user_cart(&mut ctx, user())
            .await
            .unwrap();

        assert_eq!(stale.try_recv().unwrap(), CartKey::Anonymous(anonymous));
        assert_eq!(stale.try_recv().unwrap(), CartKey::User(user()));
        assert_eq!(service.get_cart(&ctx).await.unwrap().unwrap().size(), 3);
    }

    #[tokio::test]
    async fn test_anonymous_then_login_scenario() {
        let store = store();
        let views = views();
        let service = CartService::new(store.clone(), &views);
        store.seed_cart(Some(user()), &[(A, 1), (B, 3)]);
        let mut cookies = TestCookies::default();

        {
            let mut ctx = CartContext::new(Caller::Anonymous, &mut cookies);
            service
                .set_product_quantity(&mut ctx, ProductId::new(A), 2)
                .await
                .unwrap();
        }
        assert!(cookies.value.is_some());

        let mut ctx = CartContext::new(Caller::User(user()), &mut cookies);
        service
            .merge_anonymous_cart_into_user_cart(&mut ctx, user())
            .await
            .unwrap();
        let cart = service.get_cart(&ctx).await.unwrap().unwrap();
        drop(ctx);

        let lines: Vec<_> = cart
            .items()
            .iter()
            .map(|item| (item.product.id.as_i32(), item.quantity.get()))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        assert_eq!(lines, vec![(A, 3), (B, 3)]);
        assert_eq!(cookies.value, None);
    }

    #[test]
    fn test_caller_from_session_user() {
        let current = CurrentUser {
            id: user(),
            email: "a@example.com".parse().unwrap(),
        };
        assert_eq!(Caller::from(Some(&current)), Caller::User(user()));
        assert_eq!(Caller::from(None), Caller::Anonymous);
    }
}
