//! Cart engine: one quantity/total view over session and persisted carts.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Cart, CartOwner, Money, Quantity};
use crate::repository::{CartRepository, CartStores, ProductRepository, SaveOutcome};
use crate::{Result, StorefrontError};

/// Reload-and-reapply rounds before a contended cart write gives up.
pub const MAX_CART_WRITE_ATTEMPTS: usize = 3;

/// Loads the owner's cart, applies `change` and writes it back with a
/// version check, retrying on conflicts. Errors from `change` abort without
/// writing anything.
pub(crate) async fn mutate_cart<T, F>(repo: &dyn CartRepository, owner: &CartOwner, mut change: F) -> Result<(T, Cart)>
where
    F: FnMut(&mut Cart) -> Result<T> + Send,
    T: Send,
{
    for attempt in 1..=MAX_CART_WRITE_ATTEMPTS {
        let mut cart = repo.load(owner).await?;
        let out = change(&mut cart)?;
        match repo.save(&cart).await? {
            SaveOutcome::Saved => return Ok((out, cart)),
            SaveOutcome::Conflict => tracing::debug!(%owner, attempt, "cart write conflict, retrying"),
        }
    }
    tracing::warn!(%owner, "cart write abandoned after {MAX_CART_WRITE_ATTEMPTS} conflicts");
    Err(StorefrontError::CartConflict)
}

#[derive(Clone)]
pub struct CartEngine {
    products: Arc<dyn ProductRepository>,
    stores: CartStores,
}

impl CartEngine {
    pub fn new(products: Arc<dyn ProductRepository>, stores: CartStores) -> Self {
        Self { products, stores }
    }

    pub fn stores(&self) -> &CartStores { &self.stores }

    pub async fn get_cart(&self, owner: &CartOwner) -> Result<Cart> {
        self.stores.for_owner(owner).load(owner).await
    }

    #[tracing::instrument(skip(self), fields(owner = %owner))]
    pub async fn add_item(&self, owner: &CartOwner, product_id: Uuid, quantity: Quantity) -> Result<Cart> {
        let product = self
            .products
            .find_by_id(product_id)
            .await?
            .ok_or_else(|| StorefrontError::not_found("Product"))?;
        let (_, cart) = mutate_cart(self.stores.for_owner(owner), owner, |cart| {
            cart.add_item(product.clone(), quantity);
            Ok(())
        })
        .await?;
        tracing::info!(count = cart.count(), "item added to cart");
        Ok(cart)
    }

    /// Removing a product that is not in the cart leaves it untouched.
    #[tracing::instrument(skip(self), fields(owner = %owner))]
    pub async fn remove_item(&self, owner: &CartOwner, product_id: Uuid) -> Result<Cart> {
        let cart = self.get_cart(owner).await?;
        if cart.line(product_id).is_none() {
            return Ok(cart);
        }
        let (_, cart) = mutate_cart(self.stores.for_owner(owner), owner, |cart| {
            cart.remove_item(product_id);
            Ok(())
        })
        .await?;
        Ok(cart)
    }

    /// Returns the new line total with the updated cart.
    #[tracing::instrument(skip(self), fields(owner = %owner))]
    pub async fn update_quantity(&self, owner: &CartOwner, product_id: Uuid, quantity: i32) -> Result<(Money, Cart)> {
        mutate_cart(self.stores.for_owner(owner), owner, |cart| cart.update_quantity(product_id, quantity)).await
    }

    #[tracing::instrument(skip(self), fields(owner = %owner))]
    pub async fn clear(&self, owner: &CartOwner) -> Result<Cart> {
        let cart = self.get_cart(owner).await?;
        if cart.is_empty() {
            return Ok(cart);
        }
        let (_, cart) = mutate_cart(self.stores.for_owner(owner), owner, |cart| {
            cart.clear();
            Ok(())
        })
        .await?;
        Ok(cart)
    }

    pub async fn count(&self, owner: &CartOwner) -> Result<i64> {
        Ok(self.get_cart(owner).await?.count())
    }

    pub async fn total(&self, owner: &CartOwner) -> Result<Money> {
        Ok(self.get_cart(owner).await?.total())
    }
}
