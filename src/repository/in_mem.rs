//! In-memory repositories, used by the test suite and the `memory` datastore.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{wrong_store, CartRepository, OrderGuard, OrderRepository, ProductRepository, SaveOutcome};
use crate::domain::{Cart, CartLine, CartOwner, Order, Product, Quantity};
use crate::{Result, StorefrontError};

#[derive(Clone, Default)]
pub struct InMemProductRepo {
    products: Arc<RwLock<HashMap<Uuid, Product>>>,
}

impl InMemProductRepo {
    pub fn new() -> Self { Self::default() }

    pub async fn upsert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn remove(&self, id: Uuid) {
        self.products.write().await.remove(&id);
    }
}

#[async_trait]
impl ProductRepository for InMemProductRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }
}

/// Stored the way the database keeps it: product references, not copies.
#[derive(Clone, Debug)]
struct StoredLine {
    product_id: Uuid,
    quantity: Quantity,
    added_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
struct StoredCart {
    lines: Vec<StoredLine>,
    version: u64,
    updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InMemCartRepo {
    products: InMemProductRepo,
    carts: Arc<RwLock<HashMap<Uuid, StoredCart>>>,
    fail_saves: Arc<AtomicBool>,
}

impl InMemCartRepo {
    pub fn new(products: InMemProductRepo) -> Self {
        Self { products, carts: Arc::default(), fail_saves: Arc::default() }
    }

    /// Makes every subsequent save fail with a storage error.
    pub fn fail_saves(&self, fail: bool) { self.fail_saves.store(fail, Ordering::SeqCst); }

    fn user_id(owner: &CartOwner) -> Result<Uuid> {
        match owner {
            CartOwner::User(id) => Ok(*id),
            CartOwner::Session(_) => Err(wrong_store(owner, "persisted store")),
        }
    }
}

#[async_trait]
impl CartRepository for InMemCartRepo {
    async fn load(&self, owner: &CartOwner) -> Result<Cart> {
        let user_id = Self::user_id(owner)?;
        let stored = self
            .carts
            .write()
            .await
            .entry(user_id)
            .or_insert_with(|| StoredCart { lines: vec![], version: 0, updated_at: Utc::now() })
            .clone();

        let mut lines = Vec::with_capacity(stored.lines.len());
        for line in stored.lines {
            match self.products.find_by_id(line.product_id).await? {
                Some(product) => lines.push(CartLine { product, quantity: line.quantity, added_at: line.added_at }),
                None => tracing::warn!(%owner, product_id = %line.product_id, "dropping cart line for vanished product"),
            }
        }
        Ok(Cart::restore(owner.clone(), lines, stored.version, stored.updated_at))
    }

    async fn save(&self, cart: &Cart) -> Result<SaveOutcome> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorefrontError::Storage("cart store unavailable".into()));
        }
        let user_id = Self::user_id(cart.owner())?;
        let mut carts = self.carts.write().await;
        let stored_version = carts.get(&user_id).map(|c| c.version).unwrap_or(0);
        if stored_version != cart.version() {
            return Ok(SaveOutcome::Conflict);
        }
        let lines = cart
            .lines()
            .iter()
            .map(|l| StoredLine { product_id: l.product_id(), quantity: l.quantity, added_at: l.added_at })
            .collect();
        carts.insert(user_id, StoredCart { lines, version: stored_version + 1, updated_at: cart.updated_at() });
        Ok(SaveOutcome::Saved)
    }
}

#[derive(Clone, Default)]
pub struct InMemOrderRepo {
    orders: Arc<RwLock<Vec<Order>>>,
    fail_inserts: Arc<AtomicBool>,
}

impl InMemOrderRepo {
    pub fn new() -> Self { Self::default() }

    /// Makes every subsequent insert fail with a storage error.
    pub fn fail_inserts(&self, fail: bool) { self.fail_inserts.store(fail, Ordering::SeqCst); }

    pub async fn len(&self) -> usize { self.orders.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.orders.read().await.is_empty() }
}

fn stored(order: &Order) -> Order {
    let mut copy = order.clone();
    copy.events.clear();
    copy
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait]
impl OrderRepository for InMemOrderRepo {
    async fn insert(&self, order: &Order) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorefrontError::Storage("order store unavailable".into()));
        }
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.order_number == order.order_number) {
            return Err(StorefrontError::DuplicateOrderNumber);
        }
        orders.push(stored(order));
        Ok(())
    }

    async fn update(&self, order: &Order, seen: OrderGuard) -> Result<SaveOutcome> {
        let mut orders = self.orders.write().await;
        match orders.iter_mut().find(|o| o.id == order.id) {
            Some(slot) if OrderGuard::of(slot) == seen => {
                *slot = stored(order);
                Ok(SaveOutcome::Saved)
            }
            _ => Ok(SaveOutcome::Conflict),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.read().await.iter().find(|o| o.id == id).cloned())
    }

    async fn find_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.read().await.iter().find(|o| o.id == id && o.user_id == user_id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let orders = self.orders.read().await.iter().filter(|o| o.user_id == user_id).cloned().collect();
        Ok(newest_first(orders))
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        Ok(newest_first(self.orders.read().await.clone()))
    }
}
