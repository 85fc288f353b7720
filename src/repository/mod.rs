//! Storage seams.
//!
//! The services only see these traits. Carts have two backing stores behind
//! the same [`CartRepository`] interface: an ephemeral per-session store and
//! the persisted per-user store. [`CartStores::for_owner`] is the single place
//! that picks one.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Cart, CartOwner, Order, OrderStatus, PaymentStatus, Product};
use crate::{Result, StorefrontError};

mod in_mem;
mod postgres;
mod session;

pub use in_mem::{InMemCartRepo, InMemOrderRepo, InMemProductRepo};
pub use postgres::{PgCartRepo, PgOrderRepo, PgProductRepo};
pub use session::SessionCartRepo;

// repositories are shared across requests and held across awaits,
// hence `Send + Sync` super-traits
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>>;
    /// Missing ids are skipped; order of the result is unspecified.
    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Stored version moved on since the cart was loaded.
    Conflict,
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Fetches the owner's cart, creating an empty one when none exists yet.
    async fn load(&self, owner: &CartOwner) -> Result<Cart>;
    /// Compare-and-swap on [`Cart::version`].
    async fn save(&self, cart: &Cart) -> Result<SaveOutcome>;
}

/// Status pair an order had when it was read. An update only lands while
/// the stored order still matches it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderGuard {
    pub status: OrderStatus,
    pub payment_status: Option<PaymentStatus>,
}

impl OrderGuard {
    pub fn of(order: &Order) -> Self {
        Self { status: order.status(), payment_status: order.payment().status }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Fails with [`StorefrontError::DuplicateOrderNumber`] when the number is taken.
    async fn insert(&self, order: &Order) -> Result<()>;
    /// Persists status and payment review fields. Reports
    /// [`SaveOutcome::Conflict`] when the stored order no longer matches
    /// `seen` or is gone.
    async fn update(&self, order: &Order, seen: OrderGuard) -> Result<SaveOutcome>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>>;
    async fn find_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Option<Order>>;
    /// Newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;
    /// Newest first.
    async fn list_all(&self) -> Result<Vec<Order>>;
}

#[derive(Clone)]
pub struct CartStores {
    pub session: Arc<dyn CartRepository>,
    pub persisted: Arc<dyn CartRepository>,
}

impl CartStores {
    pub fn for_owner(&self, owner: &CartOwner) -> &dyn CartRepository {
        match owner {
            CartOwner::Session(_) => self.session.as_ref(),
            CartOwner::User(_) => self.persisted.as_ref(),
        }
    }
}

pub(crate) fn wrong_store(owner: &CartOwner, store: &str) -> StorefrontError {
    StorefrontError::Storage(format!("{store} cannot hold cart of {owner}"))
}
