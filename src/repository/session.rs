//! Anonymous carts, kept in an in-process cache keyed by session id.
//!
//! Lines embed the full product as it was when added, so no catalog lookup
//! happens on read.

use std::future::ready;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};

use super::{wrong_store, CartRepository, SaveOutcome};
use crate::domain::{Cart, CartLine, CartOwner};
use crate::Result;

#[derive(Clone, Debug)]
struct SessionCart {
    lines: Vec<CartLine>,
    version: u64,
    updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionCartRepo {
    carts: Cache<String, SessionCart>,
}

impl SessionCartRepo {
    /// Carts untouched for `idle` are dropped, as the session would be.
    pub fn new(max_entries: u64, idle: Duration) -> Self {
        let carts = Cache::builder().max_capacity(max_entries).time_to_idle(idle).build();
        Self { carts }
    }

    fn session_id(owner: &CartOwner) -> Result<&str> {
        match owner {
            CartOwner::Session(sid) => Ok(sid),
            CartOwner::User(_) => Err(wrong_store(owner, "session store")),
        }
    }
}

#[async_trait]
impl CartRepository for SessionCartRepo {
    async fn load(&self, owner: &CartOwner) -> Result<Cart> {
        let sid = Self::session_id(owner)?;
        Ok(match self.carts.get(sid).await {
            Some(c) => Cart::restore(owner.clone(), c.lines, c.version, c.updated_at),
            None => Cart::empty(owner.clone()),
        })
    }

    async fn save(&self, cart: &Cart) -> Result<SaveOutcome> {
        let sid = Self::session_id(cart.owner())?.to_string();
        let expected = cart.version();
        let next = SessionCart { lines: cart.lines().to_vec(), version: expected + 1, updated_at: cart.updated_at() };

        let result = self
            .carts
            .entry(sid)
            .and_compute_with(|current| {
                let stored = current.map(|e| e.into_value().version).unwrap_or(0);
                ready(if stored == expected { Op::Put(next) } else { Op::Nop })
            })
            .await;

        Ok(match result {
            CompResult::Inserted(_) | CompResult::ReplacedWith(_) => SaveOutcome::Saved,
            _ => SaveOutcome::Conflict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::tests::product;
    use crate::domain::Quantity;

    fn repo() -> SessionCartRepo { SessionCartRepo::new(100, Duration::from_secs(60)) }

    #[tokio::test]
    async fn test_missing_session_is_empty() {
        let cart = repo().load(&CartOwner::Session("fresh".into())).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.version(), 0);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let repo = repo();
        let owner = CartOwner::Session("s1".into());
        let mut cart = repo.load(&owner).await.unwrap();
        cart.add_item(product("Scarf", 1500), Quantity::new(2).unwrap());
        assert_eq!(repo.save(&cart).await.unwrap(), SaveOutcome::Saved);

        let reloaded = repo.load(&owner).await.unwrap();
        assert_eq!(reloaded.count(), 2);
        assert_eq!(reloaded.version(), 1);
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let repo = repo();
        let owner = CartOwner::Session("s1".into());
        let mut first = repo.load(&owner).await.unwrap();
        let mut second = repo.load(&owner).await.unwrap();
        first.add_item(product("A", 100), Quantity::ONE);
        second.add_item(product("B", 100), Quantity::ONE);
        assert_eq!(repo.save(&first).await.unwrap(), SaveOutcome::Saved);
        assert_eq!(repo.save(&second).await.unwrap(), SaveOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_user_owner_rejected() {
        let res = repo().load(&CartOwner::User(uuid::Uuid::now_v7())).await;
        assert!(res.is_err());
    }
}
