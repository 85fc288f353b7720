//! Folds an anonymous session cart into the user's persisted cart at login.

use std::sync::Arc;

use uuid::Uuid;

use super::cart::mutate_cart;
use super::{publish_all, EventPublisher};
use crate::domain::{CartEvent, CartOwner, DomainEvent};
use crate::repository::CartRepository;

#[derive(Clone)]
pub struct CartMigration {
    session: Arc<dyn CartRepository>,
    persisted: Arc<dyn CartRepository>,
    events: Arc<dyn EventPublisher>,
}

impl CartMigration {
    pub fn new(session: Arc<dyn CartRepository>, persisted: Arc<dyn CartRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self { session, persisted, events }
    }

    /// Runs once per login. Quantities of products already in the persisted
    /// cart are summed, so a second run would double them; the session cart
    /// is therefore emptied whether or not the merge succeeded.
    ///
    /// Never fails: login must not be blocked by cart bookkeeping. Returns
    /// the number of session lines merged.
    #[tracing::instrument(skip(self))]
    pub async fn migrate(&self, session_id: &str, user_id: Uuid) -> usize {
        let session_owner = CartOwner::Session(session_id.to_string());
        let session_cart = match self.session.load(&session_owner).await {
            Ok(cart) => cart,
            Err(e) => {
                tracing::error!(error = %e, "could not read session cart for migration");
                return 0;
            }
        };
        if session_cart.is_empty() {
            return 0;
        }

        let lines = session_cart.lines().to_vec();
        let merged = mutate_cart(self.persisted.as_ref(), &CartOwner::User(user_id), |cart| {
            cart.merge(&lines);
            Ok(())
        })
        .await;

        if let Err(e) = mutate_cart(self.session.as_ref(), &session_owner, |cart| {
            cart.clear();
            Ok(())
        })
        .await
        {
            tracing::error!(error = %e, "could not clear session cart after migration");
        }

        match merged {
            Ok(_) => {
                tracing::info!(lines = lines.len(), "session cart migrated");
                let event = DomainEvent::Cart(CartEvent::Migrated { session_id: session_id.to_string(), user_id, lines: lines.len() });
                publish_all(self.events.as_ref(), vec![event]).await;
                lines.len()
            }
            Err(e) => {
                tracing::error!(error = %e, "error migrating session cart to database");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Quantity;
    use crate::repository::CartStores;
    use crate::service::cart::tests::Fixture;
    use crate::service::testing::RecordingPublisher;

    fn migration(fx: &Fixture, events: Arc<RecordingPublisher>) -> CartMigration {
        let CartStores { session, persisted } = fx.engine.stores().clone();
        CartMigration::new(session, persisted, events)
    }

    #[tokio::test]
    async fn test_quantities_are_summed() {
        let fx = Fixture::new();
        let a = fx.stock("A", 1_000).await;
        let b = fx.stock("B", 300).await;
        let user = Uuid::now_v7();
        let sid = CartOwner::Session("sid-9".into());
        let uid = CartOwner::User(user);

        fx.engine.add_item(&sid, a.id, Quantity::new(2).unwrap()).await.unwrap();
        fx.engine.add_item(&sid, b.id, Quantity::ONE).await.unwrap();
        fx.engine.add_item(&uid, a.id, Quantity::new(3).unwrap()).await.unwrap();

        let events = Arc::new(RecordingPublisher::default());
        assert_eq!(migration(&fx, events.clone()).migrate("sid-9", user).await, 2);

        let cart = fx.engine.get_cart(&uid).await.unwrap();
        assert_eq!(cart.line(a.id).unwrap().quantity.value(), 5);
        assert_eq!(cart.line(b.id).unwrap().quantity.value(), 1);
        assert!(fx.engine.get_cart(&sid).await.unwrap().is_empty());
        assert_eq!(events.subjects(), vec!["storefront.carts.migrated"]);
    }

    #[tokio::test]
    async fn test_empty_session_is_noop() {
        let fx = Fixture::new();
        let user = Uuid::now_v7();
        let events = Arc::new(RecordingPublisher::default());
        assert_eq!(migration(&fx, events.clone()).migrate("nobody", user).await, 0);
        assert!(events.subjects().is_empty());
    }

    #[tokio::test]
    async fn test_failed_merge_still_clears_session() {
        let fx = Fixture::new();
        let a = fx.stock("A", 1_000).await;
        let sid = CartOwner::Session("sid-2".into());
        fx.engine.add_item(&sid, a.id, Quantity::ONE).await.unwrap();

        fx.persisted.fail_saves(true);
        let user = Uuid::now_v7();
        assert_eq!(migration(&fx, Arc::new(RecordingPublisher::default())).migrate("sid-2", user).await, 0);
        fx.persisted.fail_saves(false);

        assert!(fx.engine.get_cart(&sid).await.unwrap().is_empty());
        assert!(fx.engine.get_cart(&CartOwner::User(user)).await.unwrap().is_empty());
    }
}
