//! Application services: cart engine, migration, checkout, order workflow.

use async_trait::async_trait;

use crate::domain::DomainEvent;
use crate::{Result, StorefrontError};

pub mod cart;
pub mod checkout;
pub mod migration;
pub mod orders;

pub use cart::{CartEngine, MAX_CART_WRITE_ATTEMPTS};
pub use checkout::{CheckoutSummary, OrderBuilder, PlaceOrder};
pub use migration::CartMigration;
pub use orders::OrderWorkflow;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

/// Publishes domain events as JSON on `storefront.<aggregate>.<event>`.
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let payload = serde_json::to_vec(event).map_err(|e| StorefrontError::Storage(e.to_string()))?;
        self.client
            .publish(event.subject(), payload.into())
            .await
            .map_err(|e| StorefrontError::Storage(e.to_string()))
    }
}

/// Used when no broker is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        tracing::debug!(subject = %event.subject(), ?event, "domain event");
        Ok(())
    }
}

/// Best effort: a broker outage never fails the operation that raised the events.
pub(crate) async fn publish_all(publisher: &dyn EventPublisher, events: Vec<DomainEvent>) {
    for event in events {
        if let Err(e) = publisher.publish(&event).await {
            tracing::warn!(subject = %event.subject(), error = %e, "failed to publish domain event");
        }
    }
}
