//! Order workflow: customer views and cancellation, back-office status and
//! payment review.

use std::sync::Arc;

use uuid::Uuid;

use super::{publish_all, EventPublisher};
use crate::domain::{Order, OrderStatus, PaymentAction};
use crate::repository::{OrderGuard, OrderRepository, SaveOutcome};
use crate::{Result, StorefrontError};

/// Re-read rounds before a contended order change gives up.
pub const MAX_ORDER_WRITE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct OrderWorkflow {
    orders: Arc<dyn OrderRepository>,
    events: Arc<dyn EventPublisher>,
}

impl OrderWorkflow {
    pub fn new(orders: Arc<dyn OrderRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self { orders, events }
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        self.orders.list_for_user(user_id).await
    }

    /// Someone else's order is reported as missing.
    pub async fn get_for_user(&self, user_id: Uuid, order_id: Uuid) -> Result<Order> {
        self.orders
            .find_for_user(order_id, user_id)
            .await?
            .ok_or_else(|| StorefrontError::not_found("Order"))
    }

    pub async fn list_all(&self) -> Result<Vec<Order>> {
        self.orders.list_all().await
    }

    pub async fn get(&self, order_id: Uuid) -> Result<Order> {
        self.orders.find_by_id(order_id).await?.ok_or_else(|| StorefrontError::not_found("Order"))
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, user_id: Uuid, order_id: Uuid) -> Result<Order> {
        let ((), order) = self.modify(order_id, Some(user_id), |order| order.cancel_by_customer()).await?;
        tracing::info!(order_number = %order.order_number(), "order cancelled by customer");
        Ok(order)
    }

    /// `status` is the raw form value; it is checked before the order is read.
    #[tracing::instrument(skip(self))]
    pub async fn admin_update_status(&self, admin_id: Uuid, order_id: Uuid, status: &str) -> Result<Order> {
        let status: OrderStatus = status.trim().parse()?;
        let (previous, order) = self.modify(order_id, None, |order| order.admin_set_status(status)).await?;
        tracing::info!(
            target: "storefront::audit",
            %admin_id,
            order_number = %order.order_number(),
            from = %previous,
            to = %status,
            "order status changed"
        );
        Ok(order)
    }

    /// Blank notes are treated as absent and keep any earlier notes. Other
    /// notes are stored as typed.
    #[tracing::instrument(skip(self, notes))]
    pub async fn payment_action(&self, admin_id: Uuid, order_id: Uuid, action: &str, notes: Option<String>) -> Result<Order> {
        let action: PaymentAction = action.trim().parse()?;
        let notes = notes.filter(|n| !n.trim().is_empty());
        let ((), order) = self
            .modify(order_id, None, |order| match action {
                PaymentAction::Approve => order.approve_payment(admin_id, notes.clone()),
                PaymentAction::Reject => order.reject_payment(notes.clone()),
            })
            .await?;
        tracing::info!(
            target: "storefront::audit",
            %admin_id,
            order_number = %order.order_number(),
            ?action,
            "payment reviewed"
        );
        Ok(order)
    }

    /// Reads the order (scoped to `owner` when given), applies `change` and
    /// writes it back only if nobody changed its status in between. On a
    /// conflict the order is read again, so `change` sees the newer state and
    /// may refuse it. Events are published after a successful write.
    async fn modify<T, F>(&self, order_id: Uuid, owner: Option<Uuid>, mut change: F) -> Result<(T, Order)>
    where
        F: FnMut(&mut Order) -> Result<T> + Send,
        T: Send,
    {
        for attempt in 1..=MAX_ORDER_WRITE_ATTEMPTS {
            let mut order = match owner {
                Some(user_id) => self.get_for_user(user_id, order_id).await?,
                None => self.get(order_id).await?,
            };
            let seen = OrderGuard::of(&order);
            let out = change(&mut order)?;
            match self.orders.update(&order, seen).await? {
                SaveOutcome::Saved => {
                    publish_all(self.events.as_ref(), order.take_events()).await;
                    return Ok((out, order));
                }
                SaveOutcome::Conflict => tracing::debug!(%order_id, attempt, "order changed since read, re-checking"),
            }
        }
        tracing::warn!(%order_id, "order write abandoned after {MAX_ORDER_WRITE_ATTEMPTS} conflicts");
        Err(StorefrontError::OrderConflict)
    }
}
