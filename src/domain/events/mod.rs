//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Cart(CartEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, user_id: Uuid, total: Decimal },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    Cancelled { order_id: Uuid },
    PaymentApproved { order_id: Uuid, approved_by: Uuid },
    PaymentRejected { order_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    Migrated { session_id: String, user_id: Uuid, lines: usize },
}

impl DomainEvent {
    /// Message subject, `storefront.<aggregate>.<event>`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Order(e) => ("orders", match e {
                OrderEvent::Placed { .. } => "placed",
                OrderEvent::StatusChanged { .. } => "status_changed",
                OrderEvent::Cancelled { .. } => "cancelled",
                OrderEvent::PaymentApproved { .. } => "payment_approved",
                OrderEvent::PaymentRejected { .. } => "payment_rejected",
            }),
            Self::Cart(CartEvent::Migrated { .. }) => ("carts", "migrated"),
        };
        format!("storefront.{aggregate}.{name}")
    }
}
