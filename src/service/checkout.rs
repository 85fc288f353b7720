//! Order builder: turns a user's persisted cart into an order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::cart::mutate_cart;
use super::{publish_all, EventPublisher};
use crate::domain::{
    CartLine, CartOwner, Money, Order, OrderItem, OrderNumber, PaymentDetails, PaymentMethod, PaymentSubmission,
    ShippingDetails,
};
use crate::repository::{CartRepository, OrderRepository, ProductRepository};
use crate::{Result, StorefrontError};

const ORDER_NUMBER_ATTEMPTS: usize = 3;

/// Checkout form contents, after the proof image has been stored.
#[derive(Clone, Debug, Default)]
pub struct PlaceOrder {
    pub shipping: ShippingDetails,
    pub payment_method: Option<String>,
    pub payment: PaymentSubmission,
}

/// Totals shown on the checkout page. Advisory: the order is priced again
/// from the catalog when placed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSummary {
    pub items: Vec<CartLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

#[derive(Clone)]
pub struct OrderBuilder {
    products: Arc<dyn ProductRepository>,
    carts: Arc<dyn CartRepository>,
    orders: Arc<dyn OrderRepository>,
    events: Arc<dyn EventPublisher>,
}

impl OrderBuilder {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        carts: Arc<dyn CartRepository>,
        orders: Arc<dyn OrderRepository>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { products, carts, orders, events }
    }

    pub async fn checkout_summary(&self, user_id: Uuid) -> Result<CheckoutSummary> {
        let cart = self.carts.load(&CartOwner::User(user_id)).await?;
        if cart.is_empty() {
            return Err(StorefrontError::EmptyCart);
        }
        let subtotal = cart.total();
        let tax = subtotal.tax();
        Ok(CheckoutSummary { items: cart.lines().to_vec(), subtotal, tax, total: subtotal + tax })
    }

    /// Persists the order first and only then empties the cart. A failed
    /// order write leaves the cart alone; a failed cart clear leaves the
    /// order standing next to a stale cart.
    #[tracing::instrument(skip(self, input))]
    pub async fn place_order(&self, user_id: Uuid, input: PlaceOrder) -> Result<Order> {
        let shipping = input.shipping.normalized()?;
        let method: PaymentMethod = input
            .payment_method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| StorefrontError::validation("Please fill in all required fields"))?
            .parse()?;
        let payment = PaymentDetails::from_submission(method, input.payment)?;

        let owner = CartOwner::User(user_id);
        let cart = self.carts.load(&owner).await?;
        if cart.is_empty() {
            return Err(StorefrontError::EmptyCart);
        }
        let items = self.price_lines(cart.lines()).await?;

        let mut order = self.insert_with_fresh_number(user_id, items, shipping, method, payment).await?;
        tracing::info!(order_number = %order.order_number(), total = %order.total(), "order placed");

        if let Err(e) = mutate_cart(self.carts.as_ref(), &owner, |c| { c.clear(); Ok(()) }).await {
            tracing::warn!(order_number = %order.order_number(), error = %e, "order placed but cart not cleared");
        }

        publish_all(self.events.as_ref(), order.take_events()).await;
        Ok(order)
    }

    /// Confirmation lookup; only the owner may see the order.
    pub async fn confirmation(&self, user_id: Uuid, order_id: Uuid) -> Result<Order> {
        self.orders
            .find_for_user(order_id, user_id)
            .await?
            .ok_or_else(|| StorefrontError::not_found("Order"))
    }

    /// Snapshots each line at the catalog's current price.
    async fn price_lines(&self, lines: &[CartLine]) -> Result<Vec<OrderItem>> {
        let ids: Vec<Uuid> = lines.iter().map(CartLine::product_id).collect();
        let current: HashMap<Uuid, _> = self.products.find_many(&ids).await?.into_iter().map(|p| (p.id, p)).collect();
        lines
            .iter()
            .map(|line| {
                current
                    .get(&line.product_id())
                    .map(|product| OrderItem::from_product(product, line.quantity))
                    .ok_or_else(|| StorefrontError::not_found(format!("Product {}", line.product.name)))
            })
            .collect()
    }

    async fn insert_with_fresh_number(
        &self,
        user_id: Uuid,
        items: Vec<OrderItem>,
        shipping: ShippingDetails,
        method: PaymentMethod,
        payment: PaymentDetails,
    ) -> Result<Order> {
        for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
            let number = OrderNumber::generate(Utc::now());
            let order = Order::place(user_id, number, items.clone(), shipping.clone(), method, payment.clone())?;
            match self.orders.insert(&order).await {
                Ok(()) => return Ok(order),
                Err(StorefrontError::DuplicateOrderNumber) => {
                    tracing::warn!(order_number = %order.order_number(), attempt, "order number collision");
                }
                Err(e) => {
                    tracing::error!(error = %e, "order could not be saved, cart left intact");
                    return Err(e);
                }
            }
        }
        Err(StorefrontError::Storage("could not allocate a unique order number".into()))
    }
}
