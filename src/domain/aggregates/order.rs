//! Order Aggregate
//!
//! An order is an immutable snapshot of a checkout. After creation only the
//! status lifecycle and the manual payment review may change it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Category, Product};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, OrderNumber, Quantity};
use crate::StorefrontError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { #[serde(rename = "jazzcash")] JazzCash, BankTransfer, CashOnDelivery }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Approved, Rejected }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentAction { Approve, Reject }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Processing => "processing", Self::Shipped => "shipped",
            Self::Delivered => "delivered", Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool { *self == Self::Cancelled }
    pub fn is_cancellable(&self) -> bool { matches!(self, Self::Pending | Self::Processing) }
}

impl FromStr for OrderStatus {
    type Err = StorefrontError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(StorefrontError::validation("Invalid status")),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::JazzCash => "jazzcash", Self::BankTransfer => "bank_transfer", Self::CashOnDelivery => "cash_on_delivery" }
    }

    /// Offline methods whose proof an administrator has to review.
    pub fn requires_approval(&self) -> bool { !matches!(self, Self::CashOnDelivery) }
}

impl FromStr for PaymentMethod {
    type Err = StorefrontError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jazzcash" => Ok(Self::JazzCash),
            "bank_transfer" => Ok(Self::BankTransfer),
            "cash_on_delivery" => Ok(Self::CashOnDelivery),
            _ => Err(StorefrontError::validation("Invalid payment method")),
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Approved => "approved", Self::Rejected => "rejected" }
    }
}

impl FromStr for PaymentStatus {
    type Err = StorefrontError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(StorefrontError::Storage(format!("unknown payment status {other}"))),
        }
    }
}

impl FromStr for PaymentAction {
    type Err = StorefrontError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            _ => Err(StorefrontError::validation("Invalid payment action")),
        }
    }
}

// =============================================================================
// Checkout input
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingDetails {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    /// Presence only, no format check.
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Zip code is required"))]
    pub zip_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
}

const SHIPPING_FIELDS: [&str; 7] = ["full_name", "email", "address", "city", "state", "zip_code", "country"];

impl ShippingDetails {
    /// Trims every field and validates presence, reporting the first
    /// offending field in form order.
    pub fn normalized(self) -> Result<Self, StorefrontError> {
        let trimmed = Self {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            zip_code: self.zip_code.trim().to_string(),
            country: self.country.trim().to_string(),
        };
        if let Err(errors) = trimmed.validate() {
            let fields = errors.field_errors();
            let message = SHIPPING_FIELDS
                .iter()
                .filter_map(|name| fields.get(name))
                .flat_map(|errs| errs.iter())
                .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "Please fill in all required fields".to_string());
            return Err(StorefrontError::Validation(message));
        }
        Ok(trimmed)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransferDetails {
    pub account_title: String,
    pub account_number: String,
    pub bank_name: String,
    pub transaction_id: String,
}

/// Raw payment fields as submitted with the checkout form.
#[derive(Clone, Debug, Default)]
pub struct PaymentSubmission {
    pub jazzcash_number: Option<String>,
    pub account_title: Option<String>,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
    pub transaction_id: Option<String>,
    /// Stored proof image reference, if one was uploaded.
    pub transaction_proof: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub jazzcash_number: Option<String>,
    pub bank_transfer: Option<BankTransferDetails>,
    pub transaction_proof: Option<String>,
    /// `None` for cash on delivery, which is never reviewed.
    pub status: Option<PaymentStatus>,
    pub admin_notes: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl PaymentDetails {
    pub fn from_submission(method: PaymentMethod, input: PaymentSubmission) -> Result<Self, StorefrontError> {
        match method {
            PaymentMethod::JazzCash => {
                let number = required(input.jazzcash_number)
                    .ok_or_else(|| StorefrontError::validation("JazzCash number is required for JazzCash payment"))?;
                let proof = required(input.transaction_proof)
                    .ok_or_else(|| StorefrontError::validation("Transaction screenshot is required for JazzCash payment"))?;
                Ok(Self { jazzcash_number: Some(number), transaction_proof: Some(proof), status: Some(PaymentStatus::Pending), ..Default::default() })
            }
            PaymentMethod::BankTransfer => {
                let details = match (required(input.account_title), required(input.account_number), required(input.bank_name), required(input.transaction_id)) {
                    (Some(account_title), Some(account_number), Some(bank_name), Some(transaction_id)) =>
                        BankTransferDetails { account_title, account_number, bank_name, transaction_id },
                    _ => return Err(StorefrontError::validation("All bank transfer details are required")),
                };
                let proof = required(input.transaction_proof)
                    .ok_or_else(|| StorefrontError::validation("Transaction screenshot is required for bank transfer payment"))?;
                Ok(Self { bank_transfer: Some(details), transaction_proof: Some(proof), status: Some(PaymentStatus::Pending), ..Default::default() })
            }
            PaymentMethod::CashOnDelivery => Ok(Self::default()),
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// Line snapshot; copied from the catalog at checkout and never re-derived.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub price: Money,
    pub quantity: Quantity,
    pub image_url: String,
    pub category: Category,
}

impl OrderItem {
    pub fn from_product(product: &Product, quantity: Quantity) -> Self {
        Self {
            product_id: product.id, name: product.name.clone(), price: product.price, quantity,
            image_url: product.image_url.clone(), category: product.category,
        }
    }

    pub fn line_total(&self) -> Money { self.price.times(self.quantity.value()) }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub(crate) id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) order_number: OrderNumber,
    pub(crate) items: Vec<OrderItem>,
    pub(crate) shipping: ShippingDetails,
    pub(crate) payment_method: PaymentMethod,
    pub(crate) payment: PaymentDetails,
    pub(crate) subtotal: Money,
    pub(crate) tax: Money,
    pub(crate) total: Money,
    pub(crate) status: OrderStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl Order {
    /// Builds a new pending order and computes its totals from the items.
    pub fn place(
        user_id: Uuid,
        order_number: OrderNumber,
        items: Vec<OrderItem>,
        shipping: ShippingDetails,
        payment_method: PaymentMethod,
        payment: PaymentDetails,
    ) -> Result<Self, StorefrontError> {
        if items.is_empty() { return Err(StorefrontError::EmptyCart); }
        let subtotal: Money = items.iter().map(OrderItem::line_total).sum();
        let tax = subtotal.tax();
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), user_id, order_number, items, shipping, payment_method, payment,
            subtotal, tax, total: subtotal + tax, status: OrderStatus::Pending,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id, order_number: order.order_number.to_string(), user_id, total: order.total.amount(),
        }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn order_number(&self) -> &OrderNumber { &self.order_number }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn shipping(&self) -> &ShippingDetails { &self.shipping }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment(&self) -> &PaymentDetails { &self.payment }
    pub fn subtotal(&self) -> Money { self.subtotal }
    pub fn tax(&self) -> Money { self.tax }
    pub fn total(&self) -> Money { self.total }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Back-office status change. Any status may be chosen except when the
    /// order is already cancelled. Returns the previous status.
    pub fn admin_set_status(&mut self, status: OrderStatus) -> Result<OrderStatus, StorefrontError> {
        if self.status.is_terminal() {
            return Err(StorefrontError::TerminalState(
                "Cannot update status of cancelled orders. Customer cancellations are final.".into(),
            ));
        }
        let previous = std::mem::replace(&mut self.status, status);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from: previous, to: status }));
        Ok(previous)
    }

    pub fn cancel_by_customer(&mut self) -> Result<(), StorefrontError> {
        if !self.status.is_cancellable() {
            return Err(StorefrontError::InvalidTransition(format!(
                "This order cannot be cancelled because it has already been {}.", self.status
            )));
        }
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id }));
        Ok(())
    }

    /// Approves a pending manual payment and moves the order to processing.
    pub fn approve_payment(&mut self, approver: Uuid, notes: Option<String>) -> Result<(), StorefrontError> {
        self.ensure_payment_reviewable()?;
        let now = Utc::now();
        self.payment.status = Some(PaymentStatus::Approved);
        self.payment.approved_by = Some(approver);
        self.payment.approved_at = Some(now);
        if notes.is_some() { self.payment.admin_notes = notes; }
        self.status = OrderStatus::Processing;
        self.updated_at = now;
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentApproved { order_id: self.id, approved_by: approver }));
        Ok(())
    }

    /// Rejects a pending manual payment; the order status is left alone.
    pub fn reject_payment(&mut self, notes: Option<String>) -> Result<(), StorefrontError> {
        self.ensure_payment_reviewable()?;
        self.payment.status = Some(PaymentStatus::Rejected);
        if notes.is_some() { self.payment.admin_notes = notes; }
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentRejected { order_id: self.id }));
        Ok(())
    }

    fn ensure_payment_reviewable(&self) -> Result<(), StorefrontError> {
        if !self.payment_method.requires_approval() {
            return Err(StorefrontError::NotApplicable("This order does not require payment approval".into()));
        }
        if self.status.is_terminal() {
            return Err(StorefrontError::TerminalState("Payment of a cancelled order cannot be reviewed".into()));
        }
        match self.payment.status {
            Some(PaymentStatus::Pending) | None => Ok(()),
            Some(decided) => Err(StorefrontError::InvalidTransition(format!("Payment has already been {}", decided.as_str()))),
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal::Decimal;

    pub(crate) fn shipping() -> ShippingDetails {
        ShippingDetails {
            full_name: "Ayesha Khan".into(), email: "ayesha@example.com".into(), address: "12 Mall Road".into(),
            city: "Lahore".into(), state: "Punjab".into(), zip_code: "54000".into(), country: "Pakistan".into(),
        }
    }

    fn item(cents: i64, qty: i32) -> OrderItem {
        OrderItem {
            product_id: Uuid::now_v7(), name: "Item".into(), price: Money::new(Decimal::new(cents, 2)),
            quantity: Quantity::new(qty).unwrap(), image_url: "/img/i.png".into(), category: Category::MenClothing,
        }
    }

    fn jazzcash_payment() -> PaymentDetails {
        PaymentDetails::from_submission(PaymentMethod::JazzCash, PaymentSubmission {
            jazzcash_number: Some("03001234567".into()), transaction_proof: Some("/uploads/screenshots/p.png".into()),
            ..Default::default()
        }).unwrap()
    }

    pub(crate) fn order_with(method: PaymentMethod) -> Order {
        let payment = if method == PaymentMethod::JazzCash { jazzcash_payment() } else { PaymentDetails::default() };
        Order::place(Uuid::now_v7(), OrderNumber::generate(Utc::now()), vec![item(2500, 2), item(1000, 1)], shipping(), method, payment).unwrap()
    }

    #[test]
    fn test_totals() {
        let order = order_with(PaymentMethod::CashOnDelivery);
        assert_eq!(order.subtotal().to_fixed(), "60.00");
        assert_eq!(order.tax().to_fixed(), "6.00");
        assert_eq!(order.total().to_fixed(), "66.00");
        let from_items: Money = order.items().iter().map(OrderItem::line_total).sum();
        assert_eq!(order.subtotal(), from_items);
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_empty_order_rejected() {
        let res = Order::place(Uuid::now_v7(), OrderNumber::generate(Utc::now()), vec![], shipping(), PaymentMethod::CashOnDelivery, PaymentDetails::default());
        assert!(matches!(res, Err(StorefrontError::EmptyCart)));
    }

    #[test]
    fn test_customer_cancel() {
        let mut order = order_with(PaymentMethod::CashOnDelivery);
        order.cancel_by_customer().unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);

        let mut shipped = order_with(PaymentMethod::CashOnDelivery);
        shipped.admin_set_status(OrderStatus::Shipped).unwrap();
        assert!(matches!(shipped.cancel_by_customer(), Err(StorefrontError::InvalidTransition(_))));
        assert_eq!(shipped.status(), OrderStatus::Shipped);
    }

    #[test]
    fn test_cancelled_is_terminal_for_admin() {
        let mut order = order_with(PaymentMethod::CashOnDelivery);
        order.cancel_by_customer().unwrap();
        assert!(matches!(order.admin_set_status(OrderStatus::Processing), Err(StorefrontError::TerminalState(_))));
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_admin_can_move_backwards() {
        let mut order = order_with(PaymentMethod::CashOnDelivery);
        order.admin_set_status(OrderStatus::Delivered).unwrap();
        assert_eq!(order.admin_set_status(OrderStatus::Pending).unwrap(), OrderStatus::Delivered);
    }

    #[test]
    fn test_approve_promotes_order() {
        let mut order = order_with(PaymentMethod::JazzCash);
        let admin = Uuid::now_v7();
        order.take_events();
        order.approve_payment(admin, Some("verified".into())).unwrap();
        assert_eq!(order.payment().status, Some(PaymentStatus::Approved));
        assert_eq!(order.payment().approved_by, Some(admin));
        assert!(order.payment().approved_at.is_some());
        assert_eq!(order.status(), OrderStatus::Processing);
        assert_eq!(order.take_events().len(), 1);
    }

    #[test]
    fn test_reject_keeps_status() {
        let mut order = order_with(PaymentMethod::JazzCash);
        order.reject_payment(Some("blurry screenshot".into())).unwrap();
        assert_eq!(order.payment().status, Some(PaymentStatus::Rejected));
        assert_eq!(order.payment().admin_notes.as_deref(), Some("blurry screenshot"));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(matches!(order.approve_payment(Uuid::now_v7(), None), Err(StorefrontError::InvalidTransition(_))));
    }

    #[test]
    fn test_cod_payment_not_applicable() {
        let mut order = order_with(PaymentMethod::CashOnDelivery);
        assert!(matches!(order.approve_payment(Uuid::now_v7(), None), Err(StorefrontError::NotApplicable(_))));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_payment_submission_rules() {
        let missing_proof = PaymentDetails::from_submission(PaymentMethod::JazzCash, PaymentSubmission {
            jazzcash_number: Some("0300".into()), ..Default::default()
        });
        assert!(matches!(missing_proof, Err(StorefrontError::Validation(m)) if m.contains("screenshot")));

        let partial_bank = PaymentDetails::from_submission(PaymentMethod::BankTransfer, PaymentSubmission {
            account_title: Some("A".into()), account_number: Some("1".into()), bank_name: Some("HBL".into()),
            transaction_proof: Some("/uploads/screenshots/x.png".into()), ..Default::default()
        });
        assert!(matches!(partial_bank, Err(StorefrontError::Validation(_))));

        let cod = PaymentDetails::from_submission(PaymentMethod::CashOnDelivery, PaymentSubmission::default()).unwrap();
        assert!(cod.status.is_none());
    }

    #[test]
    fn test_shipping_names_missing_field() {
        let mut s = shipping();
        s.city = "   ".into();
        let err = s.normalized().unwrap_err();
        assert_eq!(err.to_string(), "City is required");
        assert!(shipping().normalized().is_ok());
    }

    #[test]
    fn test_shipping_email_presence_only() {
        let mut s = shipping();
        s.email = "ayesha at home".into();
        assert_eq!(s.normalized().unwrap().email, "ayesha at home");

        let mut s = shipping();
        s.email = " ".into();
        assert_eq!(s.normalized().unwrap_err().to_string(), "Email is required");
    }
}
