//! Storefront - cart, checkout and order back office
//!
//! Server-side core of a small storefront: the shopping cart shared by
//! anonymous and signed-in shoppers, checkout into immutable orders, and the
//! manual payment approval flow run by administrators.
//!
//! ## Features
//! - Session carts for anonymous visitors, persisted carts per user
//! - One-shot migration of a session cart at login
//! - Checkout with a flat 10% tax and frozen line prices
//! - JazzCash / bank transfer proof review, cash on delivery
//! - Order status lifecycle with terminal cancellation

use thiserror::Error;

pub mod config;
pub mod domain;
pub mod repository;
pub mod service;
pub mod web;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    /// Missing or malformed input; the caller can correct it.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Item not found in cart")]
    ItemNotFound,

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    TerminalState(String),

    #[error("{0}")]
    NotApplicable(String),

    /// Optimistic cart write lost every retry.
    #[error("Cart was modified concurrently, please retry")]
    CartConflict,

    /// Order kept changing under a back-office or customer action.
    #[error("Order was modified concurrently, please retry")]
    OrderConflict,

    #[error("Order number already taken")]
    DuplicateOrderNumber,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl StorefrontError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// True for failures the user can act on; everything else is reported
    /// as a generic server error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::DuplicateOrderNumber)
    }
}

impl From<sqlx::Error> for StorefrontError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() && db.constraint() == Some("orders_order_number_key") {
                return Self::DuplicateOrderNumber;
            }
        }
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(StorefrontError::EmptyCart.is_recoverable());
        assert!(StorefrontError::validation("City is required").is_recoverable());
        assert!(!StorefrontError::Storage("connection reset".into()).is_recoverable());
    }

    #[test]
    fn test_messages() {
        assert_eq!(StorefrontError::not_found("Product").to_string(), "Product not found");
        assert_eq!(StorefrontError::EmptyCart.to_string(), "Your cart is empty");
    }
}
