//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Category, Product};
pub use order::{
    BankTransferDetails, Order, OrderItem, OrderStatus, PaymentAction, PaymentDetails, PaymentMethod,
    PaymentStatus, PaymentSubmission, ShippingDetails,
};
pub use cart::{Cart, CartLine, CartOwner};
