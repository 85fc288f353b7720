//! Storefront domain model
pub mod aggregates;
pub mod events;
pub mod value_objects;

pub use aggregates::*;
pub use events::{CartEvent, DomainEvent, OrderEvent};
pub use value_objects::{Money, OrderNumber, Quantity, TAX_RATE};
