//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::domain::aggregates::Product;
use crate::domain::value_objects::{Money, Quantity};
use crate::StorefrontError;

/// Who a cart belongs to. Selects the backing store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CartOwner {
    /// Anonymous visitor, keyed by browser session id.
    Session(String),
    /// Signed-in user; exactly one persisted cart each.
    User(Uuid),
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(sid) => write!(f, "session:{sid}"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// A product in a cart. The embedded product is the data the cart was
/// loaded with: the add-time copy for session carts, the current catalog
/// row for persisted carts.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product: Product,
    pub quantity: Quantity,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(product: Product, quantity: Quantity) -> Self {
        Self { product, quantity, added_at: Utc::now() }
    }

    pub fn product_id(&self) -> Uuid { self.product.id }
    pub fn line_total(&self) -> Money { self.product.price.times(self.quantity.value()) }
}

#[derive(Clone, Debug)]
pub struct Cart {
    owner: CartOwner,
    lines: Vec<CartLine>,
    version: u64,
    updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn empty(owner: CartOwner) -> Self {
        Self { owner, lines: vec![], version: 0, updated_at: Utc::now() }
    }

    /// Rebuilds a cart from storage. `version` is the stored write counter.
    pub fn restore(owner: CartOwner, lines: Vec<CartLine>, version: u64, updated_at: DateTime<Utc>) -> Self {
        Self { owner, lines, version, updated_at }
    }

    pub fn owner(&self) -> &CartOwner { &self.owner }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn version(&self) -> u64 { self.version }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn line(&self, product_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id() == product_id)
    }

    /// Sum of quantities, not the number of distinct products.
    pub fn count(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity.value())).sum()
    }

    pub fn total(&self) -> Money { self.lines.iter().map(CartLine::line_total).sum() }

    pub fn add_item(&mut self, product: Product, quantity: Quantity) {
        match self.lines.iter_mut().find(|l| l.product_id() == product.id) {
            Some(existing) => existing.quantity = existing.quantity.add(quantity),
            None => self.lines.push(CartLine::new(product, quantity)),
        }
        self.touch();
    }

    /// Returns whether anything was removed. Absent products are not an error.
    pub fn remove_item(&mut self, product_id: Uuid) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id() != product_id);
        let removed = self.lines.len() != before;
        if removed { self.touch(); }
        removed
    }

    /// Sets a line's quantity and returns the new line total. Zero removes
    /// the line.
    pub fn update_quantity(&mut self, product_id: Uuid, quantity: i32) -> Result<Money, StorefrontError> {
        if quantity < 0 {
            return Err(StorefrontError::validation("Quantity cannot be negative"));
        }
        let idx = self.lines.iter().position(|l| l.product_id() == product_id).ok_or(StorefrontError::ItemNotFound)?;
        let line_total = if quantity == 0 {
            self.lines.remove(idx);
            Money::ZERO
        } else {
            let line = &mut self.lines[idx];
            line.quantity = Quantity::new(quantity)?;
            line.line_total()
        };
        self.touch();
        Ok(line_total)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.touch();
    }

    /// Folds foreign lines into this cart, summing quantities for products
    /// already present. Not idempotent.
    pub fn merge(&mut self, lines: &[CartLine]) {
        for incoming in lines {
            match self.lines.iter_mut().find(|l| l.product_id() == incoming.product_id()) {
                Some(existing) => existing.quantity = existing.quantity.add(incoming.quantity),
                None => self.lines.push(incoming.clone()),
            }
        }
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::aggregates::Category;
    use rust_decimal::Decimal;

    pub(crate) fn product(name: &str, cents: i64) -> Product {
        Product::new(name, Money::new(Decimal::new(cents, 2)), Category::Accessories, "/img/p.png").unwrap()
    }

    fn qty(n: i32) -> Quantity { Quantity::new(n).unwrap() }

    #[test]
    fn test_add_same_product_merges() {
        let mut cart = Cart::empty(CartOwner::Session("s1".into()));
        let p = product("Belt", 1250);
        cart.add_item(p.clone(), qty(2));
        cart.add_item(p.clone(), qty(1));
        cart.add_item(p.clone(), qty(4));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.count(), 7);
        assert_eq!(cart.total().to_fixed(), "87.50");
    }

    #[test]
    fn test_count_sums_quantities() {
        let mut cart = Cart::empty(CartOwner::User(Uuid::now_v7()));
        cart.add_item(product("A", 2500), qty(2));
        cart.add_item(product("B", 1000), qty(1));
        assert_eq!(cart.count(), 3);
        assert_eq!(cart.total().to_fixed(), "60.00");
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut cart = Cart::empty(CartOwner::Session("s1".into()));
        cart.add_item(product("A", 999), qty(3));
        let total = cart.total();
        assert!(!cart.remove_item(Uuid::now_v7()));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.total(), total);
    }

    #[test]
    fn test_update_quantity() {
        let mut cart = Cart::empty(CartOwner::Session("s1".into()));
        let p = product("A", 1000);
        cart.add_item(p.clone(), qty(1));
        assert_eq!(cart.update_quantity(p.id, 5).unwrap().to_fixed(), "50.00");
        assert_eq!(cart.count(), 5);
        assert!(matches!(cart.update_quantity(Uuid::now_v7(), 2), Err(StorefrontError::ItemNotFound)));
        assert!(matches!(cart.update_quantity(p.id, -1), Err(StorefrontError::Validation(_))));
        assert_eq!(cart.count(), 5);
    }

    #[test]
    fn test_update_quantity_zero_removes() {
        let mut cart = Cart::empty(CartOwner::Session("s1".into()));
        let p = product("A", 1000);
        cart.add_item(p.clone(), qty(2));
        assert_eq!(cart.update_quantity(p.id, 0).unwrap(), Money::ZERO);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_merge_sums_existing_lines() {
        let a = product("A", 500);
        let b = product("B", 700);
        let mut persisted = Cart::empty(CartOwner::User(Uuid::now_v7()));
        persisted.add_item(a.clone(), qty(3));
        let session = vec![CartLine::new(a.clone(), qty(2)), CartLine::new(b.clone(), qty(1))];
        persisted.merge(&session);
        assert_eq!(persisted.line(a.id).unwrap().quantity.value(), 5);
        assert_eq!(persisted.line(b.id).unwrap().quantity.value(), 1);
    }
}
